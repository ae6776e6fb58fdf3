//! 处理阶段, 以及各阶段产物的命名规则.
//!
//! 所有产物都位于 `{root}/{patient_id}/` 下, 文件名形如
//! `{patient_id}_{study_date}_{view_or_tag}_{suffix}.{ext}`.

use crate::view::View;
use crate::StudyKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 处理阶段, 按执行顺序排列.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// 骨骼分割 (外部协作者).
    Segmentation,
    /// 热点候选框检测 (外部协作者).
    Detection,
    /// 框内热点提取.
    Extraction,
    /// 热点分类 (外部协作者).
    Classification,
    /// BSI 定量.
    Quantification,
}

impl Stage {
    /// 全部阶段, 按执行顺序.
    pub const ALL: [Stage; 5] = [
        Stage::Segmentation,
        Stage::Detection,
        Stage::Extraction,
        Stage::Classification,
        Stage::Quantification,
    ];

    /// 阶段名称.
    pub const fn name(&self) -> &'static str {
        match self {
            Stage::Segmentation => "segmentation",
            Stage::Detection => "detection",
            Stage::Extraction => "extraction",
            Stage::Classification => "classification",
            Stage::Quantification => "quantification",
        }
    }

    /// 该阶段需要的输入产物文件名.
    pub fn inputs(&self, key: &StudyKey) -> Vec<String> {
        let per_view = |f: fn(&StudyKey, View) -> String| View::BOTH.map(|v| f(key, v));
        match self {
            Stage::Segmentation | Stage::Detection => per_view(artifact::raw).to_vec(),
            Stage::Extraction => [per_view(artifact::raw), per_view(artifact::boxes)].concat(),
            Stage::Classification => [
                per_view(artifact::raw),
                per_view(artifact::hotspot_mask),
                per_view(artifact::boxes),
            ]
            .concat(),
            Stage::Quantification => [
                per_view(artifact::colored),
                per_view(artifact::classification_mask),
            ]
            .concat(),
        }
    }

    /// 该阶段的全部输出产物文件名. 当且仅当它们都存在时, 阶段视为完成.
    pub fn outputs(&self, key: &StudyKey) -> Vec<String> {
        let per_view = |f: fn(&StudyKey, View) -> String| View::BOTH.map(|v| f(key, v));
        match self {
            Stage::Segmentation => per_view(artifact::colored).to_vec(),
            Stage::Detection => per_view(artifact::boxes).to_vec(),
            Stage::Extraction => [
                per_view(artifact::hotspot_mask),
                per_view(artifact::hotspot_colored),
            ]
            .concat(),
            Stage::Classification => {
                let mut v = per_view(artifact::classification_mask).to_vec();
                v.push(artifact::classification(key));
                v
            }
            Stage::Quantification => vec![artifact::quantification(key)],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 产物文件名.
pub mod artifact {
    use super::*;

    /// 原始计数帧 `{k}_{ant|post}_raw.npy`.
    pub fn raw(key: &StudyKey, view: View) -> String {
        format!("{}_{}_raw.npy", key.stem(), view.short_tag())
    }

    /// 骨骼分割 `{k}_{ant|post}_colored.png`.
    pub fn colored(key: &StudyKey, view: View) -> String {
        format!("{}_{}_colored.png", key.stem(), view.short_tag())
    }

    /// 候选框 `{k}_{ant|post}_boxes.json`.
    pub fn boxes(key: &StudyKey, view: View) -> String {
        format!("{}_{}_boxes.json", key.stem(), view.short_tag())
    }

    /// 热点掩码 `{k}_{ant|post}_hotspot_mask.png`, 像素值即标签值.
    pub fn hotspot_mask(key: &StudyKey, view: View) -> String {
        format!("{}_{}_hotspot_mask.png", key.stem(), view.short_tag())
    }

    /// 可视化热点掩码 `{k}_{ant|post}_hotspot_colored.png`.
    pub fn hotspot_colored(key: &StudyKey, view: View) -> String {
        format!("{}_{}_hotspot_colored.png", key.stem(), view.short_tag())
    }

    /// 分类后的热点掩码 `{k}_{anterior|posterior}_classification_mask.png`.
    pub fn classification_mask(key: &StudyKey, view: View) -> String {
        format!(
            "{}_{}_classification_mask.png",
            key.stem(),
            view.long_tag()
        )
    }

    /// 逐框分类结果 `{k}_classification.json`.
    pub fn classification(key: &StudyKey) -> String {
        format!("{}_classification.json", key.stem())
    }

    /// 定量结果 `{k}_bsi_quantification.json`.
    pub fn quantification(key: &StudyKey) -> String {
        format!("{}_bsi_quantification.json", key.stem())
    }

    /// 导入时写入的研究清单 `{k}_study.json`.
    pub fn manifest(key: &StudyKey) -> String {
        format!("{}_study.json", key.stem())
    }

    /// 研究清单的文件名后缀.
    pub const MANIFEST_SUFFIX: &str = "_study.json";

    /// 研究锁 `{k}.lock`.
    pub fn lock(key: &StudyKey) -> String {
        format!("{}.lock", key.stem())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> StudyKey {
        StudyKey::new("P7", "20230115".parse().unwrap()).unwrap()
    }

    #[test]
    fn test_artifact_names() {
        let k = key();
        assert_eq!(artifact::raw(&k, View::Anterior), "P7_20230115_ant_raw.npy");
        assert_eq!(
            artifact::classification_mask(&k, View::Posterior),
            "P7_20230115_posterior_classification_mask.png"
        );
        assert_eq!(
            artifact::quantification(&k),
            "P7_20230115_bsi_quantification.json"
        );
        assert!(artifact::manifest(&k).ends_with(artifact::MANIFEST_SUFFIX));
    }

    #[test]
    fn test_stage_chain() {
        // 每个阶段的输入要么是导入产物, 要么是前序阶段的输出.
        let k = key();
        let imported: Vec<String> = View::BOTH.map(|v| artifact::raw(&k, v)).to_vec();
        let mut available = imported;
        for stage in Stage::ALL {
            for input in stage.inputs(&k) {
                assert!(available.contains(&input), "{stage}: {input}");
            }
            available.extend(stage.outputs(&k));
        }
        assert_eq!(Stage::Classification.outputs(&k).len(), 3);
    }
}
