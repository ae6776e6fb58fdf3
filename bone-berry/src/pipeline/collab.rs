//! 外部协作者: 骨骼分割、热点检测与热点分类.
//!
//! 这些模型不在本 crate 内实现. 处理流程只通过下面的 trait 调用它们,
//! 并提供两个现成的适配器: [`ProvisionalClassifier`] 和 [`ExternalCommand`].

use super::codec;
use super::stage::Stage;
use crate::consts::gray::{HOTSPOT_ABNORMAL, HOTSPOT_NORMAL};
use crate::error::{BsiError, BsiResult};
use crate::hotspot::{BoundingBox, HotspotClass};
use crate::{ImgWriteRaw, LabelSlice, OwnedLabelSlice, ScanSlice};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;

/// 骨骼分割模型. 输出与输入同形状、取值 `0..=12` 的分割标签.
pub trait Segmenter: Send + Sync {
    /// 对一帧做骨骼分割.
    fn segment(&self, frame: &ScanSlice) -> BsiResult<OwnedLabelSlice>;
}

/// 热点候选框检测模型.
pub trait Detector: Send + Sync {
    /// 对一帧检测热点候选框.
    fn detect(&self, frame: &ScanSlice) -> BsiResult<Vec<BoundingBox>>;
}

/// 热点分类模型. 可以在正常/异常之间重新标注热点, 但不能改变背景集合.
pub trait Classifier: Send + Sync {
    /// 对一帧的热点掩码做分类.
    fn classify(
        &self,
        frame: &ScanSlice,
        hotspots: &LabelSlice,
        boxes: &[BoundingBox],
    ) -> BsiResult<Classification>;
}

/// 单个候选框的分类结果.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HotspotPrediction {
    /// 候选框及其最终类别.
    #[serde(flatten)]
    pub bbox: BoundingBox,

    /// 最终类别的概率.
    pub probability: f64,
}

/// 一帧的分类结果.
#[derive(Clone, Debug, PartialEq)]
pub struct Classification {
    /// 最终热点掩码.
    pub mask: OwnedLabelSlice,

    /// 逐框结果.
    pub hotspots: Vec<HotspotPrediction>,
}

impl Classification {
    /// 由最终掩码推导逐框结果: 框内正常/异常像素较多者为最终类别,
    /// 其占比为概率. 框内没有热点像素时保留检测器给出的类别, 概率为 0.
    pub fn from_mask(mask: OwnedLabelSlice, boxes: &[BoundingBox]) -> Self {
        let m = mask.as_immut();
        let hotspots = boxes
            .iter()
            .map(|b| {
                let (mut normal, mut abnormal) = (0usize, 0usize);
                if let Ok(region) = b.clamp_to(m.shape()) {
                    for (h, w) in crate::data::PosIter::within(region.h, region.w) {
                        match m[(h, w)] {
                            HOTSPOT_NORMAL => normal += 1,
                            HOTSPOT_ABNORMAL => abnormal += 1,
                            _ => {}
                        }
                    }
                }
                let total = normal + abnormal;
                let (class, hits) = if total == 0 {
                    (b.class, 0)
                } else if abnormal >= normal {
                    (HotspotClass::Abnormal, abnormal)
                } else {
                    (HotspotClass::Normal, normal)
                };
                HotspotPrediction {
                    bbox: BoundingBox { class, ..*b },
                    probability: if total == 0 {
                        0.0
                    } else {
                        hits as f64 / total as f64
                    },
                }
            })
            .collect();
        Self { mask, hotspots }
    }
}

/// 保留提取器给出的暂定类别, 概率均为 1.
///
/// 用于没有分类模型时直接得到可定量的结果.
#[derive(Copy, Clone, Debug, Default)]
pub struct ProvisionalClassifier;

impl Classifier for ProvisionalClassifier {
    fn classify(
        &self,
        _frame: &ScanSlice,
        hotspots: &LabelSlice,
        boxes: &[BoundingBox],
    ) -> BsiResult<Classification> {
        Ok(Classification {
            mask: hotspots.to_owned(),
            hotspots: boxes
                .iter()
                .map(|b| HotspotPrediction {
                    bbox: *b,
                    probability: 1.0,
                })
                .collect(),
        })
    }
}

/// 通过外部程序调用模型.
///
/// 参数中的占位符会被替换为临时文件路径:
///
/// - `{input}`: 原始计数帧 (npy);
/// - `{mask}`: 热点掩码 (单通道 PNG, 仅分类);
/// - `{boxes}`: 候选框 (JSON, 仅分类);
/// - `{output}`: 程序需要写出的结果. 分割为调色板 RGB PNG, 检测为候选框 JSON,
///   分类为最终热点掩码 (单通道 PNG).
///
/// 程序以非零状态退出或没有写出结果时, 视为协作者失败.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCommand {
    /// 可执行程序.
    pub program: String,

    /// 参数 (可以含有占位符).
    #[serde(default)]
    pub args: Vec<String>,
}

impl ExternalCommand {
    /// 直接初始化.
    pub fn new<P, S, I>(program: P, args: I) -> Self
    where
        P: Into<String>,
        S: Into<String>,
        I: IntoIterator<Item = S>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// 在临时目录中准备输入文件, 执行程序, 返回输出文件内容.
    fn invoke(&self, stage: Stage, inputs: &[(&str, &[u8])], output: &str) -> BsiResult<Vec<u8>> {
        let dir = tempfile::tempdir()?;
        let mut placeholders = Vec::with_capacity(inputs.len() + 1);
        for (name, bytes) in inputs {
            let path = dir.path().join(name);
            std::fs::write(&path, bytes)?;
            placeholders.push((placeholder_of(name), path));
        }
        let out_path = dir.path().join(output);
        placeholders.push(("{output}", out_path.clone()));

        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| substitute(a, &placeholders))
            .collect();
        log::debug!("{stage}: 执行 {} {}", self.program, args.join(" "));
        let out = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| BsiError::collaborator(stage, format!("无法启动 `{}`: {e}", self.program)))?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(BsiError::collaborator(
                stage,
                format!("`{}` 退出状态 {}: {}", self.program, out.status, stderr.trim()),
            ));
        }
        read_output(stage, &out_path)
    }
}

fn placeholder_of(file_name: &str) -> &'static str {
    match file_name {
        "mask.png" => "{mask}",
        "boxes.json" => "{boxes}",
        _ => "{input}",
    }
}

fn substitute(arg: &str, placeholders: &[(&str, std::path::PathBuf)]) -> String {
    placeholders
        .iter()
        .fold(arg.to_owned(), |acc, (ph, path)| {
            acc.replace(ph, &path.to_string_lossy())
        })
}

fn read_output(stage: Stage, path: &Path) -> BsiResult<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| BsiError::collaborator(stage, format!("没有得到输出 {}: {e}", path.display())))
}

impl Segmenter for ExternalCommand {
    fn segment(&self, frame: &ScanSlice) -> BsiResult<OwnedLabelSlice> {
        let input = codec::encode_frame(frame)?;
        let out = self.invoke(
            Stage::Segmentation,
            &[("frame.npy", input.as_slice())],
            "colored.png",
        )?;
        codec::decode_segments(&out).map_err(|e| BsiError::collaborator(Stage::Segmentation, e))
    }
}

impl Detector for ExternalCommand {
    fn detect(&self, frame: &ScanSlice) -> BsiResult<Vec<BoundingBox>> {
        let input = codec::encode_frame(frame)?;
        let out = self.invoke(Stage::Detection, &[("frame.npy", input.as_slice())], "boxes.json")?;
        codec::decode_json(&out).map_err(|e| BsiError::collaborator(Stage::Detection, e))
    }
}

impl Classifier for ExternalCommand {
    fn classify(
        &self,
        frame: &ScanSlice,
        hotspots: &LabelSlice,
        boxes: &[BoundingBox],
    ) -> BsiResult<Classification> {
        let input = codec::encode_frame(frame)?;
        let mask = hotspots.to_raw_png()?;
        let boxes_json = codec::encode_json(boxes)?;
        let out = self.invoke(
            Stage::Classification,
            &[
                ("frame.npy", input.as_slice()),
                ("mask.png", mask.as_slice()),
                ("boxes.json", boxes_json.as_slice()),
            ],
            "classification_mask.png",
        )?;
        let mask = codec::decode_hotspot(&out)
            .map_err(|e| BsiError::collaborator(Stage::Classification, e))?;
        Ok(Classification::from_mask(mask, boxes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OwnedScanSlice;
    use ndarray::{array, Array2};

    #[test]
    fn test_provisional_keeps_mask() {
        let frame = OwnedScanSlice::from(Array2::<f32>::zeros((3, 3)));
        let mask = OwnedLabelSlice::from(array![[0, 2, 0], [0, 1, 0], [0, 0, 0]]);
        let boxes = [BoundingBox::new(0, 0, 3, 2, HotspotClass::Abnormal)];
        let c = ProvisionalClassifier
            .classify(&frame.as_immutable(), &mask.as_immut(), &boxes)
            .unwrap();
        assert_eq!(c.mask, mask);
        assert_eq!(c.hotspots.len(), 1);
        assert_eq!(c.hotspots[0].probability, 1.0);
    }

    #[test]
    fn test_from_mask_majority() {
        let mask = OwnedLabelSlice::from(array![[1, 1, 2, 0], [1, 0, 0, 0], [0, 0, 0, 0]]);
        let boxes = [
            BoundingBox::new(0, 0, 3, 2, HotspotClass::Abnormal),
            BoundingBox::new(3, 1, 4, 3, HotspotClass::Abnormal),
        ];
        let c = Classification::from_mask(mask, &boxes);
        assert_eq!(c.hotspots[0].bbox.class, HotspotClass::Normal);
        assert!((c.hotspots[0].probability - 0.75).abs() < 1e-12);
        assert_eq!(c.hotspots[1].bbox.class, HotspotClass::Abnormal);
        assert_eq!(c.hotspots[1].probability, 0.0);
    }

    #[test]
    fn test_prediction_json_is_flat() {
        let p = HotspotPrediction {
            bbox: BoundingBox::new(1, 2, 3, 4, HotspotClass::Normal),
            probability: 0.5,
        };
        let v = serde_json::to_value(p).unwrap();
        assert_eq!(v["label"], "normal");
        assert_eq!(v["probability"], 0.5);
    }

    #[test]
    fn test_substitute() {
        let ph = [("{input}", std::path::PathBuf::from("/tmp/x/frame.npy"))];
        assert_eq!(substitute("--in={input}", &ph), "--in=/tmp/x/frame.npy");
        assert_eq!(substitute("-v", &ph), "-v");
    }

    #[cfg(unix)]
    #[test]
    fn test_external_command_failure() {
        let frame = OwnedScanSlice::from(Array2::<f32>::zeros((2, 2)));
        let cmd = ExternalCommand::new("false", Vec::<String>::new());
        let err = cmd.detect(&frame.as_immutable()).unwrap_err();
        assert!(matches!(
            err,
            BsiError::ExternalCollaboratorFailure {
                stage: Stage::Detection,
                ..
            }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_external_command_detector() {
        let frame = OwnedScanSlice::from(Array2::<f32>::zeros((2, 2)));
        let script = r#"printf '[{"label":"Hotspot","xmin":0,"ymin":0,"xmax":2,"ymax":2}]' > "$1""#;
        let cmd = ExternalCommand::new("sh", ["-c", script, "sh", "{output}"]);
        let boxes = cmd.detect(&frame.as_immutable()).unwrap();
        assert_eq!(boxes, vec![BoundingBox::new(0, 0, 2, 2, HotspotClass::Abnormal)]);
    }
}
