//! 研究导入: 写入两个视图的原始帧及研究清单.

use super::codec;
use super::stage::artifact;
use super::store::StageStore;
use crate::error::{BsiError, BsiResult};
use crate::view::{View, ViewMap};
use crate::{FrameStack, RawFrame, Study};
use serde::{Deserialize, Serialize};

/// 研究清单, 导入时写入 `{k}_study.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyManifest {
    /// 研究信息.
    #[serde(flatten)]
    pub study: Study,

    /// 原始图像帧数.
    pub frame_count: usize,

    /// 各帧的仪器标签.
    pub frames: Vec<RawFrame>,

    /// 冻结后的视图映射.
    pub views: ViewMap,
}

/// 导入一个研究. 同一研究重复导入会覆盖原始帧和清单, 已有的下游产物保持不变.
///
/// `views` 中的帧索引越界时返回 `Err(FrameOutOfRange)`, 此时不写入任何内容.
pub fn import_study<S: StageStore + ?Sized>(
    store: &S,
    study: &Study,
    frames: &FrameStack,
    labels: &[RawFrame],
    views: ViewMap,
) -> BsiResult<StudyManifest> {
    let key = study.key();
    let mut encoded = Vec::with_capacity(2);
    for view in View::BOTH {
        let index = views.frame_of(view);
        let frame = frames.frame_at(index).ok_or(BsiError::FrameOutOfRange {
            index,
            len: frames.len(),
        })?;
        encoded.push((artifact::raw(key, view), codec::encode_frame(&frame)?));
    }
    for (name, bytes) in encoded {
        store.write(key, &name, &bytes)?;
    }

    let manifest = StudyManifest {
        study: study.clone(),
        frame_count: frames.len(),
        frames: labels.to_vec(),
        views,
    };
    store.write(key, &artifact::manifest(key), &codec::encode_json(&manifest)?)?;
    log::info!("导入研究 {key}: {} 帧, {views:?}", frames.len());
    Ok(manifest)
}

/// 读取研究清单.
pub fn load_manifest<S: StageStore + ?Sized>(
    store: &S,
    study: &crate::StudyKey,
) -> BsiResult<StudyManifest> {
    codec::decode_json(&store.read(study, &artifact::manifest(study))?)
}
