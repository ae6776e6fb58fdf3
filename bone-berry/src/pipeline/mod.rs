//! 按研究推进的处理流程.
//!
//! 每个研究依次经过 [`Stage::ALL`] 中的五个阶段. 阶段是否完成只由其输出产物
//! 是否存在决定, 不在内存中缓存; 已完成的阶段在重复运行时被直接跳过,
//! 因此重复运行是幂等的. 某阶段失败后, 同一研究的后续阶段不再执行,
//! 已写出的产物保持原样, 下次运行时从失败的阶段继续.
//!
//! # 注意
//!
//! 同一研究在同一时间只能被一个运行者处理 (由 [`StageStore::lock`] 保证),
//! 不同研究之间互不影响.

pub mod codec;
pub mod collab;
pub mod config;
pub mod import;
pub mod stage;
pub mod store;

pub use collab::{
    Classification, Classifier, Detector, ExternalCommand, HotspotPrediction,
    ProvisionalClassifier, Segmenter,
};
pub use config::PipelineConfig;
pub use import::{import_study, load_manifest, StudyManifest};
pub use stage::{artifact, Stage};
pub use store::{FsStageStore, MemStageStore, StageStore, StudyLock};

use crate::bsi::{self, BsiResults, Summary};
use crate::error::{BsiError, BsiResult};
use crate::hotspot::{BoundingBox, HotspotExtractor};
use crate::view::View;
use crate::{OwnedLabelSlice, OwnedScanSlice, Study, StudyKey};
use serde::Serialize;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
    }
}

/// 一个研究的阶段完成情况.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct StudyStatus {
    /// 按执行顺序排列的 `(阶段, 是否完成)`.
    pub stages: Vec<(Stage, bool)>,

    /// 第一个未完成的阶段. 全部完成时为 `None`.
    pub next_step: Option<Stage>,
}

impl StudyStatus {
    /// 阶段 `stage` 是否已完成?
    pub fn is_complete(&self, stage: Stage) -> bool {
        self.stages.iter().any(|(s, done)| *s == stage && *done)
    }

    /// 是否所有阶段都已完成?
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.next_step.is_none()
    }
}

/// 一次成功运行的结果.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct RunOutcome {
    /// 本次实际执行的阶段.
    pub executed: Vec<Stage>,

    /// 因已完成而跳过的阶段.
    pub skipped: Vec<Stage>,
}

/// 单个研究的批处理结果.
#[derive(Debug)]
pub struct StudyReport {
    /// 研究标识.
    pub key: StudyKey,

    /// 运行结果.
    pub outcome: BsiResult<RunOutcome>,
}

/// 批处理结果. 一个研究失败不影响其它研究.
#[derive(Debug, Default)]
pub struct BatchReport {
    reports: Vec<StudyReport>,
}

impl BatchReport {
    /// 按输入顺序迭代各研究的结果.
    pub fn iter(&self) -> impl Iterator<Item = &StudyReport> {
        self.reports.iter()
    }

    /// 研究个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    /// 是否为空批次?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// 成功的研究.
    pub fn succeeded(&self) -> impl Iterator<Item = &StudyKey> {
        self.reports
            .iter()
            .filter(|r| r.outcome.is_ok())
            .map(|r| &r.key)
    }

    /// 失败的研究及其错误.
    pub fn failed(&self) -> impl Iterator<Item = (&StudyKey, &BsiError)> {
        self.reports
            .iter()
            .filter_map(|r| r.outcome.as_ref().err().map(|e| (&r.key, e)))
    }

    /// 是否全部成功?
    pub fn is_all_ok(&self) -> bool {
        self.reports.iter().all(|r| r.outcome.is_ok())
    }
}

impl FromIterator<StudyReport> for BatchReport {
    fn from_iter<I: IntoIterator<Item = StudyReport>>(iter: I) -> Self {
        Self {
            reports: iter.into_iter().collect(),
        }
    }
}

/// 定量结果文件 `{k}_bsi_quantification.json` 的内容.
#[derive(Clone, Debug, Serialize)]
pub struct QuantificationRecord {
    /// 研究信息.
    pub patient_info: Study,

    /// 逐区域统计.
    pub bsi_results: BsiResults,

    /// 全身汇总.
    pub summary_statistics: Summary,
}

/// 分类结果文件 `{k}_classification.json` 的内容.
#[derive(Clone, Debug, Default, PartialEq, Serialize, serde::Deserialize)]
pub struct ClassificationRecord {
    /// 前位各框的结果.
    pub anterior: Vec<HotspotPrediction>,

    /// 后位各框的结果.
    pub posterior: Vec<HotspotPrediction>,
}

/// 根据 `store` 中的产物计算研究的阶段完成情况.
pub fn study_status<S: StageStore + ?Sized>(store: &S, study: &Study) -> StudyStatus {
    let key = study.key();
    let stages: Vec<(Stage, bool)> = Stage::ALL
        .iter()
        .map(|s| {
            let done = s.outputs(key).iter().all(|n| store.exists(key, n));
            (*s, done)
        })
        .collect();
    let next_step = stages.iter().find(|(_, done)| !done).map(|(s, _)| *s);
    StudyStatus { stages, next_step }
}

/// 处理流程编排器.
pub struct Pipeline<S: StageStore> {
    store: S,
    segmenter: Box<dyn Segmenter>,
    detector: Box<dyn Detector>,
    classifier: Box<dyn Classifier>,
    extractor: HotspotExtractor,
}

impl<S: StageStore> Pipeline<S> {
    /// 以默认提取参数创建.
    pub fn new(
        store: S,
        segmenter: Box<dyn Segmenter>,
        detector: Box<dyn Detector>,
        classifier: Box<dyn Classifier>,
    ) -> Self {
        Self {
            store,
            segmenter,
            detector,
            classifier,
            extractor: HotspotExtractor::default(),
        }
    }

    /// 替换热点提取器.
    pub fn with_extractor(mut self, extractor: HotspotExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// 产物存储.
    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// 计算研究的阶段完成情况. 每次调用都重新检查产物.
    #[inline]
    pub fn status(&self, study: &Study) -> StudyStatus {
        study_status(&self.store, study)
    }

    /// 运行研究的所有未完成阶段.
    ///
    /// 先获取研究锁, 再按顺序执行未完成的阶段. 某阶段失败时记录日志并返回错误,
    /// 后续阶段不再执行. 锁在返回前释放.
    pub fn try_run(&self, study: &Study) -> BsiResult<RunOutcome> {
        let key = study.key();
        let _lock = self.store.lock(key).map_err(|e| {
            log::warn!("{key}: 无法获取研究锁: {e}");
            e
        })?;

        let status = self.status(study);
        let mut outcome = RunOutcome::default();
        for (stage, done) in status.stages {
            if done {
                log::debug!("{key}: 阶段 {stage} 已完成, 跳过");
                outcome.skipped.push(stage);
                continue;
            }
            log::info!("{key}: 开始阶段 {stage}");
            if let Err(e) = self.run_stage(study, stage) {
                log::error!("{key}: 阶段 {stage} 失败, 后续阶段不再执行: {e}");
                return Err(e);
            }
            log::info!("{key}: 阶段 {stage} 完成");
            outcome.executed.push(stage);
        }
        Ok(outcome)
    }

    /// 运行研究, 只返回是否成功. 失败原因已记录在日志中.
    #[inline]
    pub fn run(&self, study: &Study) -> bool {
        self.try_run(study).is_ok()
    }

    /// 依次处理一批研究. 单个研究失败不影响其它研究.
    pub fn run_batch(&self, studies: &[Study]) -> BatchReport {
        studies.iter().map(|s| self.report(s)).collect()
    }

    /// 借助 `rayon`, 并行处理一批研究. 结果顺序与输入顺序一致.
    ///
    /// 输入中的重复研究会因研究锁而只有一个成功运行.
    #[cfg(feature = "rayon")]
    pub fn par_run_batch(&self, studies: &[Study]) -> BatchReport {
        let reports: Vec<StudyReport> = studies.par_iter().map(|s| self.report(s)).collect();
        reports.into_iter().collect()
    }

    fn report(&self, study: &Study) -> StudyReport {
        StudyReport {
            key: study.key().clone(),
            outcome: self.try_run(study),
        }
    }

    fn run_stage(&self, study: &Study, stage: Stage) -> BsiResult<()> {
        let key = study.key();
        if let Some(missing) = stage
            .inputs(key)
            .into_iter()
            .find(|n| !self.store.exists(key, n))
        {
            return Err(BsiError::StageInputMissing {
                stage,
                artifact: missing,
            });
        }
        match stage {
            Stage::Segmentation => self.segmentation(key),
            Stage::Detection => self.detection(key),
            Stage::Extraction => self.extraction(key),
            Stage::Classification => self.classification(key),
            Stage::Quantification => self.quantification(study),
        }
    }

    fn read_frame(&self, key: &StudyKey, view: View) -> BsiResult<OwnedScanSlice> {
        codec::decode_frame(&self.store.read(key, &artifact::raw(key, view))?)
    }

    fn read_boxes(&self, key: &StudyKey, view: View) -> BsiResult<Vec<BoundingBox>> {
        codec::decode_json(&self.store.read(key, &artifact::boxes(key, view))?)
    }

    fn segmentation(&self, key: &StudyKey) -> BsiResult<()> {
        let stage = Stage::Segmentation;
        for view in View::BOTH {
            let frame = self.read_frame(key, view)?;
            let seg = self
                .segmenter
                .segment(&frame.as_immutable())
                .map_err(|e| as_collaborator(stage, e))?;
            ensure_shape(stage, frame.as_immutable().shape(), &seg)?;
            let png = codec::encode_segments(&seg.as_immut())
                .map_err(|e| as_collaborator(stage, e))?;
            self.store.write(key, &artifact::colored(key, view), &png)?;
        }
        Ok(())
    }

    fn detection(&self, key: &StudyKey) -> BsiResult<()> {
        let stage = Stage::Detection;
        for view in View::BOTH {
            let frame = self.read_frame(key, view)?;
            let boxes = self
                .detector
                .detect(&frame.as_immutable())
                .map_err(|e| as_collaborator(stage, e))?;
            log::debug!("{key}: {view} 检测到 {} 个候选框", boxes.len());
            self.store
                .write(key, &artifact::boxes(key, view), &codec::encode_json(&boxes)?)?;
        }
        Ok(())
    }

    fn extraction(&self, key: &StudyKey) -> BsiResult<()> {
        for view in View::BOTH {
            let frame = self.read_frame(key, view)?;
            let mut boxes = self.read_boxes(key, view)?;
            boxes.sort_by_key(BoundingBox::sort_key);
            let mask = self.extractor.extract(&frame.as_immutable(), &boxes)?;
            let m = mask.as_immut();
            self.store
                .write(key, &artifact::hotspot_mask(key, view), &codec::encode_hotspot(&m)?)?;
            self.store.write(
                key,
                &artifact::hotspot_colored(key, view),
                &codec::encode_hotspot_vis(&m)?,
            )?;
        }
        Ok(())
    }

    fn classification(&self, key: &StudyKey) -> BsiResult<()> {
        let stage = Stage::Classification;
        let mut record = ClassificationRecord::default();
        for view in View::BOTH {
            let frame = self.read_frame(key, view)?;
            let hotspots = codec::decode_hotspot(
                &self.store.read(key, &artifact::hotspot_mask(key, view))?,
            )?;
            let boxes = self.read_boxes(key, view)?;
            let result = self
                .classifier
                .classify(&frame.as_immutable(), &hotspots.as_immut(), &boxes)
                .map_err(|e| as_collaborator(stage, e))?;

            let mask = result.mask.as_immut();
            if !mask.same_background(&hotspots.as_immut()) {
                return Err(BsiError::collaborator(
                    stage,
                    format!("{view} 分类结果改变了热点背景"),
                ));
            }
            let png = codec::encode_hotspot(&mask).map_err(|e| as_collaborator(stage, e))?;
            self.store
                .write(key, &artifact::classification_mask(key, view), &png)?;
            match view {
                View::Anterior => record.anterior = result.hotspots,
                View::Posterior => record.posterior = result.hotspots,
            }
        }
        self.store
            .write(key, &artifact::classification(key), &codec::encode_json(&record)?)
    }

    fn quantification(&self, study: &Study) -> BsiResult<()> {
        let key = study.key();
        let read_seg = |view| -> BsiResult<OwnedLabelSlice> {
            codec::decode_segments(&self.store.read(key, &artifact::colored(key, view))?)
        };
        let read_hot = |view| -> BsiResult<OwnedLabelSlice> {
            codec::decode_hotspot(
                &self
                    .store
                    .read(key, &artifact::classification_mask(key, view))?,
            )
        };
        let (seg_ant, seg_post) = (read_seg(View::Anterior)?, read_seg(View::Posterior)?);
        let (hot_ant, hot_post) = (read_hot(View::Anterior)?, read_hot(View::Posterior)?);
        let bsi_results = bsi::aggregate(
            &seg_ant.as_immut(),
            &seg_post.as_immut(),
            &hot_ant.as_immut(),
            &hot_post.as_immut(),
        )?;
        let record = QuantificationRecord {
            patient_info: study.clone(),
            summary_statistics: bsi_results.summary(),
            bsi_results,
        };
        log::info!(
            "{key}: BSI = {:.4}% (骨骼区域 {:.4}%)",
            record.summary_statistics.bsi_score,
            record.summary_statistics.skeletal_bsi_score
        );
        self.store
            .write(key, &artifact::quantification(key), &codec::encode_json(&record)?)
    }
}

/// 协作者返回的任何错误都归为该阶段的协作者失败.
fn as_collaborator(stage: Stage, e: BsiError) -> BsiError {
    match e {
        e @ BsiError::ExternalCollaboratorFailure { .. } => e,
        other => BsiError::collaborator(stage, other),
    }
}

fn ensure_shape(stage: Stage, expected: crate::Idx2d, got: &OwnedLabelSlice) -> BsiResult<()> {
    let actual = got.as_immut().shape();
    if actual == expected {
        Ok(())
    } else {
        Err(BsiError::collaborator(
            stage,
            BsiError::ShapeMismatch { expected, actual },
        ))
    }
}
