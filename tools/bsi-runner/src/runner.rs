//! 程序运行函数.

use anyhow::Context;
use bone_berry::hotspot::HotspotExtractor;
use bone_berry::pipeline::{
    self, BatchReport, Classifier, ExternalCommand, Pipeline, PipelineConfig,
    ProvisionalClassifier,
};
use bone_berry::view::ViewResolver;
use bone_berry::{FrameStack, RawFrame, Study, StudyKey};
use std::path::PathBuf;

/// 导入请求.
pub struct ImportRequest {
    pub frames: PathBuf,
    pub patient: String,
    pub date: String,
    pub session: String,
    pub labels: Vec<String>,
    pub confirm: bool,
}

/// 外部模型命令.
pub struct Models {
    pub segmenter: ExternalCommand,
    pub detector: ExternalCommand,
    pub classifier: Option<ExternalCommand>,
}

/// 找到 `root` 下的所有研究. `patients` 非空时只保留这些患者.
fn discover(config: &PipelineConfig, patients: &[String]) -> anyhow::Result<Vec<Study>> {
    let loader = utils::loader::study_loader(&config.root)
        .with_context(|| format!("无法读取研究目录 {}", config.root.display()))?;
    let mut studies = Vec::with_capacity(loader.len());
    for (path, manifest) in loader {
        match manifest {
            Ok(m) => studies.push(m.study),
            Err(e) => log::warn!("跳过无法解析的清单 {}: {e}", path.display()),
        }
    }
    if !patients.is_empty() {
        studies.retain(|s| patients.iter().any(|p| p == s.key().patient_id()));
    }
    log::info!("共发现 {} 个研究", studies.len());
    Ok(studies)
}

/// 导入一个研究: 解析视图, 写入原始帧和清单.
pub fn import(config: &PipelineConfig, req: &ImportRequest) -> anyhow::Result<()> {
    let study = Study::new(req.patient.as_str(), &req.date, req.session.as_str())?;
    let frames = FrameStack::open_npy(&req.frames)
        .with_context(|| format!("无法读取 {}", req.frames.display()))?;

    let raw: Vec<RawFrame> = (0..frames.len())
        .map(|i| RawFrame::new(i, req.labels.get(i).map(String::as_str)))
        .collect();
    let mut assignment = ViewResolver::default().resolve(&raw);
    if req.confirm {
        let pending: Vec<usize> = assignment
            .iter()
            .enumerate()
            .filter(|(_, e)| e.view.is_some() && !e.confirmed)
            .map(|(i, _)| i)
            .collect();
        for i in pending {
            log::info!("确认帧 {i} 的低置信度视图分配");
            assignment.confirm(i)?;
        }
    }
    let views = match assignment.freeze() {
        Ok(views) => views,
        Err(e) => {
            for (i, entry) in assignment.iter().enumerate() {
                log::warn!(
                    "帧 {i}: {:?} ({:?}, 已确认: {})",
                    entry.view,
                    entry.confidence,
                    entry.confirmed
                );
            }
            return Err(e).context("视图分配需要人工确认 (使用 --confirm 或 --label)");
        }
    };

    let store = config.store();
    pipeline::import_study(&store, &study, &frames, &raw, views)?;
    utils::sep();
    println!(
        "已导入 {} 至 {}",
        study.key(),
        store.study_dir(study.key()).display()
    );
    Ok(())
}

/// 显示各研究的阶段完成情况.
pub fn status(config: &PipelineConfig, patients: &[String]) -> anyhow::Result<()> {
    let studies = discover(config, patients)?;
    let store = config.store();
    utils::sep();
    let stdout = std::io::stdout();
    for study in studies.iter() {
        let status = pipeline::study_status(&store, study);
        crate::result::describe_status_into(study, &status, &mut stdout.lock())?;
        utils::sep_to(stdout.lock())?;
    }
    Ok(())
}

/// 实际运行.
pub fn run(
    config: &PipelineConfig,
    models: &Models,
    jobs: usize,
    patients: &[String],
) -> anyhow::Result<BatchReport> {
    let studies = discover(config, patients)?;
    let classifier: Box<dyn Classifier> = match &models.classifier {
        Some(cmd) => Box::new(cmd.clone()),
        None => Box::new(ProvisionalClassifier),
    };
    let pipeline = Pipeline::new(
        config.store(),
        Box::new(models.segmenter.clone()),
        Box::new(models.detector.clone()),
        classifier,
    )
    .with_extractor(HotspotExtractor::new(config.extractor));

    println!("Running {} studies with {jobs} jobs...", studies.len());
    if jobs == 1 {
        return Ok(pipeline.run_batch(&studies));
    }
    let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;
    Ok(pool.install(|| pipeline.par_run_batch(&studies)))
}

/// 删除研究 `patient/date` 遗留的锁文件.
pub fn unlock(config: &PipelineConfig, patient: &str, date: &str) -> anyhow::Result<()> {
    let key = StudyKey::new(patient, date.parse()?)?;
    let store = config.store();
    if store.break_lock(&key)? {
        log::warn!("已删除研究 {key} 的锁文件");
    } else {
        println!("研究 {key} 没有锁文件");
    }
    Ok(())
}
