//! 处理流程配置.

use super::store::FsStageStore;
use crate::consts::DEFAULT_STALE_LOCK_SECS;
use crate::dataset;
use crate::error::BsiResult;
use crate::hotspot::ExtractorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 处理流程配置. 所有字段都有默认值, JSON 配置文件中可以只写需要覆盖的部分.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 研究数据根目录.
    pub root: PathBuf,

    /// 热点提取参数.
    pub extractor: ExtractorConfig,

    /// 研究锁存在超过该秒数后视为失效. `null` 表示只按持有进程判断.
    pub stale_lock_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            root: dataset::studies_dir_from_env_or_home().unwrap_or_else(|| PathBuf::from(".")),
            extractor: ExtractorConfig::default(),
            stale_lock_secs: Some(DEFAULT_STALE_LOCK_SECS),
        }
    }
}

impl PipelineConfig {
    /// 从 JSON 文件读取配置.
    pub fn load<P: AsRef<Path>>(path: P) -> BsiResult<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// 以 `root` 为根目录的文件系统存储.
    pub fn store(&self) -> FsStageStore {
        let store = FsStageStore::new(&self.root);
        match self.stale_lock_secs {
            Some(secs) => store.with_stale_after(Duration::from_secs(secs)),
            None => store,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotspot::HoleFill;

    #[test]
    fn test_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bsi.json");
        std::fs::write(
            &path,
            r#"{"root": "/data/bsi", "extractor": {"hole_fill": {"kind": "closing", "radius": 1}}}"#,
        )
        .unwrap();
        let cfg = PipelineConfig::load(&path).unwrap();
        assert_eq!(cfg.root, PathBuf::from("/data/bsi"));
        assert_eq!(cfg.extractor.hole_fill, HoleFill::Closing { radius: 1 });
        assert_eq!(cfg.extractor.dilation_radius, 1);
        assert_eq!(cfg.stale_lock_secs, Some(DEFAULT_STALE_LOCK_SECS));
        assert_eq!(cfg.store().root(), Path::new("/data/bsi"));
    }

    #[test]
    fn test_missing_file() {
        assert!(PipelineConfig::load("/definitely/not/here.json").is_err());
    }

    #[test]
    fn test_zero_threshold_step_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bsi.json");
        std::fs::write(&path, r#"{"extractor": {"threshold_step": 0}}"#).unwrap();
        assert!(PipelineConfig::load(&path).is_err());
    }
}
