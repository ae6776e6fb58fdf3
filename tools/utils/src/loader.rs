//! 对 `bone-berry::dataset` 的更一层封装. 提供更直接的研究加载器.

use bone_berry::dataset::{self, StudyLoader};
use bone_berry::BsiResult;
use std::path::{Path, PathBuf};

/// 获取研究数据根目录.
///
/// 1. 若环境变量 `$BSI_STUDIES_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/bsi`;
/// 3. 无法确定用户主目录时, 返回当前目录.
pub fn studies_dir_from_env_or_home() -> PathBuf {
    dataset::studies_dir_from_env_or_home().unwrap_or_else(|| PathBuf::from("."))
}

/// 获取 `root` 下的研究清单加载器.
#[inline]
pub fn study_loader<P: AsRef<Path>>(root: P) -> BsiResult<StudyLoader> {
    dataset::study_loader(root)
}
