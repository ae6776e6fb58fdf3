//! 数据集操作.

use std::env;
use std::path::{Path, PathBuf};

pub mod studies;

pub use studies::{study_loader, StudyLoader};

/// 指定研究数据根目录的环境变量.
pub const STUDIES_DIR_ENV: &str = "BSI_STUDIES_DIR";

/// 获取 `{用户主目录}/dataset` 目录.
pub fn home_dataset_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    Some(ans)
}

/// 获取 `{用户主目录}/dataset` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = home_dataset_dir()?;
    ans.extend(it);
    Some(ans)
}

/// 获取研究数据根目录.
///
/// 1. 若环境变量 `$BSI_STUDIES_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/bsi`. 无法确定用户主目录时返回 `None`.
pub fn studies_dir_from_env_or_home() -> Option<PathBuf> {
    match env::var(STUDIES_DIR_ENV) {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => home_dataset_dir_with(["bsi"]),
    }
}
