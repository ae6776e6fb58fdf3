//! 研究数据加载器.
//!
//! 提供迭代器风格的研究发现模式: 扫描根目录下每个患者目录中的
//! `{patient_id}_{study_date}_study.json` 清单.

use crate::error::{BsiError, BsiResult};
use crate::pipeline::{artifact, artifact::MANIFEST_SUFFIX, codec, StudyManifest};
use std::fs;
use std::path::{Path, PathBuf};

/// 从 `root` 创建研究清单加载器. 清单按 (患者目录, 文件名) 的字典序迭代.
///
/// # 注意
///
/// 1. `root` 不可读时返回 `Err`; 单个患者目录不可读时跳过并记录日志.
/// 2. 清单内容在迭代时才读取和解析, 失败时迭代器返回 `Result::Error`.
/// 3. 清单所在的患者目录名及文件名必须与清单中的研究标识一致, 否则视为解析失败.
pub fn study_loader<P: AsRef<Path>>(root: P) -> BsiResult<StudyLoader> {
    let mut patients: Vec<PathBuf> = fs::read_dir(root.as_ref())?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    patients.sort();

    let mut manifests = Vec::new();
    for dir in patients {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("跳过无法读取的目录 {}: {e}", dir.display());
                continue;
            }
        };
        let mut found: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.ends_with(MANIFEST_SUFFIX))
            })
            .collect();
        found.sort();
        manifests.extend(found);
    }
    manifests.reverse();

    Ok(StudyLoader {
        data_rev: manifests,
    })
}

/// 研究清单加载器.
#[derive(Debug)]
pub struct StudyLoader {
    data_rev: Vec<PathBuf>,
}

impl Iterator for StudyLoader {
    type Item = (PathBuf, BsiResult<StudyManifest>);

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.data_rev.pop()?;
        let manifest = fs::read(&path)
            .map_err(Into::into)
            .and_then(|bytes| codec::decode_json(&bytes))
            .and_then(|m| check_location(&path, m));
        Some((path, manifest))
    }
}

fn check_location(path: &Path, manifest: StudyManifest) -> BsiResult<StudyManifest> {
    let key = manifest.study.key();
    let dir = path
        .parent()
        .and_then(Path::file_name)
        .and_then(|n| n.to_str());
    let file = path.file_name().and_then(|n| n.to_str());
    if dir != Some(key.patient_id()) || file != Some(artifact::manifest(key).as_str()) {
        return Err(BsiError::InvalidStudy(format!(
            "清单 {} 与研究 {key} 的位置不符",
            path.display()
        )));
    }
    Ok(manifest)
}

impl ExactSizeIterator for StudyLoader {
    #[inline]
    fn len(&self) -> usize {
        self.data_rev.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{import_study, FsStageStore};
    use crate::view::ViewMap;
    use crate::{FrameStack, Study};
    use ndarray::Array2;

    #[test]
    fn test_discovers_imported_studies() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStageStore::new(dir.path());
        let frames =
            FrameStack::from_frames([Array2::<f32>::zeros((2, 2)), Array2::<f32>::zeros((2, 2))])
                .unwrap();
        let views = ViewMap {
            anterior: 0,
            posterior: 1,
        };
        for (pid, date) in [("B2", "20240102"), ("A1", "20240101"), ("A1", "20231231")] {
            let study = Study::new(pid, date, "s").unwrap();
            import_study(&store, &study, &frames, &[], views).unwrap();
        }
        fs::write(dir.path().join("A1").join("X_study.json"), b"not json").unwrap();
        fs::write(dir.path().join("stray.txt"), b"").unwrap();

        let loader = study_loader(dir.path()).unwrap();
        assert_eq!(loader.len(), 4);
        let items: Vec<_> = loader.collect();
        let ok: Vec<String> = items
            .iter()
            .filter_map(|(_, r)| r.as_ref().ok())
            .map(|m| m.study.key().stem())
            .collect();
        assert_eq!(ok, ["A1_20231231", "A1_20240101", "B2_20240102"]);
        assert_eq!(items.iter().filter(|(_, r)| r.is_err()).count(), 1);
    }

    #[test]
    fn test_missing_root() {
        assert!(study_loader("/definitely/not/a/dir").is_err());
    }

    #[test]
    fn test_misplaced_manifest_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStageStore::new(dir.path());
        let frames =
            FrameStack::from_frames([Array2::<f32>::zeros((2, 2)), Array2::<f32>::zeros((2, 2))])
                .unwrap();
        let views = ViewMap {
            anterior: 0,
            posterior: 1,
        };
        let study = Study::new("C3", "20240301", "s").unwrap();
        import_study(&store, &study, &frames, &[], views).unwrap();

        let name = artifact::manifest(study.key());
        fs::create_dir(dir.path().join("D4")).unwrap();
        fs::copy(
            dir.path().join("C3").join(&name),
            dir.path().join("D4").join(&name),
        )
        .unwrap();

        let items: Vec<_> = study_loader(dir.path()).unwrap().collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].1.is_ok());
        assert!(matches!(items[1].1, Err(BsiError::InvalidStudy(_))));
    }
}
