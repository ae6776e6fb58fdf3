//! 阶段产物的持久化存储.
//!
//! 产物是否存在即阶段是否完成的唯一依据, 存储后端因此必须保证:
//! 一个产物一旦可见, 其内容就是完整的.

use super::stage::artifact;
use crate::error::{BsiError, BsiResult};
use crate::StudyKey;
use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// 研究级的排他锁. 析构时释放.
pub struct StudyLock {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl StudyLock {
    /// 以析构时执行的释放操作创建锁守卫.
    pub fn new<F: FnOnce() + Send + 'static>(release: F) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for StudyLock {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for StudyLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StudyLock").finish_non_exhaustive()
    }
}

/// 按研究分区的产物存储.
pub trait StageStore: Send + Sync {
    /// 产物 `name` 是否存在且完整?
    fn exists(&self, key: &StudyKey, name: &str) -> bool;

    /// 读取产物.
    fn read(&self, key: &StudyKey, name: &str) -> BsiResult<Vec<u8>>;

    /// 写入 (或覆盖) 产物. 写入过程中, 其它读者看不到不完整的内容.
    fn write(&self, key: &StudyKey, name: &str, bytes: &[u8]) -> BsiResult<()>;

    /// 获取研究 `key` 的排他锁. 已被持有时返回 `Err(StudyLocked)`.
    fn lock(&self, key: &StudyKey) -> BsiResult<StudyLock>;
}

/// 本地文件系统存储. 研究 `key` 的产物位于 `{root}/{patient_id}/`.
///
/// 研究锁是产物目录中的 `{k}.lock` 文件, 内容为持有者的进程号.
///
/// # 注意
///
/// 进程崩溃后遗留的锁文件在下列情况下会被打破 (记录 `warn` 日志):
///
/// 1. 锁文件中的进程号在本机上已不存在 (仅 Linux);
/// 2. 设置了 [`FsStageStore::with_stale_after`], 且锁文件的修改时间早于该时长.
///
/// 进程号检查假定所有访问者运行在同一台主机上.
#[derive(Clone, Debug)]
pub struct FsStageStore {
    root: PathBuf,
    stale_after: Option<Duration>,
}

impl FsStageStore {
    /// 以 `root` 为根目录. 不按存在时长打破锁.
    #[inline]
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_owned(),
            stale_after: None,
        }
    }

    /// 存在超过 `age` 的锁文件视为失效.
    #[inline]
    pub fn with_stale_after(mut self, age: Duration) -> Self {
        self.stale_after = Some(age);
        self
    }

    /// 根目录.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 研究 `key` 的产物目录.
    #[inline]
    pub fn study_dir(&self, key: &StudyKey) -> PathBuf {
        self.root.join(key.patient_id())
    }

    /// 产物 `name` 的完整路径.
    #[inline]
    pub fn path_of(&self, key: &StudyKey, name: &str) -> PathBuf {
        self.study_dir(key).join(name)
    }

    /// 无条件删除研究 `key` 的锁文件. 返回锁文件是否存在.
    ///
    /// # 注意
    ///
    /// 只应在确认没有其它进程正在处理该研究时使用.
    pub fn break_lock(&self, key: &StudyKey) -> BsiResult<bool> {
        match fs::remove_file(self.path_of(key, &artifact::lock(key))) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// 锁文件 `path` 是否已失效? 失效时返回原因.
    fn stale_reason(&self, path: &Path) -> Option<String> {
        let holder = fs::read_to_string(path)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok());
        if let Some(pid) = holder {
            if pid == std::process::id() {
                return None;
            }
            if !process_alive(pid) {
                return Some(format!("进程 {pid} 已退出"));
            }
        }
        let limit = self.stale_after?;
        let age = fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()?
            .elapsed()
            .ok()?;
        (age >= limit).then(|| format!("已存在 {} 秒", age.as_secs()))
    }
}

/// 创建锁文件. 已存在时返回 `None`.
fn create_lock_file(path: &Path) -> io::Result<Option<fs::File>> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => Ok(Some(f)),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(e),
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        /// 本机上进程 `pid` 是否存在? 无法判断时视为存在.
        fn process_alive(pid: u32) -> bool {
            !Path::new("/proc/self").exists() || Path::new("/proc").join(pid.to_string()).exists()
        }
    } else {
        fn process_alive(_pid: u32) -> bool {
            true
        }
    }
}

impl StageStore for FsStageStore {
    fn exists(&self, key: &StudyKey, name: &str) -> bool {
        self.path_of(key, name).is_file()
    }

    fn read(&self, key: &StudyKey, name: &str) -> BsiResult<Vec<u8>> {
        Ok(fs::read(self.path_of(key, name))?)
    }

    fn write(&self, key: &StudyKey, name: &str, bytes: &[u8]) -> BsiResult<()> {
        let dir = self.study_dir(key);
        fs::create_dir_all(&dir)?;
        let target = dir.join(name);
        let part = dir.join(format!("{name}.part"));
        {
            let mut f = fs::File::create(&part)?;
            f.write_all(bytes)?;
            f.sync_all()?;
        }
        fs::rename(&part, &target)?;
        Ok(())
    }

    fn lock(&self, key: &StudyKey) -> BsiResult<StudyLock> {
        let dir = self.study_dir(key);
        fs::create_dir_all(&dir)?;
        let path = dir.join(artifact::lock(key));
        let mut f = match create_lock_file(&path)? {
            Some(f) => f,
            None => {
                let Some(reason) = self.stale_reason(&path) else {
                    return Err(BsiError::StudyLocked(key.clone()));
                };
                log::warn!("{key}: 打破失效的研究锁 {} ({reason})", path.display());
                self.break_lock(key)?;
                create_lock_file(&path)?.ok_or_else(|| BsiError::StudyLocked(key.clone()))?
            }
        };
        writeln!(f, "{}", std::process::id())?;
        Ok(StudyLock::new(move || {
            if let Err(e) = fs::remove_file(&path) {
                log::warn!("无法释放研究锁 {}: {e}", path.display());
            }
        }))
    }
}

type MemKey = (StudyKey, String);

/// 内存存储. 用于测试及嵌入其它程序.
#[derive(Debug, Default)]
pub struct MemStageStore {
    files: Mutex<HashMap<MemKey, Vec<u8>>>,
    locks: Arc<Mutex<HashSet<StudyKey>>>,
}

/// 忽略锁中毒: 存储内容总是整体替换, 不会处于中间状态.
#[inline]
fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemStageStore {
    /// 创建空存储.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 研究 `key` 下已有的产物名称, 按字典序排列.
    pub fn names(&self, key: &StudyKey) -> Vec<String> {
        let mut names: Vec<String> = guard(&self.files)
            .keys()
            .filter(|(k, _)| k == key)
            .map(|(_, n)| n.clone())
            .collect();
        names.sort();
        names
    }

    /// 删除一个产物. 返回它是否存在.
    pub fn remove(&self, key: &StudyKey, name: &str) -> bool {
        guard(&self.files)
            .remove(&(key.clone(), name.to_owned()))
            .is_some()
    }
}

impl StageStore for MemStageStore {
    fn exists(&self, key: &StudyKey, name: &str) -> bool {
        guard(&self.files).contains_key(&(key.clone(), name.to_owned()))
    }

    fn read(&self, key: &StudyKey, name: &str) -> BsiResult<Vec<u8>> {
        guard(&self.files)
            .get(&(key.clone(), name.to_owned()))
            .cloned()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("{key}: {name}")).into()
            })
    }

    fn write(&self, key: &StudyKey, name: &str, bytes: &[u8]) -> BsiResult<()> {
        guard(&self.files).insert((key.clone(), name.to_owned()), bytes.to_vec());
        Ok(())
    }

    fn lock(&self, key: &StudyKey) -> BsiResult<StudyLock> {
        if !guard(&self.locks).insert(key.clone()) {
            return Err(BsiError::StudyLocked(key.clone()));
        }
        let locks = Arc::clone(&self.locks);
        let key = key.clone();
        Ok(StudyLock::new(move || {
            guard(&locks).remove(&key);
        }))
    }
}
