use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use fd_lock::RwLock as FdLock;
use tracing::warn;

use super::error::StorageError;

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                target_module = target,
                lock_kind = "mutex.lock",
                result = "poisoned_recovered",
                hint = "state may be stale after panic in another thread",
                "Recovered from poisoned cache lock"
            );
            poisoned.into_inner()
        }
    }
}

/// Exclusive writer lock for one persisted file.
///
/// Threads in this process queue on the mutex; other processes queue on an
/// advisory lock held on a sibling `.lock` file.
#[derive(Debug)]
pub(crate) struct FileLock {
    path: PathBuf,
    local: Mutex<()>,
}

impl FileLock {
    pub(crate) fn for_file(target: &Path) -> Self {
        let mut name = target
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        Self {
            path: target.with_file_name(name),
            local: Mutex::new(()),
        }
    }

    /// Run `f` while holding both the in-process and the on-disk lock.
    pub(crate) fn with_exclusive<R>(
        &self,
        target: &'static str,
        op: &'static str,
        f: impl FnOnce() -> Result<R, StorageError>,
    ) -> Result<R, StorageError> {
        let _local = mutex_lock(&self.local, target, op);

        let file = self.open()?;
        let mut advisory = FdLock::new(file);
        let _held = advisory
            .write()
            .map_err(|source| StorageError::io("lock", &self.path, source))?;

        f()
    }

    fn open(&self) -> Result<File, StorageError> {
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.path)
            .map_err(|source| StorageError::io("open_lock", &self.path, source))
    }
}
