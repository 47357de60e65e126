use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use super::error::StorageError;

#[cfg(unix)]
pub(crate) const FILE_MODE: u32 = 0o644;
#[cfg(unix)]
pub(crate) const DIR_MODE: u32 = 0o711;

/// Write `bytes` to `target` through a temp file in `dir` and an atomic rename.
///
/// Readers observe either the previous content or the new one, never a mix.
pub(crate) fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let mut temp = tempfile::Builder::new()
        .prefix(".blitz-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|source| StorageError::io("create_temp", dir, source))?;

    temp.write_all(bytes)
        .map_err(|source| StorageError::io("write_temp", temp.path(), source))?;
    temp.as_file()
        .sync_all()
        .map_err(|source| StorageError::io("sync_temp", temp.path(), source))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(temp.path(), fs::Permissions::from_mode(FILE_MODE))
            .map_err(|source| StorageError::io("chmod_temp", temp.path(), source))?;
    }

    temp.persist(target)
        .map_err(|err| StorageError::io("rename", target, err.error))?;
    Ok(())
}

/// Remove a file; a missing file counts as removed.
///
/// Returns whether a file was actually deleted.
pub(crate) fn remove_if_exists(path: &Path) -> Result<bool, StorageError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(source) => Err(StorageError::io("remove", path, source)),
    }
}

/// Create `path` and its parents with the cache directory mode.
pub(crate) fn create_dir(path: &Path) -> Result<(), StorageError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder
        .create(path)
        .map_err(|source| StorageError::io("create_dir", path, source))
}
