//! On-disk layout of a cache directory.
//!
//! ```text
//! <base>/
//!   meta.json        key -> metadata record
//!   stats.json       aggregate counters
//!   pages/{key}.html
//!   pages/{key}.html.gz
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::error;

use super::error::StorageError;
use super::fsio::{create_dir, write_atomic};
use super::keys::PageKey;
use super::stats::CacheStatistics;

const PAGES_DIR: &str = "pages";
const META_FILE: &str = "meta.json";
const STATS_FILE: &str = "stats.json";

/// Resolved paths of an initialized cache directory.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    base: PathBuf,
    pages: PathBuf,
    meta: PathBuf,
    stats: PathBuf,
}

impl CacheLayout {
    /// Create the directory tree and seed missing index and statistics files.
    ///
    /// Safe to call on an existing layout; nothing already present is touched.
    pub fn init(base: &Path, now: i64) -> Result<Self, StorageError> {
        create_dir(base)?;
        let base = fs::canonicalize(base)
            .map_err(|source| StorageError::io("canonicalize", base, source))?;
        let pages = base.join(PAGES_DIR);
        create_dir(&pages)?;

        let layout = Self {
            meta: base.join(META_FILE),
            stats: base.join(STATS_FILE),
            pages,
            base,
        };

        if !layout.meta.exists() {
            write_atomic(&layout.base, &layout.meta, b"{}")?;
        }
        if !layout.stats.exists() {
            let initial = serde_json::to_vec_pretty(&CacheStatistics::started_at(now))?;
            write_atomic(&layout.base, &layout.stats, &initial)?;
        }

        Ok(layout)
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn pages_dir(&self) -> &Path {
        &self.pages
    }

    pub fn meta_path(&self) -> &Path {
        &self.meta
    }

    pub fn stats_path(&self) -> &Path {
        &self.stats
    }

    pub fn html_path(&self, key: &PageKey) -> Result<PathBuf, StorageError> {
        self.contain(&self.pages.join(key.html_file_name()))
    }

    pub fn gzip_path(&self, key: &PageKey) -> Result<PathBuf, StorageError> {
        self.contain(&self.pages.join(key.gzip_file_name()))
    }

    /// Resolve `path` and refuse it unless it lies inside the base directory.
    ///
    /// Paths that do not exist yet are resolved through their parent.
    pub fn contain(&self, path: &Path) -> Result<PathBuf, StorageError> {
        let resolved = match fs::canonicalize(path) {
            Ok(resolved) => resolved,
            Err(_) => {
                let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
                    return Err(self.refuse(path));
                };
                fs::canonicalize(parent)
                    .map_err(|source| StorageError::io("canonicalize", parent, source))?
                    .join(name)
            }
        };

        if resolved.starts_with(&self.base) {
            Ok(resolved)
        } else {
            Err(self.refuse(path))
        }
    }

    fn refuse(&self, path: &Path) -> StorageError {
        error!(
            op = "cache::layout::contain",
            result = "refused",
            cache_path = %path.display(),
            base = %self.base.display(),
            "Refusing cache path outside the base directory"
        );
        StorageError::path_escape(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_tree_and_seed_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = dir.path().join("blitz");
        let layout = CacheLayout::init(&base, 1_000).expect("init");

        assert!(layout.pages_dir().is_dir());
        assert_eq!(fs::read_to_string(layout.meta_path()).expect("meta"), "{}");

        let stats: CacheStatistics =
            serde_json::from_slice(&fs::read(layout.stats_path()).expect("stats")).expect("json");
        assert_eq!(stats.period_start, 1_000);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn init_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = CacheLayout::init(dir.path(), 1).expect("first init");
        fs::write(layout.meta_path(), b"{\"kept\":1}").expect("seed meta");

        let again = CacheLayout::init(dir.path(), 2).expect("second init");
        assert_eq!(
            fs::read_to_string(again.meta_path()).expect("meta"),
            "{\"kept\":1}"
        );
    }

    #[cfg(unix)]
    #[test]
    fn directories_deny_listing_to_others() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let layout = CacheLayout::init(&dir.path().join("fresh"), 1).expect("init");
        let mode = fs::metadata(layout.pages_dir())
            .expect("metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o007, 0o001);
    }

    #[test]
    fn contain_accepts_new_files_under_base() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = CacheLayout::init(dir.path(), 1).expect("init");
        let key = PageKey::parse("d41d8cd98f00b204e9800998ecf8427e").expect("key");

        let path = layout.html_path(&key).expect("contained");
        assert!(path.starts_with(layout.base()));
        assert!(path.ends_with("pages/d41d8cd98f00b204e9800998ecf8427e.html"));
    }

    #[test]
    fn contain_refuses_traversal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = dir.path().join("cache");
        let layout = CacheLayout::init(&base, 1).expect("init");
        fs::write(dir.path().join("secret"), b"x").expect("outside file");

        let err = layout
            .contain(&layout.pages_dir().join("../../secret"))
            .expect_err("escape");
        assert_eq!(err.code(), "path_escape");

        let base_itself = layout
            .contain(&layout.pages_dir().join(".."))
            .expect("parent of pages is the base itself");
        assert_eq!(base_itself, layout.base());
    }

    #[cfg(unix)]
    #[test]
    fn contain_refuses_symlink_out_of_base() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outside = tempfile::tempdir().expect("outside");
        let layout = CacheLayout::init(dir.path(), 1).expect("init");
        let link = layout.pages_dir().join("link.html");
        std::os::unix::fs::symlink(outside.path().join("target.html"), &link).expect("symlink");
        fs::write(outside.path().join("target.html"), b"x").expect("target");

        assert!(layout.contain(&link).is_err());
    }
}
