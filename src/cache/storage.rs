//! The page store: plain and gzip payloads plus their metadata records.
//!
//! Public operations never return errors. Failures are logged with the key
//! and path involved and folded into a miss, `false`, or a purge report.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use metrics::{counter, histogram};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{debug, error, info, warn};

use super::clock::Clock;
use super::config::CacheabilityConfig;
use super::deferred::Deferred;
use super::error::StorageError;
use super::fsio::{remove_if_exists, write_atomic};
use super::hooks::Hooks;
use super::index::{MetaIndex, MetaRecord};
use super::keys::{PageKey, key_for_url};
use super::layout::CacheLayout;
use super::minify::minify_with;
use super::serving::{CachedPage, Encoding};
use super::stats::StatsRecorder;

const METRIC_STORE_TOTAL: &str = "blitz_cache_store_total";
const METRIC_STORE_MS: &str = "blitz_cache_store_ms";
const METRIC_PURGE_FILES_TOTAL: &str = "blitz_cache_purge_files_total";

/// Identity of the page being written.
#[derive(Debug, Clone, Copy)]
pub struct EntrySource<'a> {
    pub url: &'a str,
    pub mobile: bool,
}

/// Outcome of removing every payload file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub deleted: usize,
    pub failed: usize,
}

impl PurgeReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Filesystem-backed page cache.
#[derive(Debug)]
pub struct PageStore {
    layout: CacheLayout,
    index: MetaIndex,
    stats: StatsRecorder,
    clock: Arc<dyn Clock>,
    hooks: Hooks,
}

impl PageStore {
    /// Initialize (or reopen) the cache directory at `base`.
    pub fn open(
        base: &Path,
        clock: Arc<dyn Clock>,
        deferred: Arc<dyn Deferred>,
        hooks: Hooks,
    ) -> Result<Self, StorageError> {
        let layout = CacheLayout::init(base, clock.now())?;
        info!(
            op = "cache::storage::open",
            result = "ok",
            cache_path = %layout.base().display(),
            "Page cache directory ready"
        );
        Ok(Self {
            index: MetaIndex::new(&layout),
            stats: StatsRecorder::new(&layout, deferred),
            layout,
            clock,
            hooks,
        })
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    pub fn stats(&self) -> &StatsRecorder {
        &self.stats
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    pub fn metadata(&self, key: &PageKey) -> Option<MetaRecord> {
        self.index.get(key)
    }

    /// Fetch a fresh entry, preferring gzip when the client and config allow it.
    pub fn get(
        &self,
        key: &PageKey,
        accepts_gzip: bool,
        config: &CacheabilityConfig,
    ) -> Option<CachedPage> {
        let Some(record) = self.index.get(key) else {
            self.stats.record_miss(config.stats_flush_every);
            return None;
        };

        if !record.is_fresh(self.clock.now()) {
            debug!(
                op = "cache::storage::get",
                result = "expired",
                cache_key = %key,
                expires = record.expires,
                "Cache entry expired"
            );
            self.stats.record_miss(config.stats_flush_every);
            return None;
        }

        match self.read_payload(key, accepts_gzip && config.gzip_enabled) {
            Ok(page) => {
                self.stats.record_hit(config.stats_flush_every);
                Some(page)
            }
            Err(err) => {
                warn!(
                    op = "cache::storage::get",
                    result = "read_error",
                    cache_key = %key,
                    error_code = err.code(),
                    error = %err,
                    "Failed to read cached page; serving a miss"
                );
                self.stats.record_miss(config.stats_flush_every);
                None
            }
        }
    }

    fn read_payload(&self, key: &PageKey, prefer_gzip: bool) -> Result<CachedPage, StorageError> {
        if prefer_gzip {
            let path = self.layout.gzip_path(key)?;
            match fs::read(&path) {
                Ok(body) => {
                    return Ok(CachedPage {
                        body: Bytes::from(body),
                        encoding: Encoding::Gzip,
                    });
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(source) => return Err(StorageError::io("read", &path, source)),
            }
        }

        let path = self.layout.html_path(key)?;
        let body = fs::read(&path).map_err(|source| StorageError::io("read", &path, source))?;
        Ok(CachedPage {
            body: Bytes::from(body),
            encoding: Encoding::Identity,
        })
    }

    /// Minify, sign and persist `html` under `key`, then record its metadata.
    ///
    /// Returns `false` only when the plain payload or the metadata write fails.
    pub fn store(
        &self,
        key: &PageKey,
        source: EntrySource<'_>,
        html: &str,
        config: &CacheabilityConfig,
    ) -> bool {
        let started_at = Instant::now();
        let outcome = self.write_entry(key, source, html, config);
        histogram!(METRIC_STORE_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        match outcome {
            Ok(payload_bytes) => {
                counter!(METRIC_STORE_TOTAL, "result" => "ok").increment(1);
                debug!(
                    op = "cache::storage::store",
                    result = "ok",
                    cache_key = %key,
                    url = source.url,
                    payload_bytes,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "Stored page in cache"
                );
                self.stats
                    .schedule_refresh(Duration::from_secs(config.stats_refresh_delay_secs));
                true
            }
            Err(err) => {
                counter!(METRIC_STORE_TOTAL, "result" => "error").increment(1);
                error!(
                    op = "cache::storage::store",
                    result = "error",
                    cache_key = %key,
                    url = source.url,
                    error_code = err.code(),
                    error = %err,
                    "Failed to store page in cache"
                );
                false
            }
        }
    }

    fn write_entry(
        &self,
        key: &PageKey,
        source: EntrySource<'_>,
        html: &str,
        config: &CacheabilityConfig,
    ) -> Result<usize, StorageError> {
        let html = self.hooks.before_store(html.to_string());
        let mut payload = if config.html_minify_enabled {
            minify_with(&html, &self.hooks)
        } else {
            html
        };

        let now = self.clock.now();
        payload.push_str(&signature(now));

        let plain_path = self.layout.html_path(key)?;
        let gzip_path = self.layout.gzip_path(key)?;
        write_atomic(self.layout.pages_dir(), &plain_path, payload.as_bytes())?;

        if config.gzip_enabled {
            if let Err(err) = self.write_gzip(&gzip_path, payload.as_bytes()) {
                warn!(
                    op = "cache::storage::store_gzip",
                    result = "error",
                    cache_key = %key,
                    error_code = err.code(),
                    error = %err,
                    "Failed to write compressed variant; serving plain only"
                );
                self.discard_stale_gzip(key, &gzip_path);
            }
        } else {
            self.discard_stale_gzip(key, &gzip_path);
        }

        self.index.upsert(
            key,
            MetaRecord {
                url: source.url.to_string(),
                file: key.html_file_name(),
                created: now,
                expires: config.expires_at(now),
                mobile: source.mobile,
            },
        )?;

        Ok(payload.len())
    }

    fn write_gzip(&self, path: &Path, payload: &[u8]) -> Result<(), StorageError> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
        encoder
            .write_all(payload)
            .map_err(|source| StorageError::io("gzip", path, source))?;
        let compressed = encoder
            .finish()
            .map_err(|source| StorageError::io("gzip", path, source))?;
        write_atomic(self.layout.pages_dir(), path, &compressed)
    }

    fn discard_stale_gzip(&self, key: &PageKey, path: &Path) {
        if let Err(err) = remove_if_exists(path) {
            warn!(
                op = "cache::storage::discard_gzip",
                result = "error",
                cache_key = %key,
                error = %err,
                "Failed to remove stale compressed variant"
            );
        }
    }

    /// Remove both payloads and the metadata record. Idempotent.
    pub fn delete(&self, key: &PageKey) -> bool {
        match self.remove_entry(key) {
            Ok(removed) => {
                let result = if removed { "removed" } else { "absent" };
                debug!(
                    op = "cache::storage::delete",
                    result,
                    cache_key = %key,
                    "Deleted cache entry"
                );
                true
            }
            Err(err) => {
                error!(
                    op = "cache::storage::delete",
                    result = "error",
                    cache_key = %key,
                    error_code = err.code(),
                    error = %err,
                    "Failed to delete cache entry"
                );
                false
            }
        }
    }

    fn remove_entry(&self, key: &PageKey) -> Result<bool, StorageError> {
        let plain = remove_if_exists(&self.layout.html_path(key)?)?;
        let gzip = remove_if_exists(&self.layout.gzip_path(key)?)?;
        let meta = self.index.remove(key)?;
        Ok(plain || gzip || meta)
    }

    /// Delete the desktop and mobile variants of `url`.
    pub fn purge_url(&self, url: &str) -> bool {
        let desktop = self.delete(&key_for_url(url, false));
        let mobile = self.delete(&key_for_url(url, true));
        desktop && mobile
    }

    /// Remove every payload file and reset the index.
    ///
    /// Every file is attempted; failures are counted, never fatal.
    pub fn purge_all(&self) -> PurgeReport {
        let mut report = PurgeReport::default();

        for path in self.payload_files() {
            match fs::remove_file(&path) {
                Ok(()) => report.deleted += 1,
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        op = "cache::storage::purge_all",
                        result = "error",
                        cache_path = %path.display(),
                        error = %err,
                        "Failed to delete cache file during purge"
                    );
                }
            }
        }
        counter!(METRIC_PURGE_FILES_TOTAL, "result" => "deleted").increment(report.deleted as u64);
        counter!(METRIC_PURGE_FILES_TOTAL, "result" => "failed").increment(report.failed as u64);

        if let Err(err) = self.index.reset() {
            report.failed += 1;
            error!(
                op = "cache::storage::purge_all",
                result = "index_error",
                error_code = err.code(),
                error = %err,
                "Failed to reset cache index"
            );
        }

        self.stats.refresh_now();
        self.stats.mark_purged(self.clock.now());

        if report.is_clean() {
            info!(
                op = "cache::storage::purge_all",
                result = "ok",
                deleted = report.deleted,
                "Purged all cached pages"
            );
        } else {
            warn!(
                op = "cache::storage::purge_all",
                result = "partial",
                deleted = report.deleted,
                failed = report.failed,
                "Purge completed with errors"
            );
        }

        report
    }

    fn payload_files(&self) -> Vec<PathBuf> {
        let pages = self.layout.pages_dir();
        match fs::read_dir(pages) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_ok_and(|kind| !kind.is_dir()))
                .map(|entry| entry.path())
                .collect(),
            Err(err) => {
                warn!(
                    op = "cache::storage::purge_all",
                    result = "io_error",
                    cache_path = %pages.display(),
                    error = %err,
                    "Failed to list cache pages"
                );
                Vec::new()
            }
        }
    }
}

fn signature(now: i64) -> String {
    let stamp = OffsetDateTime::from_unix_timestamp(now)
        .ok()
        .and_then(|at| {
            at.format(format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second]"
            ))
            .ok()
        })
        .unwrap_or_else(|| now.to_string());
    format!("\n<!-- Cached by Blitz Cache on {stamp} UTC -->")
}
