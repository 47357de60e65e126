//! Statistics aggregation (`stats.json`).
//!
//! Hit and miss counters are buffered in process-wide atomics and folded into
//! the file every Nth event through the [`Deferred`] scheduler. Counts are
//! approximate under races; a lost increment is acceptable.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::deferred::Deferred;
use super::error::StorageError;
use super::fsio::write_atomic;
use super::layout::CacheLayout;
use super::lock::FileLock;

const SOURCE: &str = "cache::stats";
const METRIC_HIT_TOTAL: &str = "blitz_cache_hit_total";
const METRIC_MISS_TOTAL: &str = "blitz_cache_miss_total";

/// Durable aggregate counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub cached_pages: u64,
    /// Bytes of plain payload on disk.
    pub cache_size: u64,
    pub last_warmup: i64,
    pub last_purge: i64,
    pub period_start: i64,
}

impl CacheStatistics {
    pub fn started_at(now: i64) -> Self {
        Self {
            period_start: now,
            ..Self::default()
        }
    }

    /// Share of lookups served from the cache, in percent.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 * 100.0 / total as f64
        }
    }
}

#[derive(Debug)]
struct StatsFile {
    dir: PathBuf,
    path: PathBuf,
    lock: FileLock,
}

impl StatsFile {
    fn read(&self) -> CacheStatistics {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return CacheStatistics::default(),
            Err(err) => {
                warn!(
                    op = "cache::stats::read",
                    result = "io_error",
                    cache_path = %self.path.display(),
                    error = %err,
                    "Failed to read cache statistics"
                );
                return CacheStatistics::default();
            }
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|err| {
            warn!(
                op = "cache::stats::read",
                result = "corrupt",
                cache_path = %self.path.display(),
                error = %err,
                "Cache statistics are malformed; starting from zero"
            );
            CacheStatistics::default()
        })
    }

    fn update(
        &self,
        op: &'static str,
        apply: impl FnOnce(&mut CacheStatistics),
    ) -> Result<(), StorageError> {
        self.lock.with_exclusive(SOURCE, op, || {
            let mut stats = self.read();
            apply(&mut stats);
            let bytes = serde_json::to_vec_pretty(&stats)?;
            write_atomic(&self.dir, &self.path, &bytes)
        })
    }

    fn update_logged(&self, op: &'static str, apply: impl FnOnce(&mut CacheStatistics)) {
        if let Err(err) = self.update(op, apply) {
            warn!(
                op,
                result = "error",
                error_code = err.code(),
                error = %err,
                "Failed to update cache statistics"
            );
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Hit,
    Miss,
}

impl Outcome {
    fn flush_label(self) -> &'static str {
        match self {
            Self::Hit => "stats_flush_hits",
            Self::Miss => "stats_flush_misses",
        }
    }

    fn add(self, stats: &mut CacheStatistics, count: u64) {
        let field = match self {
            Self::Hit => &mut stats.hits,
            Self::Miss => &mut stats.misses,
        };
        *field = field.saturating_add(count);
    }
}

/// Buffers hit/miss observations and maintains `stats.json`.
#[derive(Debug)]
pub struct StatsRecorder {
    file: Arc<StatsFile>,
    pages_dir: PathBuf,
    deferred: Arc<dyn Deferred>,
    pending_hits: AtomicU64,
    pending_misses: AtomicU64,
    refresh_pending: Arc<AtomicBool>,
}

impl StatsRecorder {
    pub fn new(layout: &CacheLayout, deferred: Arc<dyn Deferred>) -> Self {
        let path = layout.stats_path().to_path_buf();
        Self {
            file: Arc::new(StatsFile {
                dir: layout.base().to_path_buf(),
                lock: FileLock::for_file(&path),
                path,
            }),
            pages_dir: layout.pages_dir().to_path_buf(),
            deferred,
            pending_hits: AtomicU64::new(0),
            pending_misses: AtomicU64::new(0),
            refresh_pending: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn record_hit(&self, flush_every: u64) {
        counter!(METRIC_HIT_TOTAL).increment(1);
        self.observe(Outcome::Hit, flush_every);
    }

    pub fn record_miss(&self, flush_every: u64) {
        counter!(METRIC_MISS_TOTAL).increment(1);
        self.observe(Outcome::Miss, flush_every);
    }

    fn observe(&self, outcome: Outcome, flush_every: u64) {
        let pending = match outcome {
            Outcome::Hit => &self.pending_hits,
            Outcome::Miss => &self.pending_misses,
        };
        let seen = pending.fetch_add(1, Ordering::Relaxed) + 1;
        if seen < flush_every.max(1) {
            return;
        }
        let taken = pending.swap(0, Ordering::Relaxed);
        if taken == 0 {
            return;
        }

        let file = self.file.clone();
        self.deferred.defer(
            outcome.flush_label(),
            Duration::ZERO,
            Box::new(move || {
                file.update_logged(outcome.flush_label(), |stats| outcome.add(stats, taken))
            }),
        );
    }

    /// Write any buffered hits and misses now.
    pub fn flush(&self) {
        let hits = self.pending_hits.swap(0, Ordering::Relaxed);
        let misses = self.pending_misses.swap(0, Ordering::Relaxed);
        if hits == 0 && misses == 0 {
            return;
        }
        self.file.update_logged("stats_flush", |stats| {
            stats.hits = stats.hits.saturating_add(hits);
            stats.misses = stats.misses.saturating_add(misses);
        });
    }

    /// Schedule a rescan of the pages directory; coalesces with one already pending.
    pub fn schedule_refresh(&self, delay: Duration) {
        if self.refresh_pending.swap(true, Ordering::AcqRel) {
            return;
        }
        let file = self.file.clone();
        let pages_dir = self.pages_dir.clone();
        let pending = self.refresh_pending.clone();
        self.deferred.defer(
            "stats_refresh",
            delay,
            Box::new(move || {
                pending.store(false, Ordering::Release);
                refresh_counts(&file, &pages_dir);
            }),
        );
    }

    /// Rescan the pages directory on the calling thread.
    pub fn refresh_now(&self) {
        refresh_counts(&self.file, &self.pages_dir);
    }

    pub fn mark_purged(&self, now: i64) {
        self.file
            .update_logged("mark_purged", |stats| stats.last_purge = now);
    }

    pub fn mark_warmup(&self, now: i64) {
        self.file
            .update_logged("mark_warmup", |stats| stats.last_warmup = now);
    }

    pub fn snapshot(&self) -> CacheStatistics {
        self.file.read()
    }
}

impl Drop for StatsRecorder {
    /// Buffered observations below the flush threshold are written when the
    /// owning store goes away, so a clean shutdown loses nothing.
    fn drop(&mut self) {
        self.flush();
    }
}

fn refresh_counts(file: &StatsFile, pages_dir: &Path) {
    let (pages, bytes) = scan_pages(pages_dir);
    file.update_logged("stats_refresh", |stats| {
        stats.cached_pages = pages;
        stats.cache_size = bytes;
    });
}

/// Count `*.html` payloads and sum their sizes.
fn scan_pages(pages_dir: &Path) -> (u64, u64) {
    let entries = match fs::read_dir(pages_dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(
                op = "cache::stats::scan",
                result = "io_error",
                cache_path = %pages_dir.display(),
                error = %err,
                "Failed to scan cache pages"
            );
            return (0, 0);
        }
    };

    entries
        .filter_map(Result::ok)
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|extension| extension == "html")
        })
        .filter_map(|entry| entry.metadata().ok())
        .filter(|metadata| metadata.is_file())
        .fold((0, 0), |(pages, bytes), metadata| {
            (pages + 1, bytes + metadata.len())
        })
}
