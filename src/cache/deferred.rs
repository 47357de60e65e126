//! Follow-up work scheduled off the request path.

use std::fmt;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, warn};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// The host's mechanism for running a unit of work later.
pub trait Deferred: Send + Sync + fmt::Debug {
    fn defer(&self, label: &'static str, delay: Duration, job: Job);
}

/// Runs jobs on the blocking pool of the current tokio runtime after `delay`.
///
/// Outside a runtime the job runs inline and the delay is skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDeferred;

impl Deferred for TokioDeferred {
    fn defer(&self, label: &'static str, delay: Duration, job: Job) {
        let Ok(handle) = Handle::try_current() else {
            debug!(op = "cache::deferred", label, mode = "inline", "No runtime; running job now");
            job();
            return;
        };

        handle.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(err) = tokio::task::spawn_blocking(job).await {
                warn!(
                    op = "cache::deferred",
                    label,
                    result = "join_error",
                    error = %err,
                    "Deferred cache job failed"
                );
            }
        });
    }
}

/// Runs every job immediately on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDeferred;

impl Deferred for InlineDeferred {
    fn defer(&self, _label: &'static str, _delay: Duration, job: Job) {
        job();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn inline_runs_immediately() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        InlineDeferred.defer(
            "test",
            Duration::from_secs(60),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn tokio_deferred_without_runtime_runs_inline() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        TokioDeferred.defer(
            "test",
            Duration::from_secs(60),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tokio_deferred_runs_after_delay() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        TokioDeferred.defer(
            "test",
            Duration::from_millis(50),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        tokio::time::timeout(Duration::from_secs(5), async {
            while ran.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("job should run");
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
