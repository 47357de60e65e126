//! Invalidation events.
//!
//! Every purge entry point stamps its work with one event so the log lines of
//! a single invalidation can be correlated.

use std::fmt;

use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

/// What triggered an invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationKind {
    ContentChanged,
    ContentDeleted,
    CommentChanged,
    Url,
    All,
}

impl InvalidationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContentChanged => "content_changed",
            Self::ContentDeleted => "content_deleted",
            Self::CommentChanged => "comment_changed",
            Self::Url => "url",
            Self::All => "all",
        }
    }
}

impl fmt::Display for InvalidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct InvalidationEvent {
    /// UUIDv4 used as the correlation id in logs.
    pub id: Uuid,
    pub kind: InvalidationKind,
    pub timestamp: OffsetDateTime,
}

impl InvalidationEvent {
    /// Create an event and log its start.
    pub fn begin(kind: InvalidationKind, subject: &str) -> Self {
        let event = Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: OffsetDateTime::now_utc(),
        };
        info!(
            event_id = %event.id,
            event_kind = %kind,
            subject,
            "Cache invalidation started"
        );
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_get_distinct_ids() {
        let a = InvalidationEvent::begin(InvalidationKind::Url, "https://example.com/");
        let b = InvalidationEvent::begin(InvalidationKind::Url, "https://example.com/");
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.get_version_num(), 4);
    }

    #[test]
    fn kind_labels() {
        assert_eq!(InvalidationKind::ContentChanged.to_string(), "content_changed");
        assert_eq!(InvalidationKind::All.as_str(), "all");
    }
}
