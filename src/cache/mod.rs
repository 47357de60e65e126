//! Blitz full-page cache.
//!
//! Decides per request whether a rendered page may be cached, stores it on
//! disk with a gzip variant and an expiry record, and removes the affected
//! pages when content changes.
//!
//! ## Layout
//!
//! ```text
//! <base>/
//!   meta.json        key -> {url, file, created, expires, mobile}
//!   stats.json       hit/miss counters and disk usage
//!   pages/
//!     <key>.html
//!     <key>.html.gz
//! ```
//!
//! Keys are the lowercase MD5 hex of the canonical URL, with a `|mobile`
//! suffix hashed in for the mobile variant.

mod clock;
mod config;
mod deferred;
mod engine;
mod error;
mod events;
mod fsio;
mod hooks;
mod index;
mod keys;
mod layout;
mod lock;
mod middleware;
mod minify;
mod policy;
mod purge;
mod related;
mod request;
mod serving;
mod stats;
mod storage;
mod validate;

pub use clock::{Clock, FixedClock, SystemClock};
pub use self::config::{CacheabilityConfig, GlobPattern, compile_patterns};
pub(crate) use self::config::{
    DEFAULT_ALLOWED_QUERY_PARAMS, DEFAULT_EXCLUDED_COOKIES, DEFAULT_LOGIN_COOKIE_PREFIX,
};
pub use deferred::{Deferred, InlineDeferred, Job, TokioDeferred};
pub use engine::{Lookup, PageCache};
pub use error::StorageError;
pub use events::{InvalidationEvent, InvalidationKind};
pub use hooks::Hooks;
pub use index::MetaRecord;
pub use keys::{PageKey, derive_key, hash_key, is_mobile_variant, key_for_url};
pub use layout::CacheLayout;
pub use middleware::{MAX_CACHEABLE_BODY, PageCacheState, describe, page_cache_layer};
pub use minify::{minify, minify_with};
pub use policy::{Bypass, evaluate, should_cache};
pub use purge::{
    ContentChange, EdgeStatus, InvalidationReport, PublicationStatus, PurgeEngine, SkipReason,
};
pub use related::{PermalinkLayout, SiteLinks, related_urls};
pub use request::{RequestDescriptor, is_mobile_user_agent};
pub use serving::{CACHE_STATUS_HEADER, CachedPage, Encoding};
pub use stats::{CacheStatistics, StatsRecorder};
pub use storage::{EntrySource, PageStore, PurgeReport};
pub use validate::{is_safe_url_pattern, validate_url};
