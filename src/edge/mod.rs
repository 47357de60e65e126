//! Edge (CDN) cache purging.

use std::fmt;

use async_trait::async_trait;

mod cloudflare;
mod cooldown;
mod error;

pub use cloudflare::{
    CloudflareClient, CloudflareConfig, ConnectionOutcome, DEFAULT_API_BASE_URL,
    PURGE_BATCH_LIMIT, Zone,
};
pub use cooldown::Cooldown;
pub use error::EdgeError;

/// Remote cache that mirrors local invalidations.
///
/// Both operations report failure as `false`; the failure itself is logged by
/// the implementation and never interrupts local purging.
#[async_trait]
pub trait EdgePurger: Send + Sync + fmt::Debug {
    async fn purge_urls(&self, urls: &[String]) -> bool;

    async fn purge_everything(&self) -> bool;
}
