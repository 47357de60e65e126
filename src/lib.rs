//! Blitz Cache: a full-page HTTP response cache.
//!
//! - [`cache`] holds the engine: cacheability policy, key derivation, on-disk
//!   storage, serving, statistics and invalidation.
//! - [`edge`] forwards invalidations to a Cloudflare-compatible CDN.
//! - [`config`] resolves layered settings and the maintenance CLI.
//! - [`infra`] wires telemetry and the engine together for binaries.

pub mod cache;
pub mod config;
pub mod edge;
pub mod infra;
