//! Cache key derivation.
//!
//! Keys are the lowercase hex MD5 of the canonical URL, with `|mobile`
//! appended for the mobile variant. They double as payload file names, so the
//! format is fixed at 32 hex characters.

use std::fmt;

use md5::{Digest, Md5};

use super::config::CacheabilityConfig;
use super::error::StorageError;
use super::request::RequestDescriptor;

const MOBILE_SUFFIX: &str = "|mobile";
const KEY_LEN: usize = 32;

/// A validated 32-character lowercase hex cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageKey(String);

impl PageKey {
    /// Parse a key, accepting either case and normalizing to lowercase.
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        if raw.len() == KEY_LEN && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(raw.to_ascii_lowercase()))
        } else {
            Err(StorageError::InvalidKey(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn html_file_name(&self) -> String {
        format!("{}.html", self.0)
    }

    pub fn gzip_file_name(&self) -> String {
        format!("{}.html.gz", self.0)
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash arbitrary input into a key.
pub fn hash_key(input: &str) -> PageKey {
    PageKey(hex::encode(Md5::digest(input.as_bytes())))
}

/// Key for an absolute URL, optionally for its mobile variant.
pub fn key_for_url(url: &str, mobile: bool) -> PageKey {
    if mobile {
        hash_key(&format!("{url}{MOBILE_SUFFIX}"))
    } else {
        hash_key(url)
    }
}

/// Whether this request is served from the mobile variant.
pub fn is_mobile_variant(request: &RequestDescriptor, config: &CacheabilityConfig) -> bool {
    config.mobile_cache && request.is_mobile_device
}

/// Derive the key for a request under the given configuration.
pub fn derive_key(request: &RequestDescriptor, config: &CacheabilityConfig) -> PageKey {
    key_for_url(&request.url(), is_mobile_variant(request, config))
}
