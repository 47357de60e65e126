//! Representations handed back to the host on a hit.

use bytes::Bytes;

pub const CACHE_STATUS_HEADER: &str = "X-Blitz-Cache";
const HTML_CONTENT_TYPE: &str = "text/html; charset=UTF-8";

/// Encoding of a served payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Identity,
    Gzip,
}

impl Encoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Gzip => "gzip",
        }
    }
}

/// A fresh cached page ready to be written to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPage {
    pub body: Bytes,
    pub encoding: Encoding,
}

impl CachedPage {
    /// Response headers that must accompany the body.
    pub fn headers(&self) -> Vec<(&'static str, &'static str)> {
        let mut headers = vec![("Content-Type", HTML_CONTENT_TYPE)];
        match self.encoding {
            Encoding::Identity => headers.push((CACHE_STATUS_HEADER, "HIT")),
            Encoding::Gzip => {
                headers.push((CACHE_STATUS_HEADER, "HIT (gzip)"));
                headers.push(("Content-Encoding", "gzip"));
                headers.push(("Vary", "Accept-Encoding"));
            }
        }
        headers
    }
}
