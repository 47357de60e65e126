//! Inbound request descriptor supplied by the host.

use std::collections::BTreeSet;

/// Everything the cache needs to know about one inbound request.
///
/// Hosts build this from their own request type; see
/// [`crate::cache::page_cache_layer`] for the axum adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub method: String,
    /// `http` or `https`.
    pub scheme: String,
    pub host: String,
    /// Path plus raw query string exactly as received (`/foo/?a=1`).
    pub request_uri: String,
    /// Cookie names present on the request.
    pub cookies: BTreeSet<String>,
    /// Decoded query parameters in arrival order.
    pub query_params: Vec<(String, String)>,
    pub user_agent: String,
    pub is_logged_in: bool,
    pub accepts_compressed_encoding: bool,
    pub is_mobile_device: bool,
    pub has_body_data: bool,
}

impl RequestDescriptor {
    /// A plain anonymous GET for `url`, with query parameters parsed from it.
    ///
    /// Returns `None` when `url` has no host.
    pub fn get(url: &str) -> Option<Self> {
        let parsed = url::Url::parse(url).ok()?;
        let host = match parsed.port() {
            Some(port) => format!("{}:{port}", parsed.host_str()?),
            None => parsed.host_str()?.to_string(),
        };
        let mut request_uri = parsed.path().to_string();
        if let Some(query) = parsed.query() {
            request_uri.push('?');
            request_uri.push_str(query);
        }
        let query_params = parsed
            .query_pairs()
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();

        Some(Self {
            method: "GET".to_string(),
            scheme: parsed.scheme().to_string(),
            host,
            request_uri,
            cookies: BTreeSet::new(),
            query_params,
            user_agent: String::new(),
            is_logged_in: false,
            accepts_compressed_encoding: false,
            is_mobile_device: false,
            has_body_data: false,
        })
    }

    /// Canonical URL: scheme, host and the request URI with no reordering.
    pub fn url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host, self.request_uri)
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.to_string();
        self
    }

    pub fn with_cookie(mut self, name: &str) -> Self {
        self.cookies.insert(name.to_string());
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    pub fn logged_in(mut self, value: bool) -> Self {
        self.is_logged_in = value;
        self
    }

    pub fn accepting_gzip(mut self, value: bool) -> Self {
        self.accepts_compressed_encoding = value;
        self
    }

    pub fn mobile(mut self, value: bool) -> Self {
        self.is_mobile_device = value;
        self
    }

    pub fn with_body(mut self, value: bool) -> Self {
        self.has_body_data = value;
        self
    }
}

/// Rough mobile user-agent classification, equivalent to the usual CMS check.
pub fn is_mobile_user_agent(user_agent: &str) -> bool {
    const MARKERS: [&str; 7] = [
        "Mobile",
        "Android",
        "Silk/",
        "Kindle",
        "BlackBerry",
        "Opera Mini",
        "Opera Mobi",
    ];
    MARKERS.iter().any(|marker| user_agent.contains(marker))
}
