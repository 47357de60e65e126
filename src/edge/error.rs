use thiserror::Error;

/// Failures talking to the edge cache API.
#[derive(Debug, Error)]
pub enum EdgeError {
    #[error("edge API token is not configured")]
    MissingCredential,
    #[error("edge zone id is not configured")]
    MissingZone,
    #[error("edge API rate limited on {endpoint}; cooling down")]
    RateLimited { endpoint: String },
    #[error("edge API transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("edge API returned status {status}: {body}")]
    Http { status: u16, body: String },
    #[error("edge API rejected the request: {message}")]
    Api { message: String },
    #[error("failed to decode edge API response: {0}")]
    Decode(String),
}

impl EdgeError {
    /// Stable short code used in structured log fields and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::MissingZone => "missing_zone",
            Self::RateLimited { .. } => "rate_limited",
            Self::Transport(_) => "transport",
            Self::Http { .. } => "http",
            Self::Api { .. } => "api",
            Self::Decode(_) => "decode",
        }
    }
}
