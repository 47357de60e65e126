//! Cloudflare v4 API client for edge purges.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::EdgePurger;
use super::cooldown::Cooldown;
use super::error::EdgeError;

pub const DEFAULT_API_BASE_URL: &str = "https://api.cloudflare.com/client/v4";
/// URLs accepted by one purge call.
pub const PURGE_BATCH_LIMIT: usize = 30;
const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(60);
const ERROR_BODY_LIMIT: usize = 512;

const METRIC_PURGE_TOTAL: &str = "blitz_edge_purge_total";
const METRIC_RATE_LIMITED_TOTAL: &str = "blitz_edge_rate_limited_total";
const METRIC_REQUEST_MS: &str = "blitz_edge_request_ms";

/// Connection parameters for [`CloudflareClient`].
#[derive(Debug, Clone)]
pub struct CloudflareConfig {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub zone_id: Option<String>,
    pub timeout: Duration,
}

/// Result of a credential check, keeping the three failure classes apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionOutcome {
    Connected,
    /// The token is missing or the API refused it.
    CredentialInvalid { reason: String },
    /// The API could not be reached at all.
    Unreachable { reason: String },
    /// The API answered but rejected the request for another reason.
    Rejected { message: String },
}

impl ConnectionOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Value to persist as the connection status setting.
    pub fn status_label(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::CredentialInvalid { .. } => "disconnected",
            Self::Unreachable { .. } | Self::Rejected { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    message: String,
}

impl<T> Envelope<T> {
    fn first_error(&self) -> String {
        self.errors
            .first()
            .map(|error| error.message.clone())
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| "Unknown error".to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CloudflareClient {
    client: Client,
    base: String,
    token: Option<String>,
    zone_id: Option<String>,
    cooldown: Cooldown,
}

impl CloudflareClient {
    pub fn new(config: &CloudflareConfig) -> Result<Self, EdgeError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            base: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone().filter(|token| !token.is_empty()),
            zone_id: config.zone_id.clone().filter(|zone| !zone.is_empty()),
            cooldown: Cooldown::new(RATE_LIMIT_COOLDOWN),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("blitz-cache/", env!("CARGO_PKG_VERSION"))
    }

    pub fn has_credential(&self) -> bool {
        self.token.is_some()
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
    ) -> Result<Envelope<T>, EdgeError> {
        let token = self.token.as_deref().ok_or(EdgeError::MissingCredential)?;

        if self.cooldown.is_active(endpoint) {
            counter!(METRIC_RATE_LIMITED_TOTAL).increment(1);
            warn!(
                op = "edge::cloudflare::request",
                result = "cooling_down",
                endpoint,
                "Edge API call suppressed during rate-limit cool-down"
            );
            return Err(EdgeError::RateLimited {
                endpoint: endpoint.to_string(),
            });
        }

        let started_at = Instant::now();
        let mut request = self
            .client
            .request(method.clone(), format!("{}{endpoint}", self.base))
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let sent = request.send().await;
        histogram!(METRIC_REQUEST_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        let response = sent.inspect_err(|err| {
            warn!(
                op = "edge::cloudflare::request",
                result = "transport_error",
                endpoint,
                method = %method,
                error = %err,
                "Edge API request failed"
            );
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            self.cooldown.start(endpoint);
            counter!(METRIC_RATE_LIMITED_TOTAL).increment(1);
            warn!(
                op = "edge::cloudflare::request",
                result = "rate_limited",
                endpoint,
                cooldown_secs = self.cooldown.window().as_secs(),
                "Edge API rate limit hit"
            );
            return Err(EdgeError::RateLimited {
                endpoint: endpoint.to_string(),
            });
        }

        let bytes = response.bytes().await?;
        if !status.is_success() {
            let body: String = String::from_utf8_lossy(&bytes)
                .chars()
                .take(ERROR_BODY_LIMIT)
                .collect();
            warn!(
                op = "edge::cloudflare::request",
                result = "http_error",
                endpoint,
                status = status.as_u16(),
                "Edge API returned an error status"
            );
            return Err(EdgeError::Http {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_slice(&bytes).map_err(|err| EdgeError::Decode(err.to_string()))
    }

    /// Verify the token against the API.
    pub async fn test_connection(&self) -> ConnectionOutcome {
        if self.token.is_none() {
            return ConnectionOutcome::CredentialInvalid {
                reason: EdgeError::MissingCredential.to_string(),
            };
        }

        let outcome = match self
            .request::<Value>(Method::GET, "/user/tokens/verify", None)
            .await
        {
            Ok(envelope) if envelope.success => ConnectionOutcome::Connected,
            Ok(envelope) => ConnectionOutcome::Rejected {
                message: envelope.first_error(),
            },
            Err(EdgeError::Http { status, body }) if status == 401 || status == 403 => {
                ConnectionOutcome::CredentialInvalid {
                    reason: format!("status {status}: {body}"),
                }
            }
            Err(EdgeError::MissingCredential) => ConnectionOutcome::CredentialInvalid {
                reason: EdgeError::MissingCredential.to_string(),
            },
            Err(EdgeError::Transport(err)) => ConnectionOutcome::Unreachable {
                reason: err.to_string(),
            },
            Err(other) => ConnectionOutcome::Rejected {
                message: other.to_string(),
            },
        };

        info!(
            op = "edge::cloudflare::test_connection",
            result = outcome.status_label(),
            "Edge connection checked"
        );
        outcome
    }

    pub async fn list_zones(&self) -> Result<Vec<Zone>, EdgeError> {
        let envelope = self.request::<Vec<Zone>>(Method::GET, "/zones", None).await?;
        if !envelope.success {
            return Err(EdgeError::Api {
                message: envelope.first_error(),
            });
        }
        Ok(envelope.result.unwrap_or_default())
    }

    async fn purge(&self, body: Value, scope: &'static str) -> Result<(), EdgeError> {
        let zone = self.zone_id.as_deref().ok_or(EdgeError::MissingZone)?;
        let endpoint = format!("/zones/{zone}/purge_cache");
        let envelope = self
            .request::<Value>(Method::POST, &endpoint, Some(body))
            .await?;
        if envelope.success {
            Ok(())
        } else {
            Err(EdgeError::Api {
                message: format!("{scope}: {}", envelope.first_error()),
            })
        }
    }

    fn record_purge(&self, scope: &'static str, outcome: &Result<(), EdgeError>, urls: usize) {
        match outcome {
            Ok(()) => {
                counter!(METRIC_PURGE_TOTAL, "result" => "ok").increment(1);
                info!(
                    op = "edge::cloudflare::purge",
                    scope,
                    result = "ok",
                    url_count = urls,
                    "Edge cache purged"
                );
            }
            Err(err) => {
                counter!(METRIC_PURGE_TOTAL, "result" => err.code()).increment(1);
                warn!(
                    op = "edge::cloudflare::purge",
                    scope,
                    result = "error",
                    error_code = err.code(),
                    error = %err,
                    url_count = urls,
                    "Edge cache purge failed"
                );
            }
        }
    }
}

#[async_trait]
impl EdgePurger for CloudflareClient {
    async fn purge_urls(&self, urls: &[String]) -> bool {
        if urls.is_empty() {
            return false;
        }
        if self.zone_id.is_none() {
            self.record_purge("urls", &Err(EdgeError::MissingZone), urls.len());
            return false;
        }

        let mut all_ok = true;
        for chunk in urls.chunks(PURGE_BATCH_LIMIT) {
            let outcome = self.purge(json!({ "files": chunk }), "urls").await;
            self.record_purge("urls", &outcome, chunk.len());
            all_ok &= outcome.is_ok();
        }
        all_ok
    }

    async fn purge_everything(&self) -> bool {
        let outcome = self
            .purge(json!({ "purge_everything": true }), "everything")
            .await;
        self.record_purge("everything", &outcome, 0);
        outcome.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use httpmock::MockServer;

    use super::*;

    fn client(server: &MockServer, zone: Option<&str>) -> CloudflareClient {
        CloudflareClient::new(&CloudflareConfig {
            api_base_url: server.base_url(),
            api_token: Some("tok".to_string()),
            zone_id: zone.map(str::to_string),
            timeout: Duration::from_secs(5),
        })
        .expect("client")
    }

    #[tokio::test]
    async fn verify_success_is_connected() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("GET")
                .path("/user/tokens/verify")
                .header("authorization", "Bearer tok");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"success":true,"errors":[],"result":{"status":"active"}}"#);
        });

        assert_eq!(
            client(&server, None).test_connection().await,
            ConnectionOutcome::Connected
        );
        mock.assert();
    }

    #[tokio::test]
    async fn verify_distinguishes_failure_classes() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("GET").path("/user/tokens/verify");
            then.status(401).body(r#"{"success":false}"#);
        });
        assert!(matches!(
            client(&server, None).test_connection().await,
            ConnectionOutcome::CredentialInvalid { .. }
        ));

        let missing = CloudflareClient::new(&CloudflareConfig {
            api_base_url: server.base_url(),
            api_token: None,
            zone_id: None,
            timeout: Duration::from_secs(5),
        })
        .expect("client");
        assert!(matches!(
            missing.test_connection().await,
            ConnectionOutcome::CredentialInvalid { .. }
        ));

        let unreachable = CloudflareClient::new(&CloudflareConfig {
            api_base_url: "http://127.0.0.1:9".to_string(),
            api_token: Some("tok".to_string()),
            zone_id: None,
            timeout: Duration::from_secs(2),
        })
        .expect("client");
        assert!(matches!(
            unreachable.test_connection().await,
            ConnectionOutcome::Unreachable { .. }
        ));
    }

    #[tokio::test]
    async fn verify_reports_first_api_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("GET").path("/user/tokens/verify");
            then.status(200)
                .body(r#"{"success":false,"errors":[{"code":1000,"message":"Invalid API Token"}]}"#);
        });
        assert_eq!(
            client(&server, None).test_connection().await,
            ConnectionOutcome::Rejected {
                message: "Invalid API Token".to_string()
            }
        );
    }

    #[tokio::test]
    async fn purge_urls_is_chunked() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("POST").path("/zones/z1/purge_cache");
            then.status(200).body(r#"{"success":true,"errors":[],"result":{"id":"z1"}}"#);
        });

        let urls: Vec<String> = (0..65)
            .map(|n| format!("https://example.com/{n}/"))
            .collect();
        assert!(client(&server, Some("z1")).purge_urls(&urls).await);
        mock.assert_calls(3);
    }

    #[tokio::test]
    async fn purge_sends_file_list() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("POST")
                .path("/zones/z1/purge_cache")
                .json_body(json!({ "files": ["https://example.com/a/"] }));
            then.status(200).body(r#"{"success":true}"#);
        });

        assert!(
            client(&server, Some("z1"))
                .purge_urls(&["https://example.com/a/".to_string()])
                .await
        );
        mock.assert();
    }

    #[tokio::test]
    async fn purge_requires_zone_and_urls() {
        let server = MockServer::start();
        let without_zone = client(&server, None);
        assert!(
            !without_zone
                .purge_urls(&["https://example.com/".to_string()])
                .await
        );
        assert!(!without_zone.purge_everything().await);
        assert!(!client(&server, Some("z1")).purge_urls(&[]).await);
    }

    #[tokio::test]
    async fn rate_limit_starts_cooldown() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("POST").path("/zones/z1/purge_cache");
            then.status(429).body(r#"{"success":false}"#);
        });

        let client = client(&server, Some("z1"));
        assert!(!client.purge_everything().await);
        assert!(!client.purge_everything().await);
        mock.assert_calls(1);
    }

    #[tokio::test]
    async fn list_zones_maps_results() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("GET").path("/zones");
            then.status(200).body(
                r#"{"success":true,"result":[{"id":"z1","name":"example.com","status":"active","plan":{}}]}"#,
            );
        });

        let zones = client(&server, None).list_zones().await.expect("zones");
        assert_eq!(
            zones,
            vec![Zone {
                id: "z1".to_string(),
                name: "example.com".to_string(),
                status: "active".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn undecodable_body_is_reported() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("GET").path("/zones");
            then.status(200).body("<html>oops</html>");
        });

        let err = client(&server, None).list_zones().await.expect_err("decode");
        assert_eq!(err.code(), "decode");
    }
}
