//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU64, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::{level_filters::LevelFilter, warn};

use crate::cache::{
    DEFAULT_ALLOWED_QUERY_PARAMS, DEFAULT_EXCLUDED_COOKIES, DEFAULT_LOGIN_COOKIE_PREFIX,
    is_safe_url_pattern, validate_url,
};
use crate::edge::{CloudflareConfig, DEFAULT_API_BASE_URL};

mod cli;
mod secret;

pub use cli::{
    CliArgs, Command, EdgeArgs, EdgeCommand, InvalidateArgs, PurgeUrlArgs, SealTokenArgs,
};
pub use secret::{EncryptionFailure, SecretBox};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "blitz-cache";
const ENV_PREFIX: &str = "BLITZ";
const DEFAULT_CACHE_DIR: &str = "cache/blitz-cache";
const DEFAULT_TTL_SECS: u64 = 86_400;
const DEFAULT_STATS_FLUSH_EVERY: u64 = 10;
const DEFAULT_STATS_REFRESH_DELAY_SECS: u64 = 5;
const DEFAULT_EDGE_TIMEOUT_SECS: u64 = 30;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub edge: EdgeSettings,
    pub site: SiteSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub directory: PathBuf,
    pub page_cache_enabled: bool,
    pub ttl: Duration,
    pub cache_logged_in: bool,
    pub mobile_cache: bool,
    pub gzip_enabled: bool,
    pub html_minify_enabled: bool,
    pub cache_query_strings: bool,
    pub allowed_query_params: Vec<String>,
    pub excluded_urls: Vec<String>,
    pub excluded_cookies: Vec<String>,
    pub excluded_user_agents: Vec<String>,
    pub login_cookie_prefix: String,
    pub stats_flush_every: NonZeroU64,
    pub stats_refresh_delay: Duration,
}

/// Last known state of the edge API connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    Connected,
    #[default]
    Disconnected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }
}

impl FromStr for ConnectionStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "connected" => Ok(Self::Connected),
            "disconnected" | "" => Ok(Self::Disconnected),
            "error" => Ok(Self::Error),
            other => Err(format!(
                "expected connected, disconnected or error, got `{other}`"
            )),
        }
    }
}

#[derive(Clone)]
pub struct EdgeSettings {
    /// Plain API token, already unsealed when it was configured sealed.
    pub api_token: Option<String>,
    pub zone_id: Option<String>,
    pub connection_status: ConnectionStatus,
    pub api_base_url: String,
    pub timeout: Duration,
    pub secret_key: Option<String>,
    /// Why a sealed token could not be opened.
    pub credential_error: Option<String>,
}

impl std::fmt::Debug for EdgeSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeSettings")
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("zone_id", &self.zone_id)
            .field("connection_status", &self.connection_status)
            .field("api_base_url", &self.api_base_url)
            .field("timeout", &self.timeout)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("credential_error", &self.credential_error)
            .finish()
    }
}

impl EdgeSettings {
    /// Invalidations are forwarded only for a verified, credentialed connection.
    pub fn is_usable(&self) -> bool {
        self.api_token.is_some() && self.connection_status == ConnectionStatus::Connected
    }

    pub fn client_config(&self) -> CloudflareConfig {
        CloudflareConfig {
            api_base_url: self.api_base_url.clone(),
            api_token: self.api_token.clone(),
            zone_id: self.zone_id.clone(),
            timeout: self.timeout,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SiteSettings {
    pub base_url: Option<String>,
    pub posts_index_path: Option<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_cli_overrides(cli);
    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    edge: RawEdgeSettings,
    site: RawSiteSettings,
}

impl RawSettings {
    fn apply_cli_overrides(&mut self, cli: &CliArgs) {
        if let Some(level) = cli.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = cli.log_json {
            self.logging.json = Some(json);
        }
        if let Some(directory) = cli.cache_dir.as_ref() {
            self.cache.directory = Some(directory.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            cache,
            edge,
            site,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            cache: build_cache_settings(cache)?,
            edge: build_edge_settings(edge)?,
            site: build_site_settings(site)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let directory = cache
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "cache.directory",
            "path must not be empty",
        ));
    }

    let ttl_seconds = cache.ttl_seconds.unwrap_or(DEFAULT_TTL_SECS);
    if ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.ttl_seconds",
            "must be greater than zero",
        ));
    }
    i64::try_from(ttl_seconds).map_err(|_| {
        LoadError::invalid(
            "cache.ttl_seconds",
            "value exceeds supported range for i64",
        )
    })?;

    let stats_flush_every = NonZeroU64::new(
        cache
            .stats_flush_every
            .unwrap_or(DEFAULT_STATS_FLUSH_EVERY),
    )
    .ok_or_else(|| LoadError::invalid("cache.stats_flush_every", "must be greater than zero"))?;

    let excluded_urls = trimmed_list(cache.excluded_urls.unwrap_or_default());
    if let Some(pattern) = excluded_urls
        .iter()
        .find(|pattern| !is_safe_url_pattern(pattern))
    {
        return Err(LoadError::invalid(
            "cache.excluded_urls",
            format!("unsafe pattern `{pattern}`"),
        ));
    }

    let login_cookie_prefix = cache
        .login_cookie_prefix
        .map(|prefix| prefix.trim().to_string())
        .unwrap_or_else(|| DEFAULT_LOGIN_COOKIE_PREFIX.to_string());

    Ok(CacheSettings {
        directory,
        page_cache_enabled: cache.page_cache_enabled.unwrap_or(true),
        ttl: Duration::from_secs(ttl_seconds),
        cache_logged_in: cache.cache_logged_in.unwrap_or(false),
        mobile_cache: cache.mobile_cache.unwrap_or(false),
        gzip_enabled: cache.gzip_enabled.unwrap_or(true),
        html_minify_enabled: cache.html_minify_enabled.unwrap_or(true),
        cache_query_strings: cache.cache_query_strings.unwrap_or(false),
        allowed_query_params: cache
            .allowed_query_params
            .map(trimmed_list)
            .unwrap_or_else(|| to_strings(&DEFAULT_ALLOWED_QUERY_PARAMS)),
        excluded_urls,
        excluded_cookies: cache
            .excluded_cookies
            .map(trimmed_list)
            .unwrap_or_else(|| to_strings(&DEFAULT_EXCLUDED_COOKIES)),
        excluded_user_agents: trimmed_list(cache.excluded_user_agents.unwrap_or_default()),
        login_cookie_prefix,
        stats_flush_every,
        stats_refresh_delay: Duration::from_secs(
            cache
                .stats_refresh_delay_seconds
                .unwrap_or(DEFAULT_STATS_REFRESH_DELAY_SECS),
        ),
    })
}

fn build_edge_settings(edge: RawEdgeSettings) -> Result<EdgeSettings, LoadError> {
    let connection_status = match edge.connection_status {
        Some(raw) => ConnectionStatus::from_str(&raw)
            .map_err(|reason| LoadError::invalid("edge.connection_status", reason))?,
        None => ConnectionStatus::default(),
    };

    let timeout_seconds = edge.timeout_seconds.unwrap_or(DEFAULT_EDGE_TIMEOUT_SECS);
    if timeout_seconds == 0 {
        return Err(LoadError::invalid(
            "edge.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let api_base_url = non_blank(edge.api_base_url)
        .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
    if !validate_url(&api_base_url) {
        return Err(LoadError::invalid(
            "edge.api_base_url",
            format!("`{api_base_url}` is not an http(s) URL"),
        ));
    }

    let secret_key = non_blank(edge.secret_key);
    let mut credential_error = None;
    let api_token = match (non_blank(edge.api_token), non_blank(edge.sealed_api_token)) {
        (Some(token), _) => Some(token),
        (None, Some(sealed)) => {
            match unseal(&sealed, secret_key.as_deref()) {
                Ok(token) => non_blank(Some(token)),
                Err(failure) => {
                    warn!(
                        op = "config::edge",
                        result = "unseal_failed",
                        error = %failure,
                        "Sealed edge API token could not be opened; edge purging is disabled"
                    );
                    credential_error = Some(failure.reason);
                    None
                }
            }
        }
        (None, None) => None,
    };

    Ok(EdgeSettings {
        api_token,
        zone_id: non_blank(edge.zone_id),
        connection_status,
        api_base_url,
        timeout: Duration::from_secs(timeout_seconds),
        secret_key,
        credential_error,
    })
}

fn unseal(sealed: &str, secret_key: Option<&str>) -> Result<String, EncryptionFailure> {
    let secret_key = secret_key.ok_or_else(|| EncryptionFailure {
        reason: "edge.secret_key is not configured".to_string(),
    })?;
    SecretBox::new(secret_key)?.open(sealed)
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let base_url = non_blank(site.base_url);
    if let Some(url) = base_url.as_deref()
        && !validate_url(url)
    {
        return Err(LoadError::invalid(
            "site.base_url",
            format!("`{url}` is not an http(s) URL"),
        ));
    }

    Ok(SiteSettings {
        base_url,
        posts_index_path: non_blank(site.posts_index_path),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    directory: Option<PathBuf>,
    page_cache_enabled: Option<bool>,
    ttl_seconds: Option<u64>,
    cache_logged_in: Option<bool>,
    mobile_cache: Option<bool>,
    gzip_enabled: Option<bool>,
    html_minify_enabled: Option<bool>,
    cache_query_strings: Option<bool>,
    allowed_query_params: Option<Vec<String>>,
    excluded_urls: Option<Vec<String>>,
    excluded_cookies: Option<Vec<String>>,
    excluded_user_agents: Option<Vec<String>>,
    login_cookie_prefix: Option<String>,
    stats_flush_every: Option<u64>,
    stats_refresh_delay_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawEdgeSettings {
    api_token: Option<String>,
    sealed_api_token: Option<String>,
    secret_key: Option<String>,
    zone_id: Option<String>,
    connection_status: Option<String>,
    api_base_url: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    base_url: Option<String>,
    posts_index_path: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn trimmed_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .filter_map(|value| non_blank(Some(value)))
        .collect()
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[cfg(test)]
mod tests;
