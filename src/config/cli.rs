use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the Blitz Cache maintenance binary.
#[derive(Debug, Parser)]
#[command(
    name = "blitz-cache",
    version,
    about = "Blitz full-page cache maintenance"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "BLITZ_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the cache directory.
    #[arg(
        long = "cache-dir",
        value_name = "PATH",
        value_hint = ValueHint::DirPath,
        global = true
    )]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Create the cache directory layout.
    Init,
    /// Print cache statistics as JSON.
    Stats,
    /// Remove every cached page and purge the edge.
    #[command(name = "purge-all")]
    PurgeAll,
    /// Remove the cached desktop and mobile variants of one URL.
    #[command(name = "purge-url")]
    PurgeUrl(PurgeUrlArgs),
    /// Purge every page related to a published or updated item.
    Invalidate(InvalidateArgs),
    /// Edge cache utilities.
    Edge(EdgeArgs),
    /// Print the sealed form of an API token.
    #[command(name = "seal-token")]
    SealToken(SealTokenArgs),
}

#[derive(Debug, Args, Clone)]
pub struct PurgeUrlArgs {
    /// Absolute http(s) URL to purge.
    #[arg(value_name = "URL", value_hint = ValueHint::Url)]
    pub url: String,
}

#[derive(Debug, Args, Clone)]
pub struct InvalidateArgs {
    /// Canonical URL of the changed item.
    #[arg(long, value_name = "URL", value_hint = ValueHint::Url)]
    pub url: String,

    /// Host identifier of the item, used in logs and purge filters.
    #[arg(long = "content-id", value_name = "ID")]
    pub content_id: Option<String>,

    /// Publication status (publish|future|draft|pending|private|trash).
    #[arg(long, value_name = "STATUS", default_value = "publish")]
    pub status: String,

    /// Publication date, used for the date archives.
    #[arg(long = "published-at", value_name = "YYYY-MM-DD")]
    pub published_at: Option<String>,

    /// Author identifier, used for the author archive.
    #[arg(long = "author", value_name = "ID")]
    pub author: Option<String>,

    /// Archive URL of a term the item belongs to; repeatable.
    #[arg(long = "term-url", value_name = "URL")]
    pub term_urls: Vec<String>,

    /// Archive URL of the item's content type.
    #[arg(long = "archive-url", value_name = "URL")]
    pub archive_url: Option<String>,

    /// The change is a revision.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub revision: bool,

    /// The change is an autosave.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub autosave: bool,
}

#[derive(Debug, Args, Clone)]
pub struct EdgeArgs {
    #[command(subcommand)]
    pub command: EdgeCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum EdgeCommand {
    /// Check the configured API token.
    Verify,
    /// List the zones visible to the API token.
    Zones,
}

#[derive(Debug, Args, Clone)]
pub struct SealTokenArgs {
    /// Plain API token to seal with `edge.secret_key`.
    #[arg(value_name = "TOKEN")]
    pub token: String,
}
