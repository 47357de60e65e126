use std::path::Path;

use serial_test::serial;

use super::*;

fn cli(args: &[&str]) -> CliArgs {
    CliArgs::parse_from(args)
}

#[test]
fn defaults_are_applied() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert_eq!(settings.cache.directory, Path::new(DEFAULT_CACHE_DIR));
    assert_eq!(settings.cache.ttl, Duration::from_secs(86_400));
    assert!(settings.cache.page_cache_enabled);
    assert!(settings.cache.gzip_enabled);
    assert!(!settings.cache.cache_logged_in);
    assert_eq!(settings.cache.allowed_query_params.len(), 7);
    assert_eq!(
        settings.cache.excluded_cookies,
        vec![
            "wordpress_logged_in_*",
            "woocommerce_cart_hash",
            "woocommerce_items_in_cart"
        ]
    );
    assert_eq!(settings.cache.login_cookie_prefix, "wordpress_logged_in_");
    assert_eq!(settings.cache.stats_flush_every.get(), 10);
    assert_eq!(settings.edge.api_base_url, DEFAULT_API_BASE_URL);
    assert_eq!(settings.edge.connection_status, ConnectionStatus::Disconnected);
    assert!(!settings.edge.is_usable());
    assert!(settings.site.base_url.is_none());
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("info".to_string());
    raw.cache.directory = Some(PathBuf::from("/var/cache/from-file"));

    raw.apply_cli_overrides(&cli(&[
        "blitz-cache",
        "--log-level",
        "debug",
        "--log-json",
        "true",
        "--cache-dir",
        "/tmp/blitz",
        "stats",
    ]));
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert!(matches!(settings.logging.format, LogFormat::Json));
    assert_eq!(settings.cache.directory, Path::new("/tmp/blitz"));
}

#[test]
fn zero_ttl_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.ttl_seconds = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero ttl");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.ttl_seconds",
            ..
        }
    ));
}

#[test]
fn zero_flush_interval_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.stats_flush_every = Some(0);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn unsafe_exclusion_patterns_are_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.excluded_urls = Some(vec!["/cart/*".to_string(), "../etc".to_string()]);

    let err = Settings::from_raw(raw).expect_err("unsafe pattern");
    assert!(err.to_string().contains("../etc"));
}

#[test]
fn blank_list_entries_are_dropped() {
    let mut raw = RawSettings::default();
    raw.cache.excluded_urls = Some(vec![" ".to_string(), " /checkout/* ".to_string()]);

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.excluded_urls, vec!["/checkout/*"]);
}

#[test]
fn connection_status_is_validated() {
    let mut raw = RawSettings::default();
    raw.edge.connection_status = Some("CONNECTED".to_string());
    raw.edge.api_token = Some("tok".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.edge.is_usable());

    let mut raw = RawSettings::default();
    raw.edge.connection_status = Some("maybe".to_string());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn sealed_token_is_opened() {
    let sealed = SecretBox::new("k3y")
        .expect("box")
        .seal("cf-token")
        .expect("seal");

    let mut raw = RawSettings::default();
    raw.edge.sealed_api_token = Some(sealed);
    raw.edge.secret_key = Some("k3y".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.edge.api_token.as_deref(), Some("cf-token"));
    assert!(settings.edge.credential_error.is_none());
}

#[test]
fn unopenable_token_counts_as_absent() {
    let sealed = SecretBox::new("k3y")
        .expect("box")
        .seal("cf-token")
        .expect("seal");

    let mut raw = RawSettings::default();
    raw.edge.sealed_api_token = Some(sealed);
    raw.edge.secret_key = Some("wrong".to_string());
    raw.edge.connection_status = Some("connected".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.edge.api_token.is_none());
    assert!(settings.edge.credential_error.is_some());
    assert!(!settings.edge.is_usable());
}

#[test]
fn debug_output_redacts_credentials() {
    let mut raw = RawSettings::default();
    raw.edge.api_token = Some("super-secret".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(!format!("{:?}", settings.edge).contains("super-secret"));
}

#[test]
fn invalid_site_url_is_rejected() {
    let mut raw = RawSettings::default();
    raw.site.base_url = Some("ftp://example.com".to_string());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn parse_invalidate_arguments() {
    let args = cli(&[
        "blitz-cache",
        "invalidate",
        "--url",
        "https://example.com/2024/03/05/hello/",
        "--published-at",
        "2024-03-05",
        "--author",
        "alice",
        "--term-url",
        "https://example.com/category/news/",
        "--term-url",
        "https://example.com/tag/rust/",
        "--revision",
    ]);

    match args.command {
        Command::Invalidate(invalidate) => {
            assert_eq!(invalidate.url, "https://example.com/2024/03/05/hello/");
            assert_eq!(invalidate.status, "publish");
            assert_eq!(invalidate.published_at.as_deref(), Some("2024-03-05"));
            assert_eq!(invalidate.author.as_deref(), Some("alice"));
            assert_eq!(invalidate.term_urls.len(), 2);
            assert!(invalidate.revision);
            assert!(!invalidate.autosave);
        }
        other => panic!("wrong command parsed: {other:?}"),
    }
}

#[test]
fn parse_edge_and_purge_commands() {
    assert!(matches!(
        cli(&["blitz-cache", "edge", "verify"]).command,
        Command::Edge(EdgeArgs {
            command: EdgeCommand::Verify
        })
    ));

    match cli(&["blitz-cache", "purge-url", "https://example.com/a/"]).command {
        Command::PurgeUrl(purge) => assert_eq!(purge.url, "https://example.com/a/"),
        other => panic!("wrong command parsed: {other:?}"),
    }

    let args = cli(&["blitz-cache", "purge-all", "--cache-dir", "/srv/cache"]);
    assert!(matches!(args.command, Command::PurgeAll));
    assert_eq!(args.cache_dir.as_deref(), Some(Path::new("/srv/cache")));
}

#[test]
#[serial]
fn file_then_environment_layers_apply() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("blitz.toml");
    std::fs::write(
        &path,
        "[cache]\nttl_seconds = 600\nmobile_cache = true\n\n[edge]\nzone_id = \"z1\"\nemail = \"ops@example.com\"\n",
    )
    .expect("write config");

    // SAFETY: serialized with every other test that touches the environment.
    unsafe { std::env::set_var("BLITZ__CACHE__TTL_SECONDS", "120") };
    let result = load(&cli(&[
        "blitz-cache",
        "--config-file",
        path.to_str().expect("utf-8 path"),
        "stats",
    ]));
    unsafe { std::env::remove_var("BLITZ__CACHE__TTL_SECONDS") };

    let settings = result.expect("valid settings");
    assert_eq!(settings.cache.ttl, Duration::from_secs(120));
    assert!(settings.cache.mobile_cache);
    assert_eq!(settings.edge.zone_id.as_deref(), Some("z1"));
    // an account email from older config files is accepted and ignored
    assert!(!format!("{:?}", settings.edge).contains("ops@example.com"));
}

#[test]
#[serial]
fn missing_explicit_config_file_is_an_error() {
    let args = cli(&[
        "blitz-cache",
        "--config-file",
        "/nonexistent/blitz-cache.toml",
        "stats",
    ]);
    assert!(matches!(load(&args), Err(LoadError::Build(_))));
}
