use std::{process, sync::Arc};

use blitz_cache::{
    cache::{
        CacheLayout, Clock, ContentChange, Hooks, InlineDeferred, InvalidationReport,
        PublicationStatus, SystemClock,
    },
    config::{self, Command, EdgeCommand, InvalidateArgs, SecretBox, Settings},
    edge::CloudflareClient,
    infra::{error::InfraError, runtime, telemetry},
};
use serde::Serialize;
use serde_json::json;
use time::{Date, macros::format_description};
use tracing::{Dispatch, Level, dispatcher, error};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &InfraError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), InfraError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    match cli_args.command {
        Command::Init => run_init(&settings),
        Command::Stats => run_stats(&settings),
        Command::PurgeAll => {
            let engine = runtime::purge_engine(&settings, open_store(&settings)?)?;
            print_report(&engine.purge_all().await)
        }
        Command::PurgeUrl(args) => {
            let engine = runtime::purge_engine(&settings, open_store(&settings)?)?;
            print_report(&engine.purge_url(&args.url).await)
        }
        Command::Invalidate(args) => {
            let change = content_change(args)?;
            let engine = runtime::purge_engine(&settings, open_store(&settings)?)?;
            print_report(&engine.on_content_changed(&change).await)
        }
        Command::Edge(args) => run_edge(&settings, args.command).await,
        Command::SealToken(args) => {
            let secret_key = settings
                .edge
                .secret_key
                .as_deref()
                .ok_or_else(|| InfraError::configuration("edge.secret_key is not configured"))?;
            let sealed = SecretBox::new(secret_key)
                .and_then(|secret| secret.seal(&args.token))
                .map_err(|err| InfraError::configuration(err.to_string()))?;
            println!("{sealed}");
            Ok(())
        }
    }
}

fn open_store(settings: &Settings) -> Result<Arc<blitz_cache::cache::PageStore>, InfraError> {
    runtime::open_store(settings, Arc::new(InlineDeferred), Hooks::new())
}

fn run_init(settings: &Settings) -> Result<(), InfraError> {
    let layout = CacheLayout::init(&settings.cache.directory, SystemClock.now())?;
    print_json(&json!({
        "base": layout.base().display().to_string(),
        "pages": layout.pages_dir().display().to_string(),
        "meta": layout.meta_path().display().to_string(),
        "stats": layout.stats_path().display().to_string(),
    }))
}

fn run_stats(settings: &Settings) -> Result<(), InfraError> {
    let store = open_store(settings)?;
    store.stats().refresh_now();
    print_json(&store.stats().snapshot())
}

async fn run_edge(settings: &Settings, command: EdgeCommand) -> Result<(), InfraError> {
    if let Some(reason) = settings.edge.credential_error.as_deref() {
        return Err(InfraError::configuration(format!(
            "edge API token could not be unsealed: {reason}"
        )));
    }
    let client = CloudflareClient::new(&settings.edge.client_config())?;

    match command {
        EdgeCommand::Verify => {
            let outcome = client.test_connection().await;
            print_json(&json!({
                "status": outcome.status_label(),
                "outcome": format!("{outcome:?}"),
            }))
        }
        EdgeCommand::Zones => print_json(&client.list_zones().await?),
    }
}

fn content_change(args: InvalidateArgs) -> Result<ContentChange, InfraError> {
    let status = args
        .status
        .parse::<PublicationStatus>()
        .map_err(InfraError::configuration)?;
    let published_at = args
        .published_at
        .as_deref()
        .map(|raw| {
            Date::parse(raw, format_description!("[year]-[month]-[day]")).map_err(|err| {
                InfraError::configuration(format!("invalid --published-at `{raw}`: {err}"))
            })
        })
        .transpose()?;

    Ok(ContentChange {
        content_id: args.content_id.unwrap_or_else(|| args.url.clone()),
        canonical_url: args.url,
        status,
        is_revision: args.revision,
        is_autosave: args.autosave,
        published_at,
        author_id: args.author,
        taxonomy_term_urls: args.term_urls,
        content_type_archive_url: args.archive_url,
    })
}

fn print_report(report: &InvalidationReport) -> Result<(), InfraError> {
    print_json(&json!({
        "event_id": report.event_id,
        "kind": report.kind.as_str(),
        "urls": report.urls,
        "skipped": report.skipped.map(|reason| reason.as_str()),
        "local_deleted": report.local_deleted,
        "local_failures": report.local_failures,
        "edge": report.edge.as_str(),
        "success": report.is_success(),
    }))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), InfraError> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|err| InfraError::configuration(format!("failed to render output: {err}")))?;
    println!("{out}");
    Ok(())
}
