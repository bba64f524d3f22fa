//! domsnap - interactive-element indexing and DOM snapshots.
//!
//! Main entry point for the domsnap CLI.

mod cli;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use domsnap_config::{Config, ConfigLoader, ConfigValidator, LoggingConfig};
use domsnap_engine::host::MutationSource;
use domsnap_engine::{
    forward_mutations, serialize, Action, ActionExecutor, ActionSettings, CaptureController,
    CaptureOptions, CaptureSettings, CdpClient, CdpDocument,
};

use cli::{Cli, Commands};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Get the .domsnap directory path.
fn domsnap_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".domsnap"))
        .unwrap_or_else(|| PathBuf::from(".domsnap"))
}

/// Initialize tracing with console and file output.
///
/// Console output goes to stderr so stdout carries only snapshots. Log files
/// rotate daily under `logging.directory`.
fn init_tracing(logging: &LoggingConfig) -> CliResult<()> {
    let log_dir = PathBuf::from(ConfigLoader::expand_path(&logging.directory.to_string_lossy()));
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("domsnap")
        .filename_suffix("log")
        .max_log_files(14)
        .build(&log_dir)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            logging
                .json
                .then(|| fmt::layer().json().with_writer(std::io::stderr)),
        )
        .with(
            (!logging.json).then(|| {
                fmt::layer()
                    .with_target(true)
                    .with_ansi(true)
                    .with_writer(std::io::stderr)
            }),
        )
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(())
}

fn load_config(cli: &Cli) -> CliResult<Config> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| domsnap_dir().join("config.toml"));
    let path = PathBuf::from(ConfigLoader::expand_path(&path.to_string_lossy()));
    let mut config = ConfigLoader::load_or_default(&path)?;
    if let Some(endpoint) = &cli.endpoint {
        config.browser.endpoint = endpoint.clone();
    }
    Ok(config)
}

fn capture_settings(config: &Config) -> CaptureSettings {
    let capture = &config.capture;
    CaptureSettings {
        stability_timeout: Duration::from_millis(capture.stability_timeout_ms),
        stability_quiet: Duration::from_millis(capture.stability_quiet_ms),
        debounce: Duration::from_millis(capture.debounce_ms),
        min_capture_interval: Duration::from_millis(capture.min_capture_interval_ms),
        overlay_throttle: Duration::from_millis(capture.overlay_throttle_ms),
        include_attributes: config.serialize.include_attributes.clone(),
    }
}

fn action_settings(config: &Config) -> ActionSettings {
    ActionSettings {
        settle_delay: Duration::from_millis(config.action.settle_delay_ms),
        action_delay: Duration::from_millis(config.action.action_delay_ms),
        include_dynamic_attributes: config.action.include_dynamic_attributes,
    }
}

fn capture_options(config: &Config) -> CaptureOptions {
    CaptureOptions {
        render_overlay: config.capture.render_overlay,
        viewport_expansion: config.capture.viewport_expansion,
        debug: config.capture.debug,
        ..Default::default()
    }
}

/// Attach to the first page of the browser. The client must outlive the
/// document, since it owns the connection.
async fn open_page(config: &Config, url: Option<&str>) -> CliResult<(CdpClient, Arc<CdpDocument>)> {
    let timeout = Duration::from_secs(config.browser.request_timeout_secs);
    let client = CdpClient::connect_with_timeout(&config.browser.endpoint, timeout).await?;
    let page = client.attach_first_page().await?;

    if let Some(url) = url {
        page.navigate(url).await?;
        page.wait_for_load().await?;
        info!(url, "Navigated");
    }

    Ok((client, Arc::new(CdpDocument::new(Arc::new(page)))))
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config.logging)?;

    for warning in ConfigValidator::validate(&config)?.into_result()? {
        warn!(path = %warning.path, "{}", warning.message);
    }

    match cli.command {
        Commands::Capture {
            url,
            expansion,
            overlay,
            focus,
            json,
        } => {
            let mut options = capture_options(&config);
            if let Some(expansion) = expansion {
                options.viewport_expansion = expansion;
            }
            options.render_overlay |= overlay || focus.is_some();
            options.focus_index = focus;
            run_capture(&config, url.as_deref(), options, json).await
        }
        Commands::Act { index, kind, value } => {
            let action = Action {
                index,
                kind: kind.into(),
                value,
            };
            run_action(&config, action).await
        }
        Commands::Watch { overlay } => {
            let mut options = capture_options(&config);
            options.render_overlay |= overlay;
            run_watch(&config, options).await
        }
    }
}

async fn run_capture(
    config: &Config,
    url: Option<&str>,
    options: CaptureOptions,
    as_json: bool,
) -> CliResult<()> {
    let (_client, document) = open_page(config, url).await?;
    let controller = CaptureController::new(document, capture_settings(config));
    let outcome = controller.capture(&options).await?;

    if as_json {
        let output = json!({
            "url": outcome.snapshot.url(),
            "title": outcome.snapshot.title(),
            "stable": outcome.stable,
            "indexed": outcome.snapshot.selector_map().len(),
            "serialized": outcome.serialized,
            "metrics": outcome.metrics,
            "snapshot": outcome.snapshot.as_ref(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", outcome.serialized);
    }
    Ok(())
}

async fn run_action(config: &Config, action: Action) -> CliResult<()> {
    let (_client, document) = open_page(config, None).await?;
    let controller = CaptureController::new(document.clone(), capture_settings(config));
    let executor = ActionExecutor::new(document, controller.subscribe(), action_settings(config));

    controller.capture(&capture_options(config)).await?;
    if !executor.validate_action(&action) {
        return Err(format!("invalid {} action on index {}", action.kind, action.index).into());
    }
    executor.try_execute(&action).await?;
    println!("{} [{}]: ok", action.kind, action.index);
    Ok(())
}

async fn run_watch(config: &Config, options: CaptureOptions) -> CliResult<()> {
    let (_client, document) = open_page(config, None).await?;
    let controller = Arc::new(CaptureController::new(
        document.clone(),
        capture_settings(config),
    ));

    let (events_tx, events_rx) = mpsc::channel(256);
    let mutations = forward_mutations(document.observe_mutations(), events_tx.clone());
    let page_events = document.forward_page_events(events_tx).await?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping");
            }
            cancel.cancel();
        }
    });

    let printer = tokio::spawn({
        let mut snapshots = controller.subscribe();
        let include = config.serialize.include_attributes.clone();
        let cancel = cancel.clone();
        async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = snapshots.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = snapshots.borrow_and_update().clone();
                        if let Some(snapshot) = snapshot {
                            println!("# {} ({})", snapshot.title(), snapshot.url());
                            println!("{}\n", serialize(&snapshot, &include));
                        }
                    }
                }
            }
        }
    });

    let captures = controller.run(events_rx, cancel, options).await;
    info!(captures, "Watch stopped");

    mutations.abort();
    page_events.abort();
    let _ = printer.await;
    if let Err(err) = controller.clear_highlights().await {
        warn!(error = %err, "Cannot clear overlay");
    }
    Ok(())
}

