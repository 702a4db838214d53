//! xlio-import - import one spreadsheet end to end
//!
//! Selects the file, validates it, applies `--exclude` options, runs the
//! import and prints the final status. Exits non-zero when the file is
//! invalid or the import fails.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

use xlio_import::models::SelectedFile;
use xlio_import::{ConfigOverrides, ImportConfig, ImportEvent, ImportOrchestrator};

/// Command-line arguments for xlio-import
#[derive(Parser, Debug)]
#[command(name = "xlio-import")]
#[command(about = "Bulk spreadsheet importer")]
#[command(version)]
struct Args {
    /// Spreadsheet to import (.xls / .xlsx)
    file: PathBuf,

    /// Sheet to leave out of the import (repeatable)
    #[arg(short, long = "exclude", value_name = "SHEET")]
    exclude: Vec<String>,

    /// REST API base URL
    #[arg(long, env = "XLIO_API_URL")]
    api_url: Option<String>,

    /// Notification channel address
    #[arg(long, env = "XLIO_NOTIFY_URL")]
    notify_url: Option<String>,

    /// Config file path
    #[arg(short, long, env = "XLIO_CONFIG")]
    config: Option<PathBuf>,

    /// Write the resolved settings back to the config file
    #[arg(long)]
    save_config: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise the level from the config file applies once loaded
    let env_filter = EnvFilter::try_from_default_env().ok();
    let filter_from_env = env_filter.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| EnvFilter::new("info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting xlio-import v{}", env!("CARGO_PKG_VERSION"));

    let toml_config = xlio_common::config::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    if !filter_from_env {
        if let Err(e) = filter_handle.reload(EnvFilter::new(&toml_config.logging.level)) {
            warn!("Could not apply log level '{}': {}", toml_config.logging.level, e);
        }
    }

    let overrides = ConfigOverrides {
        api_base_url: args.api_url.clone(),
        notify_url: args.notify_url.clone(),
    };
    let config = ImportConfig::resolve(&overrides, &toml_config)
        .context("Invalid import configuration")?;
    info!(api = %config.api_base_url, notify = %config.notify_url, "Configuration resolved");

    if args.save_config {
        let path = xlio_common::config::resolve_config_path(args.config.as_deref())
            .or_else(xlio_common::config::default_config_path);
        match path {
            Some(path) => {
                if let Err(e) = config.save(&toml_config, &path) {
                    warn!("Settings not saved to {}: {}", path.display(), e);
                }
            }
            None => warn!("No config location available; settings not saved"),
        }
    }

    let orchestrator = ImportOrchestrator::from_config(config)
        .context("Failed to initialize importer")?;

    let mut events = orchestrator.subscribe_events();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ImportEvent::Progress { percent, message, .. } => {
                    println!("[{:>3}%] {}", percent, message)
                }
                ImportEvent::SheetFinished {
                    sheet_name,
                    failure: Some(reason),
                    ..
                } => println!("Sheet '{}' failed: {}", sheet_name, reason),
                ImportEvent::StateChanged { new_state, .. } => println!("State: {:?}", new_state),
                _ => {}
            }
        }
    });

    let file = SelectedFile::from_path(&args.file)
        .await
        .with_context(|| format!("Cannot read {}", args.file.display()))?;

    let exit_code = match orchestrator.select_file(file).await {
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
        Ok(snapshot) => {
            println!(
                "Sheets: {}",
                snapshot.sheet_names.join(", ")
            );

            let mut excluded_ok = true;
            for sheet in &args.exclude {
                if let Err(e) = orchestrator.toggle_exclusion(sheet).await {
                    eprintln!("Cannot exclude '{}': {}", sheet, e);
                    excluded_ok = false;
                }
            }

            if !excluded_ok {
                ExitCode::FAILURE
            } else {
                let result = orchestrator.start_import().await;
                let snapshot = orchestrator.snapshot().await;
                println!("{}", snapshot.status_message);
                match result {
                    Ok(_) => ExitCode::SUCCESS,
                    Err(e) => {
                        warn!(error = %e, "Import did not complete");
                        ExitCode::FAILURE
                    }
                }
            }
        }
    };

    orchestrator.shutdown().await;
    drop(orchestrator);
    let _ = printer.await;

    Ok(exit_code)
}
