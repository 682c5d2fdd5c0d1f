//! Deploybot - Entry Point
//!
//! Conversational deployment orchestrator: owners submit chat bots through a
//! chat conversation and deploybot provisions and tracks them.

use std::collections::HashMap;
use std::env;

use anyhow::Context;
use colored::Colorize;
use tracing::{error, info};

use deploybot::app::options::AppOptions;
use deploybot::app::run::run;
use deploybot::logs::{init_logging, LogLevel, LogOptions};
use deploybot::storage::layout::{StorageLayout, DEFAULT_BASE_DIR};
use deploybot::storage::settings::load_settings;
use deploybot::utils::version_info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        println!("{}", serde_json::to_string_pretty(&version)?);
        return Ok(());
    }

    let base_dir = cli_args
        .get("base-dir")
        .map(String::as_str)
        .unwrap_or(DEFAULT_BASE_DIR);
    let layout = StorageLayout::new(base_dir);
    layout
        .setup()
        .await
        .with_context(|| format!("cannot prepare storage under {}", base_dir))?;

    // Retrieve the settings file
    let mut settings = load_settings(&layout.settings_file())
        .await
        .context("unable to read settings")?;
    if let Some(level) = cli_args.get("log-level") {
        settings.log_level = level.parse::<LogLevel>().map_err(anyhow::Error::msg)?;
    }

    // Missing secrets are fatal before anything starts
    if let Err(e) = settings.require_secrets() {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level,
        log_dir: settings.log_to_file.then(|| layout.logs_dir()),
        json_format: settings.log_json,
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    println!(
        "{} {} ({})",
        "deploybot".green().bold(),
        version.version.bold(),
        version.git_hash.dimmed()
    );
    println!(
        "  listening on {}:{}, provider {:?}",
        settings.server.host, settings.server.port, settings.provider.mode
    );

    // Run the server
    let options = AppOptions::from_settings(settings, layout);
    info!("Running deploybot with options: {:?}", options);
    if let Err(e) = run(options, await_shutdown_signal()).await {
        error!("Failed to run deploybot: {e}");
        return Err(e.into());
    }
    Ok(())
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            _ => {
                error!("Unable to install signal handlers, falling back to Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
