mod config;
mod telemetry;

use clap::{Parser, Subcommand};
use config::{Config, ConfigError};
use relay::config::Credentials;
use relay::errors::RelayError;
use relay::settings::SettingRecord;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use telemetry::TelemetryError;

#[derive(Parser)]
#[command(name = "themesync", version, about = "Relays theme setting changes to a spreadsheet")]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, short, default_value = "themesync.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve the webhook and admin listeners
    Serve,
    /// Print the setting records of a local theme file as JSON
    Extract {
        file: PathBuf,
        /// Path of the file inside the theme, e.g. `config/settings_data.json`.
        /// Defaults to FILE.
        #[arg(long)]
        theme_path: Option<String>,
    },
    /// Sync files of a configured branch without waiting for a push
    Sync {
        branch: String,
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Write one setting back to the theme of a configured branch
    Update {
        branch: String,
        #[arg(long)]
        file: String,
        #[arg(long)]
        section: String,
        /// Block holding the setting; omit for section settings
        #[arg(long, default_value = "")]
        block: String,
        #[arg(long)]
        setting: String,
        /// New value as JSON. Input that is not valid JSON is taken as a string.
        #[arg(long)]
        value: String,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not serialize output: {0}")]
    Json(#[from] serde_json::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Exiting");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        CliCommand::Extract { file, theme_path } => {
            telemetry::init_logging(None)?;
            extract(&file, theme_path.as_deref())
        }
        CliCommand::Serve => {
            let config = Config::from_file(&cli.config)?;
            let _guard = init_telemetry(&config)?;
            let credentials = Credentials::from_env(&config.relay).map_err(RelayError::from)?;

            tracing::info!(config = %cli.config.display(), "Starting themesync");
            runtime()?.block_on(relay::run(config.relay, credentials))?;
            Ok(())
        }
        CliCommand::Sync { branch, files } => {
            let config = Config::from_file(&cli.config)?;
            let _guard = init_telemetry(&config)?;
            runtime()?.block_on(sync(config, &branch, files))
        }
        CliCommand::Update {
            branch,
            file,
            section,
            block,
            setting,
            value,
        } => {
            let config = Config::from_file(&cli.config)?;
            let _guard = init_telemetry(&config)?;
            let record = SettingRecord {
                file,
                section,
                block,
                setting,
                value: parse_value(&value),
            };
            runtime()?.block_on(update(config, &branch, &record))
        }
    }
}

fn init_telemetry(config: &Config) -> Result<Option<sentry::ClientInitGuard>, CliError> {
    let guard = telemetry::init_logging(config.common.logging.as_ref())?;
    if let Some(metrics) = &config.common.metrics {
        telemetry::init_metrics(metrics)?;
    }
    Ok(guard)
}

fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

fn extract(file: &std::path::Path, theme_path: Option<&str>) -> Result<(), CliError> {
    let content = std::fs::read_to_string(file)?;
    let path = theme_path
        .map(str::to_string)
        .unwrap_or_else(|| file.to_string_lossy().into_owned());

    let records = relay::settings::extract(&content, &path);
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

async fn sync(config: Config, branch: &str, files: Vec<String>) -> Result<(), CliError> {
    let target = config
        .relay
        .branches
        .get(branch)
        .ok_or_else(|| RelayError::UnknownBranch(branch.to_string()))?;

    let credentials = Credentials::from_env(&config.relay).map_err(RelayError::from)?;
    let syncer = relay::build_syncer(&config.relay, Arc::new(credentials))?;

    let theme_files = relay::push::filter_theme_files(files);
    if theme_files.is_empty() {
        tracing::warn!(branch, "None of the given files belong to the theme");
        return Ok(());
    }

    let report = syncer
        .sync(branch, target, &theme_files)
        .await
        .map_err(RelayError::from)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

async fn update(config: Config, branch: &str, record: &SettingRecord) -> Result<(), CliError> {
    let target = config
        .relay
        .branches
        .get(branch)
        .ok_or_else(|| RelayError::UnknownBranch(branch.to_string()))?;

    let credentials = Credentials::from_env(&config.relay).map_err(RelayError::from)?;
    let updater = relay::build_updater(&config.relay, Arc::new(credentials))?;

    let report = updater
        .update(target, record)
        .await
        .map_err(RelayError::from)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
