//! PowStore operator CLI.
//!
//! Commits files for a timed reveal, reveals them, and lets anyone check a
//! file against a revealed commitment.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use clap::{Args, Parser, Subcommand};
use config::{Config, Environment, File as ConfigFile};
use powstore_service::{IdentityToken, PowStoreConfig, RevealService, ServiceError};
use powstore_time::TimestampMicros;
use powstore_types::CommitmentId;
use serde_json::json;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_CONFIG_PATH: &str = "config/powstore.toml";

#[derive(Parser)]
#[command(name = "powstore")]
#[command(about = "Commit now, reveal later: timestamped content commitments", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path (defaults to config/powstore.toml when present)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the log level
    #[arg(long, global = true, value_name = "LEVEL", value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    /// Select log output format
    #[arg(long, global = true, value_name = "FORMAT", value_parser = ["pretty", "json"])]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct IdentityArgs {
    /// Identity provider that authenticated the caller
    #[arg(long)]
    provider: String,
    /// Subject identifier issued by the provider
    #[arg(long)]
    subject: String,
}

impl IdentityArgs {
    fn token(&self) -> IdentityToken {
        IdentityToken::new(&self.provider, &self.subject)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Commit to a file and schedule its reveal
    Commit {
        #[arg(long)]
        file: PathBuf,
        /// RFC 3339 timestamp or YYYY-MM-DD (midnight UTC)
        #[arg(long)]
        reveal_at: String,
        #[command(flatten)]
        identity: IdentityArgs,
    },
    /// Reveal one of your commitments
    Reveal {
        #[arg(long)]
        id: CommitmentId,
        #[command(flatten)]
        identity: IdentityArgs,
        /// Write the revealed content here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Check a file against a revealed commitment
    Verify {
        #[arg(long)]
        id: CommitmentId,
        #[arg(long)]
        file: PathBuf,
    },
    /// Show the public view of a commitment
    Show {
        #[arg(long)]
        id: CommitmentId,
    },
    /// List commitments owned by an identity
    List {
        #[command(flatten)]
        identity: IdentityArgs,
    },
    /// Print the public commitment log
    Log,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        match err.downcast_ref::<ServiceError>() {
            Some(service_err) => eprintln!("error[{}]: {service_err}", service_err.code()),
            None => eprintln!("error: {err:#}"),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }
    init_logging(&config)?;
    debug!(?config, "configuration loaded");

    let service = config.build_service()?;
    match cli.command {
        Commands::Commit {
            file,
            reveal_at,
            identity,
        } => handle_commit(&service, &file, &reveal_at, &identity).await,
        Commands::Reveal { id, identity, out } => {
            handle_reveal(&service, &id, &identity, out.as_deref()).await
        }
        Commands::Verify { id, file } => handle_verify(&service, &id, &file),
        Commands::Show { id } => print_json(&service.commitment(&id)?),
        Commands::List { identity } => print_json(&service.commitments_of(&identity.token())?),
        Commands::Log => print_json(&service.public_log()?),
    }
}

async fn handle_commit(
    service: &RevealService,
    file: &Path,
    reveal_at: &str,
    identity: &IdentityArgs,
) -> Result<()> {
    let reveal_at = parse_reveal_at(reveal_at)?;
    let content =
        fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let receipt = service
        .create_commitment(&identity.token(), &content, reveal_at)
        .await?;
    info!(commitment = %receipt.id, file = %file.display(), "file committed");
    print_json(&json!({
        "id": receipt.id,
        "digest": receipt.digest,
        "sealed_locator": receipt.sealed_locator,
        "created_at": format_timestamp(receipt.created_at),
        "reveal_at": format_timestamp(receipt.reveal_at),
    }))
}

async fn handle_reveal(
    service: &RevealService,
    id: &CommitmentId,
    identity: &IdentityArgs,
    out: Option<&Path>,
) -> Result<()> {
    let revealed = service.attempt_reveal(&identity.token(), id).await?;
    match out {
        Some(path) => {
            fs::write(path, revealed.content.as_slice())
                .with_context(|| format!("failed to write {}", path.display()))?;
            print_json(&json!({
                "id": revealed.id,
                "digest": revealed.digest,
                "salt": revealed.salt,
                "revealed_at": format_timestamp(revealed.revealed_at),
                "bytes": revealed.content.len(),
                "written_to": path.display().to_string(),
            }))
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(revealed.content.as_slice())?;
            stdout.flush()?;
            Ok(())
        }
    }
}

fn handle_verify(service: &RevealService, id: &CommitmentId, file: &Path) -> Result<()> {
    let content =
        fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let matches = service.public_verify(id, &content)?;
    print_json(&json!({ "id": id, "matches": matches }))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(path_override: Option<&Path>) -> Result<PowStoreConfig> {
    let resolved_path = match path_override {
        Some(path) => {
            if !path.exists() {
                bail!(
                    "Configuration file {} not found (specified via --config)",
                    path.display()
                );
            }
            Some(path.to_path_buf())
        }
        None => Some(PathBuf::from(DEFAULT_CONFIG_PATH)).filter(|p| p.exists()),
    };

    let mut builder = Config::builder();
    if let Some(path) = &resolved_path {
        builder = builder.add_source(ConfigFile::from(path.as_path()));
    }
    builder = builder.add_source(
        Environment::with_prefix("POWSTORE")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config: PowStoreConfig = builder
        .build()?
        .try_deserialize()
        .context("invalid PowStore configuration")?;
    config.validate()?;
    Ok(config)
}

fn init_logging(config: &PowStoreConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }

    Ok(())
}

/// Accepts RFC 3339 or a bare `YYYY-MM-DD` date, read as midnight UTC.
fn parse_reveal_at(raw: &str) -> Result<TimestampMicros> {
    let raw = raw.trim();
    let instant = match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(_) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| anyhow!("'{raw}' is neither RFC 3339 nor YYYY-MM-DD"))?
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow!("'{raw}' has no midnight"))?
            .and_utc(),
    };
    let micros = u64::try_from(instant.timestamp_micros())
        .map_err(|_| anyhow!("reveal time {raw} is before the Unix epoch"))?;
    Ok(TimestampMicros(micros))
}

fn format_timestamp(ts: TimestampMicros) -> String {
    i64::try_from(ts.as_micros())
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_micros)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| ts.to_string())
}
