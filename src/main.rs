use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use medchain::{open_store, LedgerService, MedchainConfig, MedicineInput};

#[derive(Debug, Parser)]
#[command(name = "medchain", version, about = "Pharmaceutical batch ledger")]
struct Cli {
    /// TOML config file (default: ./medchain.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Warnings and errors only
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register a medicine batch
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        batch: String,
        /// Expiry date, YYYY-MM-DD
        #[arg(long)]
        expiry: String,
    },
    /// List every ledger entry
    Ledger,
    /// Record that a batch reached a location
    Update {
        #[arg(long)]
        batch: String,
        #[arg(long)]
        location: String,
    },
    /// Forecast next-step stock from daily counts (at least 3)
    Predict {
        #[arg(required = true, allow_negative_numbers = true)]
        history: Vec<i64>,
    },
    /// Recompute every entry's integrity hash
    Verify,
}

fn main() {
    if let Err(error) = run() {
        eprintln!("medchain error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MedchainConfig::load_from(path),
        None => MedchainConfig::load(),
    }
    .context("Failed to load configuration")?;

    init_tracing(&config, cli.verbose, cli.quiet)?;

    let store = open_store(&config.store)
        .with_context(|| format!("Failed to open ledger store at {:?}", config.store.path))?;
    let service = LedgerService::with_system_clock(store)
        .with_max_update_attempts(config.tracking.max_update_attempts);

    match cli.command {
        Command::Register { name, batch, expiry } => {
            let entry = service.register_medicine(MedicineInput { name, batch, expiry })?;
            print_json(&entry)?;
        }
        Command::Ledger => {
            print_json(&service.list_ledger()?)?;
        }
        Command::Update { batch, location } => {
            print_json(&service.update_location(&batch, &location)?)?;
        }
        Command::Predict { history } => {
            print_json(&service.predict_stock(&history)?)?;
        }
        Command::Verify => {
            let reports = service.verify_ledger()?;
            print_json(&reports)?;
            let tampered = reports.iter().filter(|r| !r.valid).count();
            if tampered > 0 {
                anyhow::bail!("{tampered} ledger entries failed hash verification");
            }
        }
    }

    service.close().context("Failed to close ledger store")?;
    Ok(())
}

fn init_tracing(config: &MedchainConfig, verbose: bool, quiet: bool) -> Result<()> {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        config.logging.filter.as_str()
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("MEDCHAIN_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
