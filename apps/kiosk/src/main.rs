//! # Totem Kiosk Entry Point
//!
//! Command-line shell around the transaction engine, with simulated drawer
//! hardware. Results go to stdout as JSON; failures go to stderr as an
//! [`ApiError`](error::ApiError) JSON document with a non-zero exit code.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Initialize tracing (RUST_LOG, default info,totem=debug,sqlx=warn)   │
//! │  2. Parse the command line                                              │
//! │  3. Load totem.toml + TOTEM_* overrides                                 │
//! │  4. Open the database & run migrations                                  │
//! │  5. Wire simulated hardware into a Kiosk                                │
//! │  6. Recover any deposit interrupted by a previous run                   │
//! │  7. Run the command, print the result                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod commands;
mod error;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use commands::{Command, Invocation, USAGE};
use error::ApiError;
use totem_db::{Database, DbConfig};
use totem_engine::{EngineConfig, Kiosk};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = match Invocation::parse(&args) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("{}", e.to_json());
            eprintln!();
            eprintln!("{}", USAGE);
            return Ok(ExitCode::from(2));
        }
    };

    if invocation.command == Command::Help {
        println!("{}", USAGE);
        return Ok(ExitCode::SUCCESS);
    }

    let mut config =
        EngineConfig::load(invocation.config_path.clone()).context("Failed to load configuration")?;
    if let Some(path) = &invocation.db_path {
        config.database.path = Some(path.clone());
    }

    let db_path = config.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    info!(kiosk_id = %config.kiosk.id, db_path = %db_path.display(), "Starting Totem kiosk");

    let db = Database::new(DbConfig::new(&db_path))
        .await
        .context("Failed to open database")?;

    let hardware = Arc::new(invocation.hardware.build());
    let kiosk = Kiosk::new(db.clone(), hardware, &config).context("Failed to build kiosk")?;

    let recovered = kiosk.recover().await.context("Startup recovery failed")?;

    // Close timeout plus headroom for weighing and committing
    let deposit_wait = config.drawer_timeouts().close_timeout + Duration::from_secs(30);

    let outcome = commands::execute(&kiosk, invocation.command, recovered, deposit_wait).await;
    let code = match outcome {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            ExitCode::SUCCESS
        }
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    };

    db.close().await;
    Ok(code)
}

fn report(err: &ApiError) {
    tracing::warn!(code = %err.code, "Command failed: {}", err.message);
    eprintln!("{}", err.to_json());
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=totem_engine=trace` - Trace one crate
/// - Default: `info,totem=debug,sqlx=warn`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,totem=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
