//! # Kiosk Commands
//!
//! Command-line parsing and dispatch to the [`Kiosk`] facade.
//!
//! ## Command Organization
//! ```text
//! totem-kiosk [OPTIONS] <COMMAND>
//!
//!   deposit <ACCOUNT>        start a deposit and follow it to the end
//!   redeem <ACCOUNT>         spend credits and unlock the drawer
//!   balance <ACCOUNT>        current credit balance
//!   history <ACCOUNT>        ledger entries, most recent first
//!   status <TRANSACTION>     state of one deposit
//!   drawer                   idle / busy
//!   recover                  report what the startup sweep repaired
//! ```
//!
//! Hardware is simulated; the `--weight`, `--close-after-ms`, `--never-close`
//! and `--jam-unlock` options script it.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use totem_core::{
    DepositTransaction, DrawerStatus, LedgerEntry, RedemptionRequest, TransactionStatus,
};
use totem_engine::{HwError, Kiosk, SimulatedHardware};

use crate::error::ApiError;

pub const USAGE: &str = "\
Totem Kiosk

Usage: totem-kiosk [OPTIONS] <COMMAND>

Commands:
  deposit <ACCOUNT>          Start a deposit and wait for its outcome
  redeem <ACCOUNT>           Redeem credits for a bottle of new oil
  balance <ACCOUNT>          Show the credit balance
  history <ACCOUNT>          Show ledger entries, most recent first
  status <TRANSACTION_ID>    Show the state of a deposit
  drawer                     Show whether the drawer is idle
  recover                    Show the deposit repaired at startup, if any

Options:
  -c, --config <PATH>        Config file (default: platform config dir)
  -d, --db <PATH>            Database file (overrides config)
  -w, --weight <KG>          Simulated scale reading (default: 3.4)
      --close-after-ms <MS>  Simulated time to close the drawer (default: 500)
      --never-close          Simulated drawer never reports closed
      --jam-unlock           Simulated unlock actuator fails
  -l, --limit <N>            History page size (default: 50)
  -r, --request-id <ID>      Redemption request id, for safe retries
  -h, --help                 Show this help message";

/// One kiosk operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Deposit { account_id: String },
    Redeem { account_id: String, request_id: Option<String> },
    Balance { account_id: String },
    History { account_id: String, limit: Option<u32> },
    Status { transaction_id: String },
    Drawer,
    Recover,
    Help,
}

/// How the simulated hardware should behave.
#[derive(Debug, Clone, PartialEq)]
pub struct HardwareScript {
    pub weight_kg: f64,
    pub close_after: Duration,
    pub never_close: bool,
    pub jam_unlock: bool,
}

impl Default for HardwareScript {
    fn default() -> Self {
        HardwareScript {
            weight_kg: 3.4,
            close_after: Duration::from_millis(500),
            never_close: false,
            jam_unlock: false,
        }
    }
}

impl HardwareScript {
    pub fn build(&self) -> SimulatedHardware {
        let hw = SimulatedHardware::new().with_default_weight(self.weight_kg);
        let hw = if self.never_close {
            hw.never_closes()
        } else {
            hw.closes_after(self.close_after)
        };
        if self.jam_unlock {
            hw.fail_unlock(HwError::Unavailable("unlock actuator jammed".into()));
        }
        hw
    }
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub command: Command,
    pub config_path: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub hardware: HardwareScript,
}

impl Invocation {
    /// Parses arguments, excluding the program name.
    pub fn parse(args: &[String]) -> Result<Self, ApiError> {
        let mut config_path = None;
        let mut db_path = None;
        let mut hardware = HardwareScript::default();
        let mut limit = None;
        let mut request_id = None;
        let mut positional: Vec<&str> = Vec::new();

        let mut i = 0;
        while i < args.len() {
            let arg = args[i].as_str();
            match arg {
                "--config" | "-c" => config_path = Some(PathBuf::from(value(args, &mut i, arg)?)),
                "--db" | "-d" => db_path = Some(PathBuf::from(value(args, &mut i, arg)?)),
                "--weight" | "-w" => {
                    let raw = value(args, &mut i, arg)?;
                    hardware.weight_kg = raw
                        .parse()
                        .map_err(|_| ApiError::usage(format!("invalid weight: {}", raw)))?;
                }
                "--close-after-ms" => {
                    let raw = value(args, &mut i, arg)?;
                    let ms: u64 = raw
                        .parse()
                        .map_err(|_| ApiError::usage(format!("invalid delay: {}", raw)))?;
                    hardware.close_after = Duration::from_millis(ms);
                }
                "--never-close" => hardware.never_close = true,
                "--jam-unlock" => hardware.jam_unlock = true,
                "--limit" | "-l" => {
                    let raw = value(args, &mut i, arg)?;
                    limit = Some(
                        raw.parse()
                            .map_err(|_| ApiError::usage(format!("invalid limit: {}", raw)))?,
                    );
                }
                "--request-id" | "-r" => request_id = Some(value(args, &mut i, arg)?.to_string()),
                "--help" | "-h" => positional.insert(0, "help"),
                other if other.starts_with('-') => {
                    return Err(ApiError::usage(format!("unknown option: {}", other)))
                }
                other => positional.push(other),
            }
            i += 1;
        }

        let target = |name: &str| -> Result<String, ApiError> {
            positional
                .get(1)
                .map(|s| s.to_string())
                .ok_or_else(|| ApiError::usage(format!("missing {}", name)))
        };

        let command = match positional.first().copied() {
            None | Some("help") => Command::Help,
            Some("deposit") => Command::Deposit {
                account_id: target("account")?,
            },
            Some("redeem") => Command::Redeem {
                account_id: target("account")?,
                request_id,
            },
            Some("balance") => Command::Balance {
                account_id: target("account")?,
            },
            Some("history") => Command::History {
                account_id: target("account")?,
                limit,
            },
            Some("status") => Command::Status {
                transaction_id: target("transaction id")?,
            },
            Some("drawer") => Command::Drawer,
            Some("recover") => Command::Recover,
            Some(other) => return Err(ApiError::usage(format!("unknown command: {}", other))),
        };

        Ok(Invocation {
            command,
            config_path,
            db_path,
            hardware,
        })
    }
}

fn value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, ApiError> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| ApiError::usage(format!("{} needs a value", flag)))
}

// =============================================================================
// Dispatch
// =============================================================================

/// What a command prints on success.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Output {
    Transaction(TransactionStatus),
    Redemption(RedemptionRequest),
    #[serde(rename_all = "camelCase")]
    Balance { account_id: String, balance: i64 },
    History(Vec<LedgerEntry>),
    Drawer(DrawerStatus),
    Recovered { recovered: Option<TransactionStatus> },
    Help(&'static str),
}

/// Runs one command. `recovered` is the result of the startup sweep.
pub async fn execute(
    kiosk: &Kiosk,
    command: Command,
    recovered: Option<DepositTransaction>,
    deposit_wait: Duration,
) -> Result<Output, ApiError> {
    let output = match command {
        Command::Deposit { account_id } => {
            let id = kiosk.start_deposit(&account_id).await?;
            Output::Transaction(kiosk.await_transaction(&id, deposit_wait).await?)
        }
        Command::Redeem {
            account_id,
            request_id,
        } => {
            let request = match request_id {
                Some(id) => kiosk.redeem_with_id(&account_id, &id).await?,
                None => kiosk.redeem(&account_id).await?,
            };
            Output::Redemption(request)
        }
        Command::Balance { account_id } => {
            let balance = kiosk.get_balance(&account_id).await?;
            Output::Balance {
                account_id,
                balance,
            }
        }
        Command::History { account_id, limit } => {
            Output::History(kiosk.get_history(&account_id, limit).await?)
        }
        Command::Status { transaction_id } => {
            Output::Transaction(kiosk.get_transaction_status(&transaction_id).await?)
        }
        Command::Drawer => Output::Drawer(kiosk.drawer_status().await?),
        Command::Recover => Output::Recovered {
            recovered: recovered.map(|tx| tx.status()),
        },
        Command::Help => Output::Help(USAGE),
    };

    Ok(output)
}
