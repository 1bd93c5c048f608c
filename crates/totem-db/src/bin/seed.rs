//! # Seed Data Generator
//!
//! Grants demo credits to an account for local testing of redemptions.
//!
//! ## Usage
//! ```bash
//! # Give 5 credits to the default demo account
//! cargo run -p totem-db --bin seed
//!
//! # Custom account, amount and database
//! cargo run -p totem-db --bin seed -- --account acc-42 --credits 3 --db ./data/totem.db
//! ```
//!
//! Each run appends one earn entry tagged `seed-<uuid>`, so running it twice
//! grants the credits twice.

use std::env;
use totem_core::validation::{validate_account_id, validate_credit_amount};
use totem_core::LedgerEntry;
use totem_db::{Database, DbConfig};
use uuid::Uuid;

const DEFAULT_ACCOUNT: &str = "demo-account";
const DEFAULT_CREDITS: i64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut account = String::from(DEFAULT_ACCOUNT);
    let mut credits: i64 = DEFAULT_CREDITS;
    let mut db_path = String::from("./totem_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--account" | "-a" => {
                if i + 1 < args.len() {
                    account = args[i + 1].clone();
                    i += 1;
                }
            }
            "--credits" | "-c" => {
                if i + 1 < args.len() {
                    credits = args[i + 1].parse().unwrap_or(DEFAULT_CREDITS);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Totem Seed Credits");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -a, --account <ID>   Account to credit (default: {})", DEFAULT_ACCOUNT);
                println!("  -c, --credits <N>    Credits to grant (default: {})", DEFAULT_CREDITS);
                println!("  -d, --db <PATH>      Database file path (default: ./totem_dev.db)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    validate_account_id(&account)?;
    validate_credit_amount(credits)?;

    println!("🌱 Totem Seed Credits");
    println!("=====================");
    println!("Database: {}", db_path);
    println!("Account:  {}", account);
    println!("Credits:  {}", credits);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let transaction_id = format!("seed-{}", Uuid::new_v4());
    let entry = LedgerEntry::earn(&account, credits, &transaction_id, "Demo credits")?;
    db.ledger().earn(&entry).await?;

    let balance = db.ledger().balance(&account).await?;
    println!("✓ Granted {} credit(s), balance is now {}", credits, balance);

    db.close().await;
    Ok(())
}
