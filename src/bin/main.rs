// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use loyalty_ledger::supervisor::Service;
use loyalty_ledger::{AppConfig, Coordinator, Customer, CustomerId, HistoryEntry, LedgerError, telemetry};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Loyalty Ledger - points, single-use redemption codes and history
///
/// Serves the ledger over HTTP until interrupted, then drains in-flight
/// requests and optionally writes the customers and history tables as CSV.
#[derive(Parser, Debug)]
#[command(name = "loyalty-ledger")]
#[command(about = "Loyalty points ledger with single-use redemption codes", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding `server.bind`
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<String>,

    /// CSV of customers to load at startup
    ///
    /// Expected format: customer_id,display_name,balance
    #[arg(long, value_name = "FILE")]
    seed: Option<PathBuf>,

    /// Directory receiving customers.csv and history.csv on shutdown
    #[arg(long, value_name = "DIR")]
    snapshot_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match AppConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = telemetry::init(&config.log) {
        eprintln!("Error initializing logging: {}", e);
        process::exit(1);
    }

    if let Err(e) = run(args, config).await {
        error!(reason = %e, "loyalty ledger stopped with an error");
        process::exit(1);
    }
}

async fn run(args: Args, config: AppConfig) -> Result<(), BoxError> {
    let coordinator = Arc::new(config.build_coordinator()?);

    if let Some(path) = &args.seed {
        let file = File::open(path)
            .map_err(|e| format!("cannot open seed file '{}': {}", path.display(), e))?;
        let loaded = load_customers(&coordinator, BufReader::new(file))?;
        info!(customers = loaded, path = %path.display(), "seed loaded");
    }

    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = TcpListener::bind(&bind).await?;
    let service = Service::start(Arc::clone(&coordinator), listener, config.sweep_interval())?;

    shutdown_signal().await;
    service.shutdown().await?;

    if let Some(dir) = &args.snapshot_dir {
        write_snapshot(&coordinator, dir)?;
        info!(dir = %dir.display(), "snapshot written");
    }
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(reason = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(reason = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Raw CSV record of the seed file.
///
/// Fields: `customer_id, display_name, balance`
#[derive(Debug, Deserialize)]
struct SeedRecord {
    customer_id: String,
    display_name: String,
    balance: Option<Decimal>,
}

/// Registers every customer of a seed CSV.
///
/// Malformed rows, negative balances and already registered identities are
/// skipped with a warning. An empty balance means zero.
///
/// # CSV Format
///
/// ```csv
/// customer_id,display_name,balance
/// 5512093,Alice,12
/// 5512094,Bob,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the header is invalid. A ledger
/// timeout aborts the import.
fn load_customers<R: Read>(coordinator: &Coordinator, reader: R) -> Result<usize, BoxError> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    let mut loaded = 0;
    for result in rdr.deserialize::<SeedRecord>() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(reason = %e, "skipping malformed seed row");
                continue;
            }
        };

        let customer_id = CustomerId(record.customer_id);
        let balance = record.balance.unwrap_or(Decimal::ZERO);
        match coordinator.import_customer(&customer_id, &record.display_name, balance) {
            Ok(_) => loaded += 1,
            Err(LedgerError::Timeout) => return Err(Box::new(LedgerError::Timeout)),
            Err(e) => warn!(customer = %customer_id, reason = %e, "skipping seed row"),
        }
    }

    Ok(loaded)
}

/// Writes customers in CSV format.
///
/// Columns: `id, display_name, balance, opening_balance, created_at`
fn write_customers<W: Write>(customers: &[Customer], writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for customer in customers {
        wtr.serialize(customer)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes history entries in CSV format.
///
/// Columns: `id, customer_id, delta, kind, balance_after, timestamp`
fn write_history<W: Write>(entries: &[HistoryEntry], writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for entry in entries {
        wtr.serialize(entry)?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_snapshot(coordinator: &Coordinator, dir: &Path) -> Result<(), BoxError> {
    fs::create_dir_all(dir)?;
    write_customers(&coordinator.customers()?, File::create(dir.join("customers.csv"))?)?;
    write_history(&coordinator.all_history()?, File::create(dir.join("history.csv"))?)?;
    Ok(())
}
