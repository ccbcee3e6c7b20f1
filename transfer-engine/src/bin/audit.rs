//! Integrity audit runner
//!
//! Intended for cron: prints the JSON report, writes a dated copy next
//! to the data directory and exits 0 only when every check passed.

use anyhow::{Context, Result};
use chrono::Utc;
use ledger_core::Ledger;
use std::sync::Arc;
use transfer_engine::{Config, IntegrityAuditor};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => Config::from_env(),
    };

    tracing::info!(data_dir = ?config.ledger.data_dir, "Running integrity audit");

    let ledger = Arc::new(Ledger::open(config.ledger.clone()).context("Failed to open ledger")?);
    let auditor = IntegrityAuditor::new(ledger, config.limits.clone(), config.audit.clone());

    let report = auditor.run().context("Audit run failed")?;
    let json = serde_json::to_string_pretty(&report)?;
    println!("{}", json);

    let report_path = config
        .ledger
        .data_dir
        .join(format!("integrity_report_{}.json", Utc::now().format("%Y%m%d")));
    std::fs::write(&report_path, &json)
        .with_context(|| format!("Failed to write report to {:?}", report_path))?;
    tracing::info!(report = ?report_path, all_passed = report.all_passed, "Audit complete");

    std::process::exit(if report.all_passed { 0 } else { 1 });
}
