// src/main.rs
//
// Thin CLI around the two engine operations. The HTTP upload layer that used
// to wrap this pipeline is an external collaborator; this binary consumes the
// same sheets as CSV files and writes the result tables back out.

use anyhow::{Context, Result};
use chrono::NaiveTime;
use clap::{Parser, Subcommand};
use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

mod attendance;
mod overtime;
mod tables;

#[cfg(test)]
mod tables_tests;

use attendance::AttendanceRules;

#[derive(Parser)]
#[command(
    name = "attendance-core",
    about = "Normalizes raw swipe attendance exports and reconciles overtime applications"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the daily ledger and monthly summary from a raw swipe export.
    Report {
        /// Raw swipe export (CSV).
        #[arg(long)]
        input: PathBuf,
        /// Output path for the daily ledger sheet.
        #[arg(long)]
        daily: PathBuf,
        /// Output path for the monthly summary sheet.
        #[arg(long)]
        monthly: PathBuf,
        /// Lateness threshold as HH:MM (policy default 10:30).
        #[arg(long)]
        late_after: Option<String>,
    },
    /// Reconcile night-shift applications against a daily ledger sheet.
    Reconcile {
        /// Daily ledger sheet produced by `report`.
        #[arg(long)]
        ledger: PathBuf,
        /// Overtime application export (CSV).
        #[arg(long)]
        applications: PathBuf,
        /// Output path for the enriched application sheet.
        #[arg(long)]
        enriched: PathBuf,
        /// Output path for the narrowed result sheet.
        #[arg(long)]
        results: PathBuf,
    },
}

fn load_rules(late_after: Option<&str>) -> Result<AttendanceRules> {
    let mut rules = AttendanceRules::default();
    let threshold = late_after
        .map(str::to_string)
        .or_else(|| env::var("ATTENDANCE_LATE_AFTER").ok());
    if let Some(value) = threshold {
        rules.late_after = NaiveTime::parse_from_str(value.trim(), "%H:%M")
            .with_context(|| format!("Invalid lateness threshold {:?} (expected HH:MM)", value))?;
        info!("Lateness threshold overridden to {}", rules.late_after);
    }
    Ok(rules)
}

fn open(path: &Path) -> Result<File> {
    File::open(path).with_context(|| format!("Opening {}", path.display()))
}

fn create(path: &Path) -> Result<File> {
    File::create(path).with_context(|| format!("Creating {}", path.display()))
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Setting tracing subscriber failed")?;

    let cli = Cli::parse();
    match cli.command {
        Command::Report {
            input,
            daily,
            monthly,
            late_after,
        } => {
            let rules = load_rules(late_after.as_deref())?;
            let rows = tables::read_raw_rows(open(&input)?)?;
            info!("Read {} raw swipe rows from {}", rows.len(), input.display());

            let report = attendance::normalize_and_aggregate(rows, &rules);
            tables::write_table(create(&daily)?, &tables::LEDGER_COLUMNS, &report.daily)?;
            tables::write_table(create(&monthly)?, &tables::MONTHLY_COLUMNS, &report.monthly)?;
            info!(
                "Wrote {} daily rows to {} and {} monthly rows to {}",
                report.daily.len(),
                daily.display(),
                report.monthly.len(),
                monthly.display()
            );
        }
        Command::Reconcile {
            ledger,
            applications,
            enriched,
            results,
        } => {
            let rules = load_rules(None)?;
            let ledger_rows = tables::read_daily_ledger(open(&ledger)?)?;
            let application_rows = tables::read_applications(open(&applications)?)?;
            info!(
                "Read {} ledger rows and {} applications",
                ledger_rows.len(),
                application_rows.len()
            );

            let output = overtime::reconcile_overtime(&ledger_rows, &application_rows, &rules);
            for row_error in &output.row_errors {
                warn!("Application {}: {}", row_error.document_id, row_error.error);
            }
            tables::write_table(create(&enriched)?, &tables::ENRICHED_COLUMNS, &output.enriched)?;
            tables::write_table(create(&results)?, &tables::RESULT_COLUMNS, &output.results)?;
            info!(
                "Wrote {} enriched applications to {} and {} results to {}",
                output.enriched.len(),
                enriched.display(),
                output.results.len(),
                results.display()
            );
        }
    }
    Ok(())
}
