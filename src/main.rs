// Entry point and high-level CLI flow.
//
// - `consolidate` merges the per-machine sheets into the output sheet of
//   the source workbook and writes the validation log.
// - `report` merges the quantity and consumption workbooks into the
//   grouped machine report, the anomalies workbook and the monthly summary.
// - Without a command an interactive menu offers both.
mod aggregate;
mod anomalies;
mod config;
mod consolidator;
mod dates;
mod error;
mod normalizer;
mod output;
mod reports;
mod reshape;
mod types;
mod util;
mod validator;
mod workbook;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::{Config, ConsolidatorConfig, ReporterConfig};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use types::{Metric, RawTable, ReportSummary};
use validator::ErrorLog;

#[derive(Parser, Debug)]
#[command(version, about = "Consolidate machine energy sheets and build monthly reports")]
struct Cli {
    /// YAML configuration file.
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Merge the machine sheets into the consolidated sheet.
    Consolidate,
    /// Generate the grouped report, anomalies and monthly summary.
    Report,
    /// Run both stages.
    All,
}

fn setup_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .init();
}

/// Read a single line of input after printing the common "Enter choice:" prompt.
///
/// Returns `None` once stdin is closed.
fn read_choice() -> Option<String> {
    print!("Enter choice: ");
    let _ = io::stdout().flush();
    let mut buf = String::new();
    match io::stdin().read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

/// Ask the user whether to go back to the menu after generating reports.
fn prompt_back_to_menu() -> bool {
    loop {
        print!("Back to menu (Y/N): ");
        let _ = io::stdout().flush();
        let mut buf = String::new();
        if matches!(io::stdin().read_line(&mut buf), Ok(0) | Err(_)) {
            return false;
        }
        match buf.trim().to_uppercase().as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

/// Consolidate the machine sheets of the source workbook.
fn handle_consolidate(cfg: &ConsolidatorConfig) -> error::Result<()> {
    info!(path = %cfg.source_path.display(), "reading source workbook");
    let sheets = workbook::read_sheets(&cfg.source_path)?;
    let tables: Vec<RawTable> = sheets.iter().map(|s| RawTable::from_sheet(s, 0)).collect();

    let mut log = ErrorLog::default();
    let (table, report) = consolidator::consolidate(tables, cfg, &mut log);
    output::write_csv_with_header(
        &cfg.validation_log,
        &["sheet", "row", "column", "message"],
        log.errors(),
    )?;
    println!("Sheets processed: {:?}", report.processed);
    if !report.missing_identity.is_empty() {
        println!(
            "Warning: {} sheet(s) skipped without a '{}' column: {:?}",
            report.missing_identity.len(),
            types::Field::MachineId.column_name(),
            report.missing_identity
        );
    }
    if report.processed.is_empty() {
        println!("No machine sheets to process.\n");
        return Ok(());
    }
    if table.records.is_empty() {
        println!("No valid rows found in the machine sheets.\n");
        report_validation_errors(&log, cfg);
        return Ok(());
    }

    info!(sheet = %cfg.output_sheet, "writing consolidated sheet");
    let strategy = output::write_consolidated(
        &cfg.source_path,
        &cfg.output_sheet,
        &table.header(),
        &table.rows(),
    )?;
    if strategy == output::WriteStrategy::Plain {
        warn!("consolidated workbook written with plain values only");
    }
    println!(
        "Consolidated {} rows into sheet '{}' of {}\n",
        util::format_int(table.records.len()),
        cfg.output_sheet,
        cfg.source_path.display()
    );

    let summary = consolidator::machine_summary(&table.records);
    println!("Machine summary\n");
    output::preview_table_rows(&summary, 10);
    if let Some(path) = &cfg.machine_summary_path {
        output::write_csv(path, &summary)?;
        println!("(Full table exported to {})\n", path.display());
    }
    report_validation_errors(&log, cfg);
    Ok(())
}

fn report_validation_errors(log: &ErrorLog, cfg: &ConsolidatorConfig) {
    if !log.is_empty() {
        println!(
            "Note: {} rows skipped due to validation errors. See {}\n",
            util::format_int(log.len()),
            cfg.validation_log.display()
        );
    }
}

/// Build the grouped report, anomalies workbook and monthly summary.
fn handle_generate_reports(cfg: &ReporterConfig) -> error::Result<()> {
    workbook::ensure_exists(&cfg.quantity_path)?;
    workbook::ensure_exists(&cfg.consumption_path)?;

    info!(path = %cfg.quantity_path.display(), "reading quantities");
    let quantity = RawTable::from_sheet(
        &workbook::read_first_sheet(&cfg.quantity_path)?,
        cfg.quantity_header_row,
    );
    info!(path = %cfg.consumption_path.display(), "reading consumption");
    let consumption = RawTable::from_sheet(
        &workbook::read_first_sheet(&cfg.consumption_path)?,
        cfg.consumption_header_row,
    );

    let joined = reshape::outer_join(
        &reshape::melt(&quantity, Metric::Quantity),
        &reshape::melt(&consumption, Metric::Consumption),
    );
    let monthly = aggregate::aggregate_monthly(&joined);
    if monthly.is_empty() {
        warn!("no valid month labels found, the report will be empty");
    }

    let detection = anomalies::detect_anomalies(&monthly);
    match &detection.thresholds {
        None => println!("Efficiency could not be computed (no production > 0). Skipping anomaly analysis.\n"),
        Some(t) => {
            info!(high = t.high, low = t.low, mean = t.mean, "anomaly thresholds");
            if detection.anomalies.is_empty() {
                println!("No efficiency anomalies found.\n");
            } else {
                output::write_anomalies(&cfg.anomalies_path, &detection.anomalies)?;
                println!("Found {} anomalies\n", detection.anomalies.len());
                output::preview_table_rows(&reports::anomaly_preview_rows(&detection.anomalies), 5);
                println!("(Full table exported to {})\n", cfg.anomalies_path.display());
            }
        }
    }

    let layout = reports::build_grouped_layout(&monthly, cfg.machines_per_row);
    output::write_grouped_report(&cfg.report_path, &layout)?;
    println!(
        "Machine report: {} group(s) of up to {} machines saved to {}\n",
        layout.groups,
        cfg.machines_per_row,
        cfg.report_path.display()
    );

    let billing = if cfg.billing_path.exists() {
        reports::billing_by_month(&workbook::read_first_sheet(&cfg.billing_path)?)
    } else {
        warn!(path = %cfg.billing_path.display(), "billing file not found, billed amounts left empty");
        Default::default()
    };
    let global = reports::global_summary(&monthly, &billing);
    output::write_global_summary(&cfg.global_summary_path, &global)?;
    println!("Monthly summary\n");
    output::preview_table_rows(&reports::global_preview_rows(&global), 12);
    println!("(Full table exported to {})\n", cfg.global_summary_path.display());

    let summary = ReportSummary {
        months: global.len(),
        machines: aggregate::machines(&monthly).len(),
        groups: layout.groups,
        anomalies: detection.anomalies.len(),
        mean_efficiency: detection.thresholds.map(|t| t.mean),
        std_dev: detection.thresholds.map(|t| t.std_dev),
        high_threshold: detection.thresholds.map(|t| t.high),
        low_threshold: detection.thresholds.map(|t| t.low),
    };
    output::write_json(&cfg.summary_path, &summary)?;
    Ok(())
}

fn run_command(cmd: Command, config: &Config) -> bool {
    let mut ok = true;
    if matches!(cmd, Command::Consolidate | Command::All) {
        if let Err(e) = handle_consolidate(&config.consolidator) {
            error!("consolidation failed: {}", e);
            ok = false;
        }
    }
    if matches!(cmd, Command::Report | Command::All) {
        if let Err(e) = handle_generate_reports(&config.reporter) {
            error!("report generation failed: {}", e);
            ok = false;
        }
    }
    ok
}

fn run_menu(config: &Config) {
    loop {
        println!("Select an operation:");
        println!("[1] Consolidate machine sheets");
        println!("[2] Generate reports\n");
        let Some(choice) = read_choice() else {
            break;
        };
        match choice.as_str() {
            "1" => {
                run_command(Command::Consolidate, config);
            }
            "2" => {
                println!();
                run_command(Command::Report, config);
                if !prompt_back_to_menu() {
                    println!("Exiting the program.");
                    break;
                }
            }
            _ => println!("Invalid choice. Please enter 1 or 2.\n"),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    let config = Config::load(&cli.config)
        .with_context(|| format!("cannot start without configuration {}", cli.config.display()))?;

    match cli.command {
        Some(cmd) => {
            if !run_command(cmd, &config) {
                anyhow::bail!("one or more stages failed");
            }
        }
        None => run_menu(&config),
    }
    Ok(())
}
