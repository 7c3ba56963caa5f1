#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the metric alert job.
//!
//! `data_alerts` (or `data_alerts run`) performs the scheduled run; the
//! other subcommands run one half of it without sending anything.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use data_alerts_cli::config::{AlertConfig, Environment};
use data_alerts_cli::run::{self, Collaborators};
use data_alerts_definitions::BaselineStore;
use data_alerts_definitions::file::FileBaselineStore;
use data_alerts_metrics_models::VerificationMode;
use data_alerts_notify::{AlertSink, EmailAlerter, LogAlerter};
use data_alerts_population::HttpPopulationSource;
use data_alerts_source::HttpMetricSource;
use data_alerts_store::S3BaselineStore;

/// Week-over-week metric alerts for the UK coronavirus dashboard.
#[derive(Parser)]
#[command(name = "data_alerts")]
#[command(about = "Week-over-week metric alerts for the UK coronavirus dashboard")]
struct Cli {
    /// TOML configuration replacing the embedded one.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Keep the definitions baseline in a local JSON file instead of the
    /// object store.
    #[arg(long, global = true)]
    baseline_file: Option<PathBuf>,

    /// Anchor windows before the latest, still back-filling, days.
    /// Overrides `DATA_VERIFICATION_MODE`.
    #[arg(long, global = true)]
    verified: bool,

    /// Subcommand to execute (default: `run`).
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Diff definitions, evaluate metrics and send alerts.
    Run,

    /// Evaluate metrics and print the per-area tables. Sends nothing.
    Check {
        /// Print reports as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Diff and persist metric definitions. Sends nothing.
    Definitions,

    /// List the configured metric checks and thresholds.
    Metrics,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();
    let cli = Cli::parse();

    let config = AlertConfig::load(cli.config.as_deref())?;
    let env = Environment::from_env()?;
    let mode = if cli.verified {
        VerificationMode::Verified
    } else {
        env.verification_mode
    };

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => cmd_run(&config, &env, mode, cli.baseline_file).await,
        Commands::Check { json } => cmd_check(&config, mode, json).await,
        Commands::Definitions => cmd_definitions(&config, &env, cli.baseline_file).await,
        Commands::Metrics => {
            cmd_metrics(&config);
            Ok(())
        }
    }
}

/// Logs at `info` unless `RUST_LOG` says otherwise.
fn init_logger() {
    let mut builder = pretty_env_logger::formatted_builder();
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    } else {
        builder.filter_level(log::LevelFilter::Info);
    }
    builder.init();
}

fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(concat!("data_alerts/", env!("CARGO_PKG_VERSION")))
        .build()
}

fn metric_source(config: &AlertConfig, client: reqwest::Client) -> HttpMetricSource {
    HttpMetricSource::new(client, &config.api.series_url, &config.api.definitions_url)
}

async fn baseline_store(
    env: &Environment,
    baseline_file: Option<PathBuf>,
) -> Box<dyn BaselineStore> {
    match baseline_file {
        Some(path) => Box::new(FileBaselineStore::new(path)),
        None => Box::new(S3BaselineStore::connect(env.baseline.clone()).await),
    }
}

fn alert_sink(env: &Environment) -> Result<Box<dyn AlertSink>, data_alerts_notify::NotifyError> {
    if env.recipients.is_empty() {
        return Ok(Box::new(LogAlerter));
    }
    Ok(Box::new(EmailAlerter::new(
        &env.smtp,
        &env.from_address,
        &env.recipients,
    )?))
}

async fn cmd_run(
    config: &AlertConfig,
    env: &Environment,
    mode: VerificationMode,
    baseline_file: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = http_client()?;
    let source = metric_source(config, client.clone());
    let population = HttpPopulationSource::new(client, config.population.layouts());
    let baseline = baseline_store(env, baseline_file).await;
    let alerts = alert_sink(env)?;

    let summary = run::run(
        &Collaborators {
            source: &source,
            population: &population,
            baseline: baseline.as_ref(),
            alerts: alerts.as_ref(),
        },
        config,
        mode,
    )
    .await?;

    log::info!(
        "Run complete: {} new definitions, {} metrics evaluated, {} alerts sent",
        summary.definitions.added.len(),
        summary.checks.reports.len(),
        summary.alerts_sent
    );

    summary.checks.ensure_complete()?;
    Ok(())
}

async fn cmd_check(
    config: &AlertConfig,
    mode: VerificationMode,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = http_client()?;
    let source = metric_source(config, client.clone());
    let population = HttpPopulationSource::new(client, config.population.layouts());

    let outcome = run::evaluate_checks(&source, &population, config, mode).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.reports)?);
    } else {
        for report in &outcome.reports {
            println!("=== {} ===", report.check);
            println!("{}", data_alerts_metrics::describe_rows(report));
            println!(
                "{} of {} areas above thresholds",
                report.exceeding.len(),
                report.rows.len()
            );
            if !report.excluded.is_empty() {
                println!("Excluded (no data in a window): {}", report.excluded.join(", "));
            }
            println!();
        }
    }

    outcome.ensure_complete()?;
    Ok(())
}

async fn cmd_definitions(
    config: &AlertConfig,
    env: &Environment,
    baseline_file: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = metric_source(config, http_client()?);
    let baseline = baseline_store(env, baseline_file).await;

    let diff = run::check_definitions(&source, baseline.as_ref()).await?;

    println!(
        "{} definitions ({} previously), {} new",
        diff.current_count,
        diff.previous_count,
        diff.added.len()
    );
    for identifier in &diff.added {
        println!("  {identifier}");
    }

    Ok(())
}

fn cmd_metrics(config: &AlertConfig) {
    let thresholds = &config.thresholds;
    println!(
        "Thresholds: change > {}%, cases per 100,000 > {}, hospital current value > {}",
        thresholds.percentage_change, thresholds.cases_per_100000, thresholds.hospital_current_value
    );
    for check in &config.metrics {
        match check.population {
            Some(kind) => println!("  {check} [{}, {kind} population]", check.kind),
            None => println!("  {check} [{}]", check.kind),
        }
    }
}
