//! One alert run: definitions diff, metric evaluation, alert dispatch.
//!
//! Every external system is reached through a collaborator trait, so the
//! run itself holds no clients or sessions.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use data_alerts_definitions::BaselineStore;
use data_alerts_definitions::detector::{self, DefinitionsDiff};
use data_alerts_metrics::{EvaluationError, evaluate_metric};
use data_alerts_metrics_models::{
    MetricCheck, MetricReport, PopulationSourceKind, PopulationTable, Thresholds,
    VerificationMode,
};
use data_alerts_notify::{AlertSink, NotifyError, report};
use data_alerts_population::PopulationSource;
use data_alerts_source::{MetricSource, SourceError};

use crate::config::AlertConfig;

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The current metric definitions could not be fetched.
    #[error("Failed to fetch metric definitions: {0}")]
    Definitions(#[from] SourceError),

    /// The new baseline could not be persisted.
    #[error("Failed to persist baseline: {0}")]
    Baseline(#[from] data_alerts_definitions::BaselineError),

    /// An alert could not be delivered.
    #[error("Failed to send alert: {0}")]
    Notify(#[from] NotifyError),

    /// Some metric checks failed; the others were still evaluated.
    #[error("Failed to evaluate metrics: {}", .checks.join(", "))]
    MetricsFailed {
        /// The failed checks.
        checks: Vec<String>,
    },
}

/// Why one metric check could not be evaluated.
#[derive(Debug, thiserror::Error)]
pub enum MetricError {
    /// The series could not be fetched.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The population table the check needs could not be loaded.
    #[error("{kind} population unavailable: {message}")]
    Population {
        /// Dataset that failed.
        kind: PopulationSourceKind,
        /// Load failure.
        message: String,
    },

    /// The series was unusable.
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

/// A metric check that could not be evaluated.
#[derive(Debug)]
pub struct MetricFailure {
    /// The check.
    pub check: MetricCheck,
    /// What went wrong.
    pub error: MetricError,
}

/// Reports and failures of the configured metric checks.
#[derive(Debug, Default)]
pub struct ChecksOutcome {
    /// Reports of the checks that evaluated, in configuration order.
    pub reports: Vec<MetricReport>,
    /// Checks that failed.
    pub failures: Vec<MetricFailure>,
}

impl ChecksOutcome {
    /// Converts failures into [`RunError::MetricsFailed`].
    ///
    /// # Errors
    ///
    /// Returns [`RunError::MetricsFailed`] if any check failed.
    pub fn ensure_complete(&self) -> Result<(), RunError> {
        if self.failures.is_empty() {
            return Ok(());
        }
        Err(RunError::MetricsFailed {
            checks: self
                .failures
                .iter()
                .map(|failure| failure.check.to_string())
                .collect(),
        })
    }
}

/// Result of a full run.
#[derive(Debug)]
pub struct RunSummary {
    /// Definitions diff.
    pub definitions: DefinitionsDiff,
    /// Metric evaluation outcome.
    pub checks: ChecksOutcome,
    /// Number of alerts dispatched.
    pub alerts_sent: usize,
}

/// External systems a run talks to.
pub struct Collaborators<'a> {
    /// Series and definitions.
    pub source: &'a dyn MetricSource,
    /// Population tables.
    pub population: &'a dyn PopulationSource,
    /// Definitions baseline.
    pub baseline: &'a dyn BaselineStore,
    /// Alert dispatch.
    pub alerts: &'a dyn AlertSink,
}

/// Fetches the current definitions, diffs them against the baseline and
/// persists them as the new baseline.
///
/// # Errors
///
/// Returns [`RunError::Definitions`] if the definitions cannot be fetched
/// and [`RunError::Baseline`] if the new baseline cannot be written.
pub async fn check_definitions(
    source: &dyn MetricSource,
    baseline: &dyn BaselineStore,
) -> Result<DefinitionsDiff, RunError> {
    let current = source.fetch_current_definitions().await?;
    Ok(detector::detect_new_definitions(baseline, &current).await?)
}

/// Evaluates every configured metric check.
///
/// A failing check is logged and recorded; it never stops the others.
/// Each population table is loaded at most once per call.
pub async fn evaluate_checks(
    source: &dyn MetricSource,
    population: &dyn PopulationSource,
    config: &AlertConfig,
    mode: VerificationMode,
) -> ChecksOutcome {
    log::info!("Evaluating {} metrics in {mode} mode", config.metrics.len());

    let mut tables = BTreeMap::new();
    let mut outcome = ChecksOutcome::default();

    for check in &config.metrics {
        match evaluate_check(check, source, population, &mut tables, &config.thresholds, mode)
            .await
        {
            Ok(report) => outcome.reports.push(report),
            Err(error) => {
                log::error!("Failed to evaluate {check}: {error}");
                outcome.failures.push(MetricFailure {
                    check: check.clone(),
                    error,
                });
            }
        }
    }

    outcome
}

async fn evaluate_check(
    check: &MetricCheck,
    source: &dyn MetricSource,
    population: &dyn PopulationSource,
    tables: &mut BTreeMap<PopulationSourceKind, Result<PopulationTable, String>>,
    thresholds: &Thresholds,
    mode: VerificationMode,
) -> Result<MetricReport, MetricError> {
    let series = source
        .fetch_time_series(&check.area_type, &check.metric)
        .await?;

    let table = match check.population {
        Some(kind) if check.kind.is_per_capita() => {
            Some(population_table(population, kind, tables).await?)
        }
        _ => None,
    };

    Ok(evaluate_metric(check, &series, table, thresholds, mode)?)
}

async fn population_table<'t>(
    population: &dyn PopulationSource,
    kind: PopulationSourceKind,
    tables: &'t mut BTreeMap<PopulationSourceKind, Result<PopulationTable, String>>,
) -> Result<&'t PopulationTable, MetricError> {
    let loaded = match tables.entry(kind) {
        Entry::Occupied(entry) => entry.into_mut(),
        Entry::Vacant(entry) => {
            let fetched = population
                .fetch_population_table(kind)
                .await
                .map_err(|e| e.to_string());
            entry.insert(fetched)
        }
    };

    match loaded {
        Ok(table) => Ok(&*table),
        Err(message) => Err(MetricError::Population {
            kind,
            message: message.clone(),
        }),
    }
}

/// Sends `alert` and counts it.
async fn dispatch(
    alerts: &dyn AlertSink,
    alert: &report::Alert,
    sent: &mut usize,
) -> Result<(), NotifyError> {
    alerts.send_alert(&alert.subject, &alert.body_html).await?;
    *sent += 1;
    Ok(())
}

/// Runs the whole job: definitions diff and baseline persist, metric
/// evaluation, then alert dispatch.
///
/// Failed metric checks are reported in [`RunSummary::checks`] rather than
/// as an error, so that alerts for the other metrics still go out.
///
/// # Errors
///
/// Returns [`RunError`] if the definitions cannot be fetched, the baseline
/// cannot be written, or an alert cannot be sent.
pub async fn run(
    collaborators: &Collaborators<'_>,
    config: &AlertConfig,
    mode: VerificationMode,
) -> Result<RunSummary, RunError> {
    let definitions = check_definitions(collaborators.source, collaborators.baseline).await?;

    let checks = evaluate_checks(
        collaborators.source,
        collaborators.population,
        config,
        mode,
    )
    .await;

    let dashboard_url = &config.api.dashboard_url;
    let threshold = config.thresholds.percentage_change;
    let mut alerts_sent = 0;

    if let Some(alert) = report::new_definitions_alert(&definitions.added, dashboard_url) {
        dispatch(collaborators.alerts, &alert, &mut alerts_sent).await?;
    }

    if let Some(alert) = report::threshold_alert(&checks.reports, threshold, dashboard_url) {
        dispatch(collaborators.alerts, &alert, &mut alerts_sent).await?;
    } else {
        log::info!("No metric exceeded {threshold}% change");
    }

    Ok(RunSummary {
        definitions,
        checks,
        alerts_sent,
    })
}
