#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Week-over-week comparison engine for daily metric series.
//!
//! A single series (one metric, one area type, every area) flows through
//! four stages:
//!
//! 1. [`window::resolve_window`] picks the prior and current 7-day windows
//!    from the latest published date and the verification mode.
//! 2. [`aggregate`] groups rows per area, aggregates each window with the
//!    configured operator and normalizes by population where the metric
//!    type allows it.
//! 3. [`change`] computes the percentage change with an explicit
//!    zero-baseline policy.
//! 4. [`threshold`] keeps and ranks the areas above the configured
//!    thresholds.
//!
//! [`evaluate_metric`] chains the stages for one configured metric check.

pub mod aggregate;
pub mod change;
pub mod threshold;
pub mod window;


use data_alerts_metrics_models::{
    MetricCheck, MetricReport, PopulationTable, Thresholds, TimeSeriesPoint, VerificationMode,
    WindowLabels, round_one_decimal,
};
use thiserror::Error;

/// Errors that abort the evaluation of one metric check.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// The series had no rows, so there is no latest date to anchor on.
    #[error("Time series is empty, no comparison window can be resolved")]
    EmptySeries,

    /// One area name was published with several area codes.
    #[error("Unexpected area codes {codes:?} found for area name '{area_name}'")]
    AmbiguousAreaCode {
        /// The ambiguous area name.
        area_name: String,
        /// Every distinct code seen for it.
        codes: Vec<String>,
    },
}

/// Evaluates one metric check against its series.
///
/// Areas with an empty window are excluded (and listed in
/// [`MetricReport::excluded`]) rather than failing the whole metric.
/// `population` is only consulted for per-capita metric types.
///
/// # Errors
///
/// Returns [`EvaluationError::EmptySeries`] for an empty series and
/// [`EvaluationError::AmbiguousAreaCode`] if an area name maps to more
/// than one area code.
pub fn evaluate_metric(
    check: &MetricCheck,
    series: &[TimeSeriesPoint],
    population: Option<&PopulationTable>,
    thresholds: &Thresholds,
    mode: VerificationMode,
) -> Result<MetricReport, EvaluationError> {
    let window = window::resolve_window(series, mode)?;
    let labels = window.labels(&check.metric);
    let areas = aggregate::group_by_area(series)?;

    let mut rows = Vec::with_capacity(areas.len());
    let mut excluded = Vec::new();

    for area in &areas {
        let aggregates = aggregate::aggregate_windows(area, check.aggregation, &window);
        let row = change::area_result(area, aggregates, |current| {
            aggregate::population_rate(area, current, check.kind, population)
        });

        if let Some(row) = row {
            rows.push(row);
        } else {
            log::warn!(
                "Cannot calculate {} change for area '{}': prior={:?} current={:?}",
                check.metric,
                area.area_name,
                aggregates.prior,
                aggregates.current
            );
            excluded.push(area.area_name.to_string());
        }
    }

    let exceeding = threshold::filter_exceeding(&rows, check.kind, thresholds);

    let report = MetricReport {
        check: check.clone(),
        window,
        labels,
        rows,
        exceeding,
        excluded,
    };

    log::info!("{} data:\n{}", check.metric, describe_rows(&report));
    log::info!(
        "{check}: {} of {} areas above thresholds",
        report.exceeding.len(),
        report.rows.len()
    );

    Ok(report)
}

/// Plain-text table of every row in a report, for diagnostics.
#[must_use]
pub fn describe_rows(report: &MetricReport) -> String {
    let WindowLabels { prior, current } = &report.labels;
    let with_rate = report.check.kind.is_per_capita();

    let mut header = format!(
        "{:<36} {prior:>44} {current:>44} {:>16}",
        "areaName", "percentageChange"
    );
    if with_rate {
        header.push_str(&format!(" {:>22}", "lastSevenDaysPer100000"));
    }

    let lines = report.rows.iter().map(|row| {
        let mut line = format!(
            "{:<36} {:>44} {:>44} {:>16}",
            row.area_name,
            round_one_decimal(row.prior),
            round_one_decimal(row.current),
            round_one_decimal(row.percentage_change)
        );
        if with_rate {
            let rate = row
                .rate
                .value()
                .map_or_else(|| "NaN".to_string(), |rate| round_one_decimal(rate).to_string());
            line.push_str(&format!(" {rate:>22}"));
        }
        line
    });

    std::iter::once(header).chain(lines).collect::<Vec<_>>().join("\n")
}
