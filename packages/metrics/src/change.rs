//! Percentage change between the two window aggregates.

use data_alerts_metrics_models::{AreaResult, PopulationRate};

use crate::aggregate::{AreaSeries, WindowAggregates};

/// Percentage change from `prior` to `current`.
///
/// A flat zero baseline is no change; any rise from a zero baseline is an
/// unbounded increase (`+inf`), which exceeds every finite threshold.
#[must_use]
#[allow(clippy::float_cmp)] // exact zero baseline
pub fn percentage_change(prior: f64, current: f64) -> f64 {
    if prior == 0.0 {
        if current == 0.0 { 0.0 } else { f64::INFINITY }
    } else {
        (current - prior) / prior * 100.0
    }
}

/// Percentage change of a pair of aggregates, or `None` when either window
/// had no data and the area is not comparable.
#[must_use]
pub fn compare(aggregates: WindowAggregates) -> Option<f64> {
    let prior = aggregates.prior?;
    let current = aggregates.current?;
    Some(percentage_change(prior, current))
}

/// Assembles the result row for one area, or `None` if it is not
/// comparable.
#[must_use]
pub fn area_result(
    area: &AreaSeries<'_>,
    aggregates: WindowAggregates,
    rate: impl FnOnce(f64) -> PopulationRate,
) -> Option<AreaResult> {
    let percentage_change = compare(aggregates)?;
    let prior = aggregates.prior?;
    let current = aggregates.current?;

    Some(AreaResult {
        area_name: area.area_name.to_string(),
        area_code: area.area_code.to_string(),
        prior,
        current,
        percentage_change,
        rate: rate(current),
    })
}
