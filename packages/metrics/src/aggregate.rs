//! Per-area window aggregation and population normalization.

use std::collections::{BTreeMap, BTreeSet};

use data_alerts_metrics_models::{
    Aggregation, AreaNamespace, ComparisonWindow, DateWindow, MetricKind, PER_CAPITA_SCALE,
    PopulationRate, PopulationTable, TimeSeriesPoint,
};

use crate::EvaluationError;

/// All rows of a series belonging to one area.
#[derive(Debug, Clone)]
pub struct AreaSeries<'a> {
    /// Area name shared by every row.
    pub area_name: &'a str,
    /// The single area code published for this area name.
    pub area_code: &'a str,
    /// Rows in series order.
    pub points: Vec<&'a TimeSeriesPoint>,
}

/// Aggregates of one area's two windows. `None` means the window had no
/// rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowAggregates {
    /// Aggregate over the prior window.
    pub prior: Option<f64>,
    /// Aggregate over the current window.
    pub current: Option<f64>,
}

/// Splits a series into per-area groups, in order of first appearance.
///
/// # Errors
///
/// Returns [`EvaluationError::AmbiguousAreaCode`] if any area name is
/// published with more than one area code.
pub fn group_by_area(series: &[TimeSeriesPoint]) -> Result<Vec<AreaSeries<'_>>, EvaluationError> {
    let mut index: BTreeMap<&str, usize> = BTreeMap::new();
    let mut groups: Vec<(AreaSeries<'_>, BTreeSet<&str>)> = Vec::new();

    for point in series {
        let slot = *index.entry(point.area_name.as_str()).or_insert_with(|| {
            groups.push((
                AreaSeries {
                    area_name: &point.area_name,
                    area_code: &point.area_code,
                    points: Vec::new(),
                },
                BTreeSet::new(),
            ));
            groups.len() - 1
        });

        let (area, codes) = &mut groups[slot];
        area.points.push(point);
        codes.insert(point.area_code.as_str());
    }

    groups
        .into_iter()
        .map(|(area, codes)| {
            if codes.len() == 1 {
                Ok(area)
            } else {
                Err(EvaluationError::AmbiguousAreaCode {
                    area_name: area.area_name.to_string(),
                    codes: codes.into_iter().map(str::to_string).collect(),
                })
            }
        })
        .collect()
}

/// Applies an aggregation operator. Returns `None` for an empty slice.
#[must_use]
pub fn aggregate(operator: Aggregation, values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let total: f64 = values.iter().sum();
    match operator {
        Aggregation::Sum => Some(total),
        #[allow(clippy::cast_precision_loss)] // at most 7 daily values
        Aggregation::Mean => Some(total / values.len() as f64),
    }
}

fn values_in(area: &AreaSeries<'_>, window: &DateWindow) -> Vec<f64> {
    area.points
        .iter()
        .filter(|point| window.contains(point.date))
        .map(|point| point.value)
        .collect()
}

/// Aggregates an area's rows independently over both windows.
#[must_use]
pub fn aggregate_windows(
    area: &AreaSeries<'_>,
    operator: Aggregation,
    window: &ComparisonWindow,
) -> WindowAggregates {
    WindowAggregates {
        prior: aggregate(operator, &values_in(area, &window.prior)),
        current: aggregate(operator, &values_in(area, &window.current)),
    }
}

/// `value` per 100,000 of `population`. A zero population has no rate.
#[must_use]
pub fn per_100000(value: f64, population: u64) -> Option<f64> {
    if population == 0 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)] // populations are far below 2^52
    let population = population as f64;
    Some(value / population * PER_CAPITA_SCALE)
}

/// Computes the per-100,000 rate column for an area's current aggregate.
///
/// Metric types without a population source get
/// [`PopulationRate::NotApplicable`]. A missing table entry is a
/// recoverable gap: it is logged and yields [`PopulationRate::Unknown`].
#[must_use]
pub fn population_rate(
    area: &AreaSeries<'_>,
    current: f64,
    kind: MetricKind,
    population: Option<&PopulationTable>,
) -> PopulationRate {
    if !kind.is_per_capita() {
        return PopulationRate::NotApplicable;
    }

    let Some(table) = population else {
        log::warn!(
            "No population table available for area '{}', rate unavailable",
            area.area_name
        );
        return PopulationRate::Unknown;
    };

    let key = match table.namespace() {
        AreaNamespace::Code => area.area_code,
        AreaNamespace::Name => area.area_name,
    };

    match table.get(key).and_then(|population| per_100000(current, population)) {
        Some(rate) => PopulationRate::Known(rate),
        None => {
            log::warn!(
                "Error getting population for area '{}', {} {key} not found",
                area.area_name,
                table.namespace()
            );
            PopulationRate::Unknown
        }
    }
}
