//! Threshold filtering and ranking of per-area results.

use data_alerts_metrics_models::{AreaResult, MetricKind, Thresholds};

/// Whether a row exceeds the thresholds for its metric type.
///
/// Both criteria are strict and use the unrounded values. Case-count rows
/// without a known rate never pass.
#[must_use]
pub fn exceeds(row: &AreaResult, kind: MetricKind, thresholds: &Thresholds) -> bool {
    if row.percentage_change <= thresholds.percentage_change || row.percentage_change.is_nan() {
        return false;
    }

    match kind {
        MetricKind::CaseCount => row
            .rate
            .value()
            .is_some_and(|rate| rate > thresholds.cases_per_100000),
        MetricKind::HospitalActivity => row.current > thresholds.hospital_current_value,
    }
}

/// Keeps the rows that exceed the thresholds, ranked by percentage change
/// descending. Ties keep their input order.
#[must_use]
pub fn filter_exceeding(
    rows: &[AreaResult],
    kind: MetricKind,
    thresholds: &Thresholds,
) -> Vec<AreaResult> {
    let mut exceeding: Vec<AreaResult> = rows
        .iter()
        .filter(|row| exceeds(row, kind, thresholds))
        .cloned()
        .collect();

    exceeding.sort_by(|a, b| b.percentage_change.total_cmp(&a.percentage_change));
    exceeding
}

#[cfg(test)]
mod tests {
    use data_alerts_metrics_models::PopulationRate;
    use proptest::prelude::*;

    use super::*;

    fn row(name: &str, current: f64, change: f64, rate: PopulationRate) -> AreaResult {
        AreaResult {
            area_name: name.to_string(),
            area_code: format!("{name}-code"),
            prior: 1.0,
            current,
            percentage_change: change,
            rate,
        }
    }

    #[test]
    fn case_counts_need_both_criteria() {
        let thresholds = Thresholds::default();
        let rows = vec![
            row("Both", 500.0, 150.0, PopulationRate::Known(120.0)),
            row("LowRate", 500.0, 150.0, PopulationRate::Known(80.0)),
            row("LowChange", 500.0, 50.0, PopulationRate::Known(300.0)),
            row("AtThreshold", 500.0, 100.0, PopulationRate::Known(300.0)),
        ];
        let exceeding = filter_exceeding(&rows, MetricKind::CaseCount, &thresholds);
        let names: Vec<&str> = exceeding.iter().map(|r| r.area_name.as_str()).collect();
        assert_eq!(names, vec!["Both"]);
    }

    #[test]
    fn unknown_rate_never_passes() {
        let thresholds = Thresholds::default();
        let rows = vec![row("NoPopulation", 5_000.0, f64::INFINITY, PopulationRate::Unknown)];
        assert!(filter_exceeding(&rows, MetricKind::CaseCount, &thresholds).is_empty());
    }

    #[test]
    fn hospital_rows_use_absolute_current_value() {
        let thresholds = Thresholds {
            hospital_current_value: 50.0,
            ..Thresholds::default()
        };
        let rows = vec![
            row("Busy", 80.0, 120.0, PopulationRate::NotApplicable),
            row("Quiet", 20.0, 400.0, PopulationRate::NotApplicable),
        ];
        let exceeding = filter_exceeding(&rows, MetricKind::HospitalActivity, &thresholds);
        assert_eq!(exceeding.len(), 1);
        assert_eq!(exceeding[0].area_name, "Busy");
    }

    #[test]
    fn ranks_descending_with_stable_ties() {
        let thresholds = Thresholds::default();
        let rows = vec![
            row("A", 10.0, 150.0, PopulationRate::NotApplicable),
            row("B", 10.0, f64::INFINITY, PopulationRate::NotApplicable),
            row("C", 10.0, 300.0, PopulationRate::NotApplicable),
            row("D", 10.0, 150.0, PopulationRate::NotApplicable),
        ];
        let exceeding = filter_exceeding(&rows, MetricKind::HospitalActivity, &thresholds);
        let names: Vec<&str> = exceeding.iter().map(|r| r.area_name.as_str()).collect();
        assert_eq!(names, vec!["B", "C", "A", "D"]);
    }

    #[test]
    fn nothing_exceeding_is_empty_not_error() {
        let rows = vec![row("Flat", 10.0, 0.0, PopulationRate::NotApplicable)];
        assert!(
            filter_exceeding(&rows, MetricKind::HospitalActivity, &Thresholds::default())
                .is_empty()
        );
    }

    fn any_rate() -> impl Strategy<Value = PopulationRate> {
        prop_oneof![
            Just(PopulationRate::Unknown),
            (0.0f64..1_000.0).prop_map(PopulationRate::Known),
        ]
    }

    fn any_row() -> impl Strategy<Value = AreaResult> {
        (
            "[A-Z][a-z]{2,8}",
            0.0f64..1_000.0,
            prop_oneof![(-100.0f64..1_000.0), Just(f64::INFINITY)],
            any_rate(),
        )
            .prop_map(|(name, current, change, rate)| row(&name, current, change, rate))
    }

    proptest! {
        #[test]
        fn output_is_ranked_subset_satisfying_predicate(
            rows in proptest::collection::vec(any_row(), 0..40),
            change_threshold in 0.0f64..500.0,
            rate_threshold in 0.0f64..500.0,
            case_count in any::<bool>(),
        ) {
            let kind = if case_count { MetricKind::CaseCount } else { MetricKind::HospitalActivity };
            let thresholds = Thresholds {
                percentage_change: change_threshold,
                cases_per_100000: rate_threshold,
                hospital_current_value: rate_threshold,
            };
            let exceeding = filter_exceeding(&rows, kind, &thresholds);

            prop_assert!(exceeding.len() <= rows.len());
            for result in &exceeding {
                prop_assert!(rows.contains(result));
                prop_assert!(exceeds(result, kind, &thresholds));
            }
            for pair in exceeding.windows(2) {
                prop_assert!(pair[0].percentage_change >= pair[1].percentage_change);
            }
            let expected = rows.iter().filter(|r| exceeds(r, kind, &thresholds)).count();
            prop_assert_eq!(exceeding.len(), expected);
        }
    }
}
