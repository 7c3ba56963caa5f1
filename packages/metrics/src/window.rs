//! Comparison window selection.
//!
//! The windows are a pure function of the latest date in the series and
//! the verification mode: no other property of the series is consulted.

use chrono::Days;
use data_alerts_metrics_models::{ComparisonWindow, TimeSeriesPoint, VerificationMode};

use crate::EvaluationError;

/// Resolves the prior and current 7-day windows for a series.
///
/// The upper bound is the latest date in the whole series (across every
/// area) in [`VerificationMode::Unverified`], or that date minus the
/// reporting lag in [`VerificationMode::Verified`].
///
/// # Errors
///
/// Returns [`EvaluationError::EmptySeries`] if `series` has no rows.
pub fn resolve_window(
    series: &[TimeSeriesPoint],
    mode: VerificationMode,
) -> Result<ComparisonWindow, EvaluationError> {
    let latest = series
        .iter()
        .map(|point| point.date)
        .max()
        .ok_or(EvaluationError::EmptySeries)?;

    let upper_bound = latest - Days::new(mode.lag_days());
    log::debug!("Latest date {latest}, {mode} upper bound {upper_bound}");

    Ok(ComparisonWindow::ending_on(upper_bound))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use proptest::prelude::*;

    use super::*;

    fn point(area: &str, date: NaiveDate) -> TimeSeriesPoint {
        TimeSeriesPoint {
            area_name: area.to_string(),
            area_code: format!("{area}-code"),
            date,
            value: 1.0,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn empty_series_has_no_window() {
        let err = resolve_window(&[], VerificationMode::Unverified).unwrap_err();
        assert!(matches!(err, EvaluationError::EmptySeries));
    }

    #[test]
    fn unverified_anchors_on_latest_date_across_areas() {
        let series = vec![
            point("Leeds", date(2021, 3, 12)),
            point("York", date(2021, 3, 14)),
            point("Leeds", date(2021, 3, 1)),
        ];
        let window = resolve_window(&series, VerificationMode::Unverified).unwrap();
        assert_eq!(window.upper_bound, date(2021, 3, 14));
        assert_eq!(window.current.start, date(2021, 3, 8));
    }

    #[test]
    fn verified_discounts_reporting_lag() {
        let series = vec![point("Leeds", date(2021, 3, 14))];
        let window = resolve_window(&series, VerificationMode::Verified).unwrap();
        assert_eq!(window.upper_bound, date(2021, 3, 10));
        assert_eq!(window.current.end, date(2021, 3, 10));
        assert_eq!(window.prior.start, date(2021, 2, 25));
    }

    fn any_date() -> impl Strategy<Value = NaiveDate> {
        (0i64..40_000).prop_map(|offset| date(1950, 1, 1) + chrono::Duration::days(offset))
    }

    proptest! {
        #[test]
        fn windows_are_seven_days_and_disjoint(upper in any_date()) {
            let window = ComparisonWindow::ending_on(upper);
            prop_assert_eq!(window.prior.days(), 7);
            prop_assert_eq!(window.current.days(), 7);
            prop_assert!(window.prior.end < window.current.start);
            prop_assert_eq!((window.current.start - window.prior.end).num_days(), 1);
            prop_assert_eq!(window.current.end, upper);
        }

        #[test]
        fn resolution_is_idempotent(dates in proptest::collection::vec(any_date(), 1..30), verified in any::<bool>()) {
            let mode = if verified { VerificationMode::Verified } else { VerificationMode::Unverified };
            let series: Vec<TimeSeriesPoint> = dates.iter().map(|d| point("Area", *d)).collect();
            let first = resolve_window(&series, mode).unwrap();
            let second = resolve_window(&series, mode).unwrap();
            prop_assert_eq!(first, second);

            let mut reversed = series.clone();
            reversed.reverse();
            prop_assert_eq!(resolve_window(&reversed, mode).unwrap(), first);
        }
    }
}
