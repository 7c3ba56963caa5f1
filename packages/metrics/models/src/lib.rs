#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Data model for the week-over-week metric alert engine.
//!
//! These types describe a single daily metric series (one row per area per
//! day), the two adjacent 7-day comparison windows derived from it, the
//! population tables used for per-capita normalization, and the per-area
//! comparison rows that the threshold filter ranks.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize, Serializer};
use strum_macros::{AsRefStr, Display, EnumString};

/// Number of calendar days in each comparison window.
pub const WINDOW_DAYS: u64 = 7;

/// Upstream reporting lag (in days) discounted in verified mode.
pub const VERIFICATION_LAG_DAYS: u64 = 4;

/// Multiplier for per-capita rates.
pub const PER_CAPITA_SCALE: f64 = 100_000.0;

/// One metric value for one area on one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesPoint {
    /// Human-readable area name (e.g. "London", "Manchester").
    pub area_name: String,
    /// ONS area code (e.g. "E09000001").
    pub area_code: String,
    /// Calendar day of the observation.
    pub date: NaiveDate,
    /// Non-negative metric value. Missing observations are absent rows,
    /// never zero.
    pub value: f64,
}

/// How far back from the latest published date the comparison is anchored.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum VerificationMode {
    /// Anchor [`VERIFICATION_LAG_DAYS`] before the latest date, skipping the
    /// most recent days that are still being back-filled upstream.
    Verified,
    /// Anchor on the latest date present in the series.
    #[default]
    Unverified,
}

impl VerificationMode {
    /// Number of days subtracted from the latest date to obtain the
    /// comparison upper bound.
    #[must_use]
    pub const fn lag_days(self) -> u64 {
        match self {
            Self::Verified => VERIFICATION_LAG_DAYS,
            Self::Unverified => 0,
        }
    }
}

/// Operator used to collapse a window's daily values into one aggregate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Aggregation {
    /// Total over the window (daily counts such as new cases).
    Sum,
    /// Arithmetic mean over the window (stock levels such as occupancy).
    Mean,
}

/// Metric type tag. Selects the second threshold criterion.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MetricKind {
    /// Case counts: normalized per 100,000 population and filtered on that
    /// rate.
    CaseCount,
    /// Hospital admissions and occupancy: no reliable population source,
    /// filtered on the absolute current aggregate.
    HospitalActivity,
}

impl MetricKind {
    /// Whether this metric type carries a per-100,000 rate column.
    #[must_use]
    pub const fn is_per_capita(self) -> bool {
        matches!(self, Self::CaseCount)
    }
}

/// Which external population dataset a metric is normalized against.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PopulationSourceKind {
    /// ONS mid-year estimates keyed by lower-tier local authority code.
    LocalAuthority,
    /// NHS England population estimates keyed by NHS region name.
    NhsRegion,
}

/// The key space of a [`PopulationTable`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AreaNamespace {
    /// Keys are area codes (`E06000001`).
    Code,
    /// Keys are area names (`London`).
    Name,
}

/// Lookup from area key to total population.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationTable {
    namespace: AreaNamespace,
    entries: BTreeMap<String, u64>,
}

impl PopulationTable {
    /// Creates an empty table in the given key space.
    #[must_use]
    pub const fn new(namespace: AreaNamespace) -> Self {
        Self {
            namespace,
            entries: BTreeMap::new(),
        }
    }

    /// Inserts (or replaces) the population for `key`.
    pub fn insert(&mut self, key: impl Into<String>, population: u64) {
        self.entries.insert(key.into(), population);
    }

    /// Looks up the population for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<u64> {
        self.entries.get(key).copied()
    }

    /// Key space the table is indexed by.
    #[must_use]
    pub const fn namespace(&self) -> AreaNamespace {
        self.namespace
    }

    /// Number of areas in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateWindow {
    /// First day (inclusive).
    pub start: NaiveDate,
    /// Last day (inclusive).
    pub end: NaiveDate,
}

impl DateWindow {
    /// Whether `date` falls inside the window.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of calendar days covered, counting both ends.
    #[must_use]
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Column label for this window, e.g.
    /// `newCasesBySpecimenDate-01032021-to-07032021`.
    #[must_use]
    pub fn label(&self, metric: &str) -> String {
        format!(
            "{metric}-{}-to-{}",
            self.start.format("%d%m%Y"),
            self.end.format("%d%m%Y")
        )
    }
}

/// The two adjacent 7-day windows compared by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonWindow {
    /// Last day of the current window.
    pub upper_bound: NaiveDate,
    /// `[upper_bound - 13, upper_bound - 7]`.
    pub prior: DateWindow,
    /// `[upper_bound - 6, upper_bound]`.
    pub current: DateWindow,
}

impl ComparisonWindow {
    /// Builds both windows from the last day of the current window.
    ///
    /// # Panics
    ///
    /// Panics if `upper_bound` is within 13 days of [`NaiveDate::MIN`].
    #[must_use]
    pub fn ending_on(upper_bound: NaiveDate) -> Self {
        let current_start = upper_bound - Days::new(WINDOW_DAYS - 1);
        let prior_end = upper_bound - Days::new(WINDOW_DAYS);
        let prior_start = upper_bound - Days::new(2 * WINDOW_DAYS - 1);

        Self {
            upper_bound,
            prior: DateWindow {
                start: prior_start,
                end: prior_end,
            },
            current: DateWindow {
                start: current_start,
                end: upper_bound,
            },
        }
    }

    /// Column labels for both windows.
    #[must_use]
    pub fn labels(&self, metric: &str) -> WindowLabels {
        WindowLabels {
            prior: self.prior.label(metric),
            current: self.current.label(metric),
        }
    }
}

/// Human-readable identifiers for the two window columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLabels {
    /// Label of the prior (earlier) window.
    pub prior: String,
    /// Label of the current (later) window.
    pub current: String,
}

/// Per-100,000 population rate of an area's current aggregate.
///
/// Serializes as the rounded rate, or `null` when no rate was computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PopulationRate {
    /// The metric type never carries a rate; the column is omitted.
    NotApplicable,
    /// The metric is per-capita but the area had no population entry.
    Unknown,
    /// Current aggregate per 100,000 population.
    Known(f64),
}

impl PopulationRate {
    /// The rate, if one was computed.
    #[must_use]
    pub const fn value(self) -> Option<f64> {
        match self {
            Self::Known(rate) => Some(rate),
            Self::NotApplicable | Self::Unknown => None,
        }
    }

    /// Whether the column is omitted for this metric type.
    #[must_use]
    pub const fn is_not_applicable(&self) -> bool {
        matches!(self, Self::NotApplicable)
    }
}

impl Serialize for PopulationRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Known(rate) => serialize_surfaced(rate, serializer),
            Self::NotApplicable | Self::Unknown => serializer.serialize_none(),
        }
    }
}

/// Comparison of one area's two window aggregates for one metric.
///
/// Values are stored unrounded and only rounded on serialization, so
/// threshold comparisons always see the exact figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaResult {
    /// Area name as published in the series.
    pub area_name: String,
    /// Area code resolved from the series.
    pub area_code: String,
    /// Aggregate over the prior window.
    #[serde(serialize_with = "serialize_surfaced")]
    pub prior: f64,
    /// Aggregate over the current window.
    #[serde(serialize_with = "serialize_surfaced")]
    pub current: f64,
    /// Percentage change from prior to current. `+inf` for any rise from a
    /// zero baseline.
    #[serde(serialize_with = "serialize_surfaced")]
    pub percentage_change: f64,
    /// Per-100,000 rate of the current aggregate.
    #[serde(
        rename = "lastSevenDaysPer100000",
        skip_serializing_if = "PopulationRate::is_not_applicable"
    )]
    pub rate: PopulationRate,
}

/// Alert thresholds applied by the threshold filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum week-over-week change (percent, exclusive).
    pub percentage_change: f64,
    /// Minimum current-window cases per 100,000 (exclusive), case-count
    /// metrics only.
    pub cases_per_100000: f64,
    /// Minimum current-window aggregate (exclusive), hospital metrics only.
    pub hospital_current_value: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            percentage_change: 100.0,
            cases_per_100000: 100.0,
            hospital_current_value: 0.0,
        }
    }
}

/// One configured (area type, metric, aggregation) evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricCheck {
    /// API area type (e.g. `ltla`, `nhsRegion`).
    pub area_type: String,
    /// API metric name (e.g. `newCasesBySpecimenDate`).
    pub metric: String,
    /// Window aggregation operator.
    pub aggregation: Aggregation,
    /// Metric type tag.
    pub kind: MetricKind,
    /// Population dataset for per-capita metrics.
    #[serde(default)]
    pub population: Option<PopulationSourceKind>,
}

impl std::fmt::Display for MetricCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} ({})", self.area_type, self.metric, self.aggregation)
    }
}

/// Output of evaluating one [`MetricCheck`] against its series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricReport {
    /// The evaluated check.
    pub check: MetricCheck,
    /// Comparison windows used.
    pub window: ComparisonWindow,
    /// Column labels for the two windows.
    pub labels: WindowLabels,
    /// Every comparable area, in series order.
    pub rows: Vec<AreaResult>,
    /// Areas that exceeded the thresholds, most-changed first.
    pub exceeding: Vec<AreaResult>,
    /// Areas skipped because a window had no data.
    pub excluded: Vec<String>,
}

/// Rounds to one decimal place for display. Non-finite values pass through.
#[must_use]
pub fn round_one_decimal(value: f64) -> f64 {
    if value.is_finite() {
        (value * 10.0).round() / 10.0
    } else {
        value
    }
}

/// Writes a value rounded to one decimal place. JSON has no infinity, so
/// non-finite values are written as the strings `inf`, `-inf` and `NaN`.
#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_surfaced<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_nan() {
        serializer.serialize_str("NaN")
    } else if value.is_infinite() {
        serializer.serialize_str(if value.is_sign_positive() { "inf" } else { "-inf" })
    } else {
        serializer.serialize_f64(round_one_decimal(*value))
    }
}
