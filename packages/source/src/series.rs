//! CSV series parsing.
//!
//! The dashboard API returns one row per area per day with the columns
//! `areaCode, areaName, areaType, date, <metric>`. Column order is not
//! relied upon; columns are located by header name.

use chrono::NaiveDate;
use data_alerts_metrics_models::TimeSeriesPoint;

use crate::SourceError;

const AREA_CODE: &str = "areaCode";
const AREA_NAME: &str = "areaName";
const DATE: &str = "date";

/// Parses a series CSV body for `metric`.
///
/// Rows whose metric cell is blank are skipped, so a missing value stays
/// absent rather than becoming zero.
///
/// # Errors
///
/// Returns [`SourceError::MissingColumn`] if a required header is absent,
/// [`SourceError::Csv`] for malformed CSV and [`SourceError::Parse`] for an
/// unparseable date or value.
pub fn parse_series_csv(body: &[u8], metric: &str) -> Result<Vec<TimeSeriesPoint>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(body);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_owned())
        .collect();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| SourceError::MissingColumn {
                column: name.to_string(),
            })
    };

    let code_index = column(AREA_CODE)?;
    let name_index = column(AREA_NAME)?;
    let date_index = column(DATE)?;
    let value_index = column(metric)?;

    let mut points = Vec::new();
    let mut skipped = 0usize;

    for result in reader.records() {
        let record = result?;
        let cell = |index: usize| record.get(index).unwrap_or("").trim();

        let raw_value = cell(value_index);
        if raw_value.is_empty() {
            skipped += 1;
            continue;
        }

        let value: f64 = raw_value.parse().map_err(|_| SourceError::Parse {
            message: format!("invalid {metric} value '{raw_value}'"),
        })?;

        let raw_date = cell(date_index);
        let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d").map_err(|e| {
            SourceError::Parse {
                message: format!("invalid date '{raw_date}': {e}"),
            }
        })?;

        points.push(TimeSeriesPoint {
            area_name: cell(name_index).to_string(),
            area_code: cell(code_index).to_string(),
            date,
            value,
        });
    }

    log::debug!(
        "Parsed {} {metric} rows ({skipped} without a value)",
        points.len()
    );

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "\
areaCode,areaName,areaType,date,newAdmissions
E40000003,London,nhsRegion,2021-03-14,120
E40000003,London,nhsRegion,2021-03-13,
E40000010,North West,nhsRegion,2021-03-14,85.5
";

    #[test]
    fn parses_rows_by_header_name() {
        let points = parse_series_csv(BODY.as_bytes(), "newAdmissions").unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].area_name, "London");
        assert_eq!(points[0].area_code, "E40000003");
        assert_eq!(points[0].date, NaiveDate::from_ymd_opt(2021, 3, 14).unwrap());
        assert!((points[1].value - 85.5).abs() < f64::EPSILON);
    }

    #[test]
    fn blank_values_are_absent_not_zero() {
        let points = parse_series_csv(BODY.as_bytes(), "newAdmissions").unwrap();
        let london_rows = points
            .iter()
            .filter(|p| p.area_name == "London")
            .count();
        assert_eq!(london_rows, 1);
    }

    #[test]
    fn missing_metric_column_is_reported() {
        let err = parse_series_csv(BODY.as_bytes(), "hospitalCases").unwrap_err();
        assert!(matches!(
            err,
            SourceError::MissingColumn { ref column } if column == "hospitalCases"
        ));
    }

    #[test]
    fn bad_date_is_a_parse_error() {
        let body = "areaCode,areaName,date,newAdmissions\nE1,London,14/03/2021,3\n";
        let err = parse_series_csv(body.as_bytes(), "newAdmissions").unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }));
    }
}
