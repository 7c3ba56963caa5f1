//! HTML alert bodies.

use data_alerts_metrics_models::{AreaResult, MetricReport, round_one_decimal};

/// Subject of the new-definitions alert.
pub const NEW_METRICS_SUBJECT: &str = "[UK Coronavirus Data Alert] New metrics available";

/// Subject of the threshold alert.
pub const THRESHOLD_SUBJECT: &str = "UK Coronavirus Data Alert";

/// A rendered alert, ready for an [`crate::AlertSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    /// Email subject line.
    pub subject: String,
    /// HTML body.
    pub body_html: String,
}

/// Escapes text for inclusion in HTML element content or attributes.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Formats a value rounded to one decimal place. Infinities render as
/// `inf` / `-inf`.
#[must_use]
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        let text = if value.is_sign_positive() { "inf" } else { "-inf" };
        text.to_string()
    } else {
        format!("{:.1}", round_one_decimal(value))
    }
}

/// Alert listing newly published metric identifiers, or `None` if there
/// are none.
#[must_use]
pub fn new_definitions_alert(added: &[String], dashboard_url: &str) -> Option<Alert> {
    if added.is_empty() {
        return None;
    }

    let mut sorted: Vec<&String> = added.iter().collect();
    sorted.sort();

    let items: String = sorted
        .iter()
        .map(|identifier| format!("<li>{}</li>", escape_html(identifier)))
        .collect();

    let body_html = format!(
        "<p>\n  New metrics available:\n  <ul>\n    {items}\n  </ul>\n</p>\n<p>\n  Check {}\n</p>\n",
        escape_html(dashboard_url)
    );

    Some(Alert {
        subject: NEW_METRICS_SUBJECT.to_string(),
        body_html,
    })
}

/// Alert with one table per metric that has exceeding areas, or `None` if
/// no metric exceeded its thresholds.
#[must_use]
pub fn threshold_alert(
    reports: &[MetricReport],
    percentage_change_threshold: f64,
    dashboard_url: &str,
) -> Option<Alert> {
    let tables: Vec<String> = reports
        .iter()
        .filter(|report| !report.exceeding.is_empty())
        .map(|report| format!("<p>{}</p>", metric_table(report)))
        .collect();

    if tables.is_empty() {
        return None;
    }

    let body_html = format!(
        "<p>Some metrics have exceeded {percentage_change_threshold}% change week on week:</p>\n{}\n<p>Check {}</p>\n",
        tables.join("\n"),
        escape_html(dashboard_url)
    );

    Some(Alert {
        subject: THRESHOLD_SUBJECT.to_string(),
        body_html,
    })
}

/// HTML table of a report's exceeding areas.
#[must_use]
pub fn metric_table(report: &MetricReport) -> String {
    let with_rate = report.check.kind.is_per_capita();

    let mut headers = vec![
        "areaName".to_string(),
        escape_html(&report.labels.prior),
        escape_html(&report.labels.current),
        "percentageChange".to_string(),
    ];
    if with_rate {
        headers.push("lastSevenDaysPer100000".to_string());
    }

    let mut html = format!(
        "<table border=\"1\" class=\"dataframe\">\n<caption>{}</caption>\n<thead>\n<tr>",
        escape_html(&report.check.to_string())
    );
    for header in &headers {
        html.push_str(&format!("<th>{header}</th>"));
    }
    html.push_str("</tr>\n</thead>\n<tbody>\n");

    for row in &report.exceeding {
        html.push_str("<tr>");
        for cell in row_cells(row, with_rate) {
            html.push_str(&format!("<td>{cell}</td>"));
        }
        html.push_str("</tr>\n");
    }

    html.push_str("</tbody>\n</table>");
    html
}

fn row_cells(row: &AreaResult, with_rate: bool) -> Vec<String> {
    let mut cells = vec![
        escape_html(&row.area_name),
        format_value(row.prior),
        format_value(row.current),
        format_value(row.percentage_change),
    ];
    if with_rate {
        cells.push(row.rate.value().map_or_else(|| "NaN".to_string(), format_value));
    }
    cells
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use data_alerts_metrics_models::{
        Aggregation, ComparisonWindow, MetricCheck, MetricKind, PopulationRate,
        PopulationSourceKind,
    };

    use super::*;

    fn report(kind: MetricKind, exceeding: Vec<AreaResult>) -> MetricReport {
        let window = ComparisonWindow::ending_on(NaiveDate::from_ymd_opt(2021, 3, 14).unwrap());
        let metric = match kind {
            MetricKind::CaseCount => "newCasesBySpecimenDate",
            MetricKind::HospitalActivity => "newAdmissions",
        };
        MetricReport {
            check: MetricCheck {
                area_type: "ltla".to_string(),
                metric: metric.to_string(),
                aggregation: Aggregation::Sum,
                kind,
                population: kind
                    .is_per_capita()
                    .then_some(PopulationSourceKind::LocalAuthority),
            },
            labels: window.labels(metric),
            window,
            rows: exceeding.clone(),
            exceeding,
            excluded: Vec::new(),
        }
    }

    fn row(name: &str, prior: f64, current: f64, change: f64, rate: PopulationRate) -> AreaResult {
        AreaResult {
            area_name: name.to_string(),
            area_code: "E0".to_string(),
            prior,
            current,
            percentage_change: change,
            rate,
        }
    }

    #[test]
    fn formats_values_to_one_decimal() {
        assert_eq!(format_value(150.0), "150.0");
        assert_eq!(format_value(33.333_333), "33.3");
        assert_eq!(format_value(2.25), "2.3");
        assert_eq!(format_value(f64::INFINITY), "inf");
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html("Brighton & Hove <x>"),
            "Brighton &amp; Hove &lt;x&gt;"
        );
    }

    #[test]
    fn new_definitions_are_listed_sorted() {
        let alert = new_definitions_alert(
            &["C".to_string(), "B".to_string()],
            "https://coronavirus.data.gov.uk/",
        )
        .unwrap();
        assert_eq!(alert.subject, NEW_METRICS_SUBJECT);
        let b = alert.body_html.find("<li>B</li>").unwrap();
        let c = alert.body_html.find("<li>C</li>").unwrap();
        assert!(b < c);
        assert!(alert.body_html.contains("Check https://coronavirus.data.gov.uk/"));
    }

    #[test]
    fn no_new_definitions_means_no_alert() {
        assert!(new_definitions_alert(&[], "https://coronavirus.data.gov.uk/").is_none());
    }

    #[test]
    fn threshold_alert_skips_quiet_metrics() {
        let quiet = report(MetricKind::HospitalActivity, Vec::new());
        assert!(threshold_alert(&[quiet.clone()], 100.0, "https://x/").is_none());

        let busy = report(
            MetricKind::CaseCount,
            vec![row("Brighton & Hove", 10.0, 25.0, 150.0, PopulationRate::Known(250.04))],
        );
        let alert = threshold_alert(&[quiet, busy], 100.0, "https://x/").unwrap();

        assert_eq!(alert.subject, THRESHOLD_SUBJECT);
        assert!(
            alert
                .body_html
                .starts_with("<p>Some metrics have exceeded 100% change week on week:</p>")
        );
        assert_eq!(alert.body_html.matches("<table").count(), 1);
        assert!(alert.body_html.contains("<td>Brighton &amp; Hove</td>"));
        assert!(alert.body_html.contains("<td>250.0</td>"));
        assert!(alert.body_html.contains("<th>lastSevenDaysPer100000</th>"));
        assert!(
            alert
                .body_html
                .contains("<th>newCasesBySpecimenDate-08032021-to-14032021</th>")
        );
    }

    #[test]
    fn hospital_table_has_no_rate_column() {
        let busy = report(
            MetricKind::HospitalActivity,
            vec![row("London", 0.0, 5.0, f64::INFINITY, PopulationRate::NotApplicable)],
        );
        let table = metric_table(&busy);
        assert!(!table.contains("lastSevenDaysPer100000"));
        assert!(table.contains("<td>inf</td>"));
    }
}
