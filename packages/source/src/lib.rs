#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Metric series and definition fetches.
//!
//! [`MetricSource`] is the seam between the comparison engine and the
//! public dashboard API; [`HttpMetricSource`] is its HTTP implementation.

pub mod series;

use async_trait::async_trait;
use data_alerts_definitions::MetricDefinitions;
use data_alerts_metrics_models::TimeSeriesPoint;

/// Errors that can occur while fetching from the dashboard API.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// CSV parsing failed.
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required CSV column is missing.
    #[error("Missing column '{column}' in series response")]
    MissingColumn {
        /// Header name that was expected.
        column: String,
    },

    /// A cell could not be parsed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of what went wrong.
        message: String,
    },
}

/// Source of metric series and published metric definitions.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Fetches every area's daily series for one metric.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the series cannot be fetched or parsed.
    async fn fetch_time_series(
        &self,
        area_type: &str,
        metric: &str,
    ) -> Result<Vec<TimeSeriesPoint>, SourceError>;

    /// Fetches the currently published metric definitions.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the definitions cannot be fetched or
    /// parsed.
    async fn fetch_current_definitions(&self) -> Result<MetricDefinitions, SourceError>;
}

/// Dashboard API over HTTP.
#[derive(Debug, Clone)]
pub struct HttpMetricSource {
    client: reqwest::Client,
    series_url: String,
    definitions_url: String,
}

impl HttpMetricSource {
    /// Creates a source for the given series endpoint and definitions
    /// manifest URL.
    #[must_use]
    pub fn new(client: reqwest::Client, series_url: &str, definitions_url: &str) -> Self {
        Self {
            client,
            series_url: series_url.to_owned(),
            definitions_url: definitions_url.to_owned(),
        }
    }

    /// Series request URL for one metric.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Parse`] if the configured endpoint is not a
    /// valid URL.
    pub fn series_request_url(
        &self,
        area_type: &str,
        metric: &str,
    ) -> Result<reqwest::Url, SourceError> {
        reqwest::Url::parse_with_params(
            &self.series_url,
            &[("areaType", area_type), ("metric", metric), ("format", "csv")],
        )
        .map_err(|e| SourceError::Parse {
            message: format!("invalid series URL '{}': {e}", self.series_url),
        })
    }
}

#[async_trait]
impl MetricSource for HttpMetricSource {
    async fn fetch_time_series(
        &self,
        area_type: &str,
        metric: &str,
    ) -> Result<Vec<TimeSeriesPoint>, SourceError> {
        let url = self.series_request_url(area_type, metric)?;

        log::info!("GET {url}...");
        let bytes = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        log::debug!("Downloaded {} bytes from {url}", bytes.len());

        let points = series::parse_series_csv(&bytes, metric)?;
        log::info!("Fetched {} {area_type}/{metric} rows", points.len());

        Ok(points)
    }

    async fn fetch_current_definitions(&self) -> Result<MetricDefinitions, SourceError> {
        log::info!("GET {}...", self.definitions_url);
        let bytes = self
            .client
            .get(&self.definitions_url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        log::debug!(
            "Downloaded {} bytes from {}",
            bytes.len(),
            self.definitions_url
        );

        let definitions = MetricDefinitions::from_json_slice(&bytes)?;
        log::info!("Fetched {} metric definitions", definitions.len());

        Ok(definitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_series_query() {
        let source = HttpMetricSource::new(
            reqwest::Client::new(),
            "https://api.coronavirus.data.gov.uk/v2/data",
            "https://coronavirus.data.gov.uk/public/assets/dispatch/api_variables.json",
        );
        let url = source
            .series_request_url("nhsRegion", "newAdmissions")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.coronavirus.data.gov.uk/v2/data?areaType=nhsRegion&metric=newAdmissions&format=csv"
        );
    }

    #[test]
    fn invalid_series_url_is_reported() {
        let source = HttpMetricSource::new(reqwest::Client::new(), "not a url", "");
        assert!(matches!(
            source.series_request_url("ltla", "newCasesBySpecimenDate"),
            Err(SourceError::Parse { .. })
        ));
    }
}
