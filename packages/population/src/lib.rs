#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Population tables for per-capita normalization.
//!
//! Two independently shaped datasets feed the engine: the ONS mid-year
//! estimates (keyed by local authority code) and the NHS England regional
//! estimates (keyed by region name). Both are downloaded fresh on every
//! run and parsed according to a [`workbook::WorkbookLayout`].

pub mod workbook;

use std::collections::BTreeMap;

use async_trait::async_trait;
use data_alerts_metrics_models::{PopulationSourceKind, PopulationTable};

use crate::workbook::WorkbookLayout;

/// Errors that can occur while loading a population table.
#[derive(Debug, thiserror::Error)]
pub enum PopulationError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The workbook or worksheet could not be read.
    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    /// A layout column letter is not valid.
    #[error("Invalid spreadsheet column '{column}'")]
    InvalidColumn {
        /// The offending column name.
        column: String,
    },

    /// The layout matched no rows.
    #[error("No population rows found in sheet '{sheet}'")]
    EmptyTable {
        /// Worksheet name.
        sheet: String,
    },

    /// No layout is configured for the requested dataset.
    #[error("No population source configured for {kind}")]
    UnknownSource {
        /// The requested dataset.
        kind: PopulationSourceKind,
    },
}

/// Something that can produce population tables.
#[async_trait]
pub trait PopulationSource: Send + Sync {
    /// Fetches the population table for one dataset.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError`] if the dataset cannot be fetched or
    /// parsed.
    async fn fetch_population_table(
        &self,
        kind: PopulationSourceKind,
    ) -> Result<PopulationTable, PopulationError>;
}

/// Downloads population workbooks over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPopulationSource {
    client: reqwest::Client,
    layouts: BTreeMap<PopulationSourceKind, WorkbookLayout>,
}

impl HttpPopulationSource {
    /// Creates a source for the configured workbook layouts.
    #[must_use]
    pub const fn new(
        client: reqwest::Client,
        layouts: BTreeMap<PopulationSourceKind, WorkbookLayout>,
    ) -> Self {
        Self { client, layouts }
    }
}

#[async_trait]
impl PopulationSource for HttpPopulationSource {
    async fn fetch_population_table(
        &self,
        kind: PopulationSourceKind,
    ) -> Result<PopulationTable, PopulationError> {
        let layout = self
            .layouts
            .get(&kind)
            .ok_or(PopulationError::UnknownSource { kind })?;

        log::info!("GET {} ({kind} populations)...", layout.url);
        let bytes = self
            .client
            .get(&layout.url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        log::debug!("Downloaded {} bytes from {}", bytes.len(), layout.url);

        let table = workbook::parse_workbook(bytes.to_vec(), layout)?;
        log::info!("Loaded {} {kind} population entries", table.len());

        Ok(table)
    }
}
