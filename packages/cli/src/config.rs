//! Run configuration.
//!
//! Static settings (thresholds, metric checks, population workbooks, API
//! endpoints) come from a TOML document, by default the `alerts.toml`
//! embedded at compile time. Deployment settings (recipients, verification
//! mode, SMTP relay, baseline location) come from the environment and are
//! read once at startup.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `NOTIFY_EMAIL_ADDRESSES` | none | Comma-separated recipients; unset means log-only |
//! | `DATA_VERIFICATION_MODE` | `unverified` | `verified` or `unverified` |
//! | `SMTP_HOST` | `email-smtp.eu-west-1.amazonaws.com` | SMTP relay |
//! | `SMTP_PORT` | `587` | SMTP port |
//! | `SMTP_USERNAME` / `SMTP_PASSWORD` | none | SMTP credentials |
//! | `NOTIFY_FROM_ADDRESS` | `investigations.and.reporting@theguardian.com` | Sender |
//! | `BASELINE_BUCKET` | `investigations-data-dev` | Baseline bucket |
//! | `BASELINE_KEY` | `uk-coronavirus-data-alerts/metrics.json` | Baseline object key |
//! | `BASELINE_REGION` | `eu-west-1` | Baseline bucket region |
//! | `BASELINE_ENDPOINT_URL` | none | Custom S3-compatible endpoint |

use std::collections::BTreeMap;
use std::path::Path;

use data_alerts_metrics_models::{
    MetricCheck, MetricKind, PopulationSourceKind, Thresholds, VerificationMode,
};
use data_alerts_notify::{DEFAULT_FROM_ADDRESS, DEFAULT_SMTP_PORT, SmtpSettings};
use data_alerts_population::workbook::WorkbookLayout;
use data_alerts_store::S3Location;
use serde::Deserialize;

/// The configuration baked into the binary.
pub const EMBEDDED_CONFIG: &str = include_str!("../alerts.toml");

/// Default SMTP relay (the SES SMTP interface in the baseline's region).
pub const DEFAULT_SMTP_HOST: &str = "email-smtp.eu-west-1.amazonaws.com";

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration is not valid TOML for [`AlertConfig`].
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A threshold is negative or not finite.
    #[error("Invalid threshold {name} = {value}: must be finite and non-negative")]
    InvalidThreshold {
        /// Threshold field name.
        name: &'static str,
        /// Rejected value.
        value: f64,
    },

    /// No metric checks are configured.
    #[error("No metrics configured")]
    NoMetrics,

    /// A case-count metric has no usable population source.
    #[error("Metric {metric} is a case count but population source {kind:?} is not configured")]
    MissingPopulation {
        /// The offending check.
        metric: String,
        /// The population source it names, if any.
        kind: Option<PopulationSourceKind>,
    },

    /// A hospital metric names a population source.
    #[error("Metric {metric} is hospital activity and must not name a population source")]
    UnexpectedPopulation {
        /// The offending check.
        metric: String,
    },

    /// An environment variable has an invalid value.
    #[error("Invalid value for {name}: '{value}'")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// Rejected value.
        value: String,
    },
}

/// Dashboard API endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiConfig {
    /// Series endpoint; `areaType`, `metric` and `format` are appended.
    pub series_url: String,
    /// Metric definitions manifest.
    pub definitions_url: String,
    /// Link included at the bottom of alert emails.
    pub dashboard_url: String,
}

/// Population workbook layouts, one per dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PopulationConfig {
    /// ONS local authority estimates.
    #[serde(default)]
    pub local_authority: Option<WorkbookLayout>,
    /// NHS England region estimates.
    #[serde(default)]
    pub nhs_region: Option<WorkbookLayout>,
}

impl PopulationConfig {
    /// Layout for one dataset, if configured.
    #[must_use]
    pub const fn get(&self, kind: PopulationSourceKind) -> Option<&WorkbookLayout> {
        match kind {
            PopulationSourceKind::LocalAuthority => self.local_authority.as_ref(),
            PopulationSourceKind::NhsRegion => self.nhs_region.as_ref(),
        }
    }

    /// Every configured layout, keyed by dataset.
    #[must_use]
    pub fn layouts(&self) -> BTreeMap<PopulationSourceKind, WorkbookLayout> {
        [PopulationSourceKind::LocalAuthority, PopulationSourceKind::NhsRegion]
            .into_iter()
            .filter_map(|kind| self.get(kind).map(|layout| (kind, layout.clone())))
            .collect()
    }
}

/// Static run configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AlertConfig {
    /// Alert thresholds.
    #[serde(default)]
    pub thresholds: Thresholds,
    /// Metric checks, evaluated in order.
    pub metrics: Vec<MetricCheck>,
    /// Population workbooks.
    #[serde(default)]
    pub population: PopulationConfig,
    /// API endpoints.
    pub api: ApiConfig,
}

impl AlertConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the document does not parse or fails
    /// validation.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::de::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// The embedded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the embedded document is invalid.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::parse(EMBEDDED_CONFIG)
    }

    /// Loads `path`, or the embedded configuration when `path` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed or
    /// validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                log::info!("Loading configuration from {}", path.display());
                Self::parse(&std::fs::read_to_string(path)?)
            }
            None => Self::embedded(),
        }
    }

    /// Checks thresholds and metric/population consistency.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let Thresholds {
            percentage_change,
            cases_per_100000,
            hospital_current_value,
        } = self.thresholds;

        for (name, value) in [
            ("percentage_change", percentage_change),
            ("cases_per_100000", cases_per_100000),
            ("hospital_current_value", hospital_current_value),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }

        if self.metrics.is_empty() {
            return Err(ConfigError::NoMetrics);
        }

        for check in &self.metrics {
            match check.kind {
                MetricKind::CaseCount => {
                    if check.population.and_then(|kind| self.population.get(kind)).is_none() {
                        return Err(ConfigError::MissingPopulation {
                            metric: check.to_string(),
                            kind: check.population,
                        });
                    }
                }
                MetricKind::HospitalActivity => {
                    if check.population.is_some() {
                        return Err(ConfigError::UnexpectedPopulation {
                            metric: check.to_string(),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

/// Deployment settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    /// Alert recipients; empty means log-only dispatch.
    pub recipients: Vec<String>,
    /// Window anchoring mode.
    pub verification_mode: VerificationMode,
    /// SMTP relay.
    pub smtp: SmtpSettings,
    /// Sender address.
    pub from_address: String,
    /// Baseline object location.
    pub baseline: S3Location,
}

impl Environment {
    /// Reads the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] for an unparseable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads settings through `lookup`. Blank values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] for an unparseable value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let recipients = get("NOTIFY_EMAIL_ADDRESSES")
            .map(|list| data_alerts_notify::parse_recipients(&list))
            .unwrap_or_default();

        let verification_mode = match get("DATA_VERIFICATION_MODE") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "DATA_VERIFICATION_MODE",
                value,
            })?,
            None => VerificationMode::default(),
        };

        let port = match get("SMTP_PORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "SMTP_PORT",
                value,
            })?,
            None => DEFAULT_SMTP_PORT,
        };

        let smtp = SmtpSettings {
            host: get("SMTP_HOST").unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
            port,
            credentials: get("SMTP_USERNAME").zip(get("SMTP_PASSWORD")),
        };

        let defaults = S3Location::default();
        let baseline = S3Location {
            bucket: get("BASELINE_BUCKET").unwrap_or(defaults.bucket),
            key: get("BASELINE_KEY").unwrap_or(defaults.key),
            region: get("BASELINE_REGION").unwrap_or(defaults.region),
            endpoint_url: get("BASELINE_ENDPOINT_URL"),
        };

        Ok(Self {
            recipients,
            verification_mode,
            smtp,
            from_address: get("NOTIFY_FROM_ADDRESS")
                .unwrap_or_else(|| DEFAULT_FROM_ADDRESS.to_string()),
            baseline,
        })
    }
}
