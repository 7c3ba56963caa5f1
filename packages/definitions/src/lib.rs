#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Published metric definitions and the rolling baseline they are diffed
//! against.
//!
//! The dashboard publishes a JSON object of metric identifier -> metadata.
//! Each run compares it with the snapshot persisted by the previous run
//! (see [`detector::detect_new_definitions`]) and then overwrites that
//! snapshot, whatever the outcome.

pub mod detector;
pub mod file;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Errors that can occur while reading or writing a baseline.
#[derive(Debug, thiserror::Error)]
pub enum BaselineError {
    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot is not a JSON object.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The storage backend failed.
    #[error("Baseline storage error at {location}: {source}")]
    Backend {
        /// Where the baseline lives (path, URL, `s3://` location).
        location: String,
        /// Underlying backend error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Snapshot of published metric definitions, keyed by identifier.
///
/// Metadata values are opaque and kept verbatim so that a persisted
/// snapshot reads back equal to what was written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricDefinitions(BTreeMap<String, serde_json::Value>);

impl MetricDefinitions {
    /// Creates an empty snapshot.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Parses a snapshot from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if `bytes` is not a JSON object.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Serializes the snapshot as a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if serialization fails.
    pub fn to_json_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    /// Adds or replaces one definition.
    pub fn insert(&mut self, identifier: impl Into<String>, metadata: serde_json::Value) {
        self.0.insert(identifier.into(), metadata);
    }

    /// Whether `identifier` is defined.
    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        self.0.contains_key(identifier)
    }

    /// Identifiers in sorted order.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Identifiers present here but not in `previous`, sorted.
    #[must_use]
    pub fn added_since(&self, previous: &Self) -> Vec<String> {
        self.identifiers()
            .filter(|identifier| !previous.contains(identifier))
            .map(str::to_string)
            .collect()
    }

    /// Number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the snapshot has no definitions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, serde_json::Value)> for MetricDefinitions {
    fn from_iter<T: IntoIterator<Item = (String, serde_json::Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Persistent home of the definitions baseline.
#[async_trait]
pub trait BaselineStore: Send + Sync {
    /// Human-readable location, for log messages.
    fn location(&self) -> String;

    /// Reads the persisted snapshot, or `None` if nothing was persisted yet.
    ///
    /// # Errors
    ///
    /// Returns [`BaselineError`] if the snapshot exists but cannot be read
    /// or parsed.
    async fn read_baseline(&self) -> Result<Option<MetricDefinitions>, BaselineError>;

    /// Replaces the persisted snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`BaselineError`] if the snapshot cannot be written.
    async fn write_baseline(&self, definitions: &MetricDefinitions) -> Result<(), BaselineError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn definitions(ids: &[&str]) -> MetricDefinitions {
        ids.iter()
            .map(|id| ((*id).to_string(), json!({ "category": "cases" })))
            .collect()
    }

    #[test]
    fn added_is_sorted_set_difference() {
        let current = definitions(&["C", "A", "B"]);
        let previous = definitions(&["A", "Z"]);
        assert_eq!(current.added_since(&previous), vec!["B", "C"]);
    }

    #[test]
    fn nothing_added_against_superset() {
        let current = definitions(&["A"]);
        let previous = definitions(&["A", "B"]);
        assert!(current.added_since(&previous).is_empty());
    }

    #[test]
    fn json_round_trip_preserves_metadata() {
        let mut current = MetricDefinitions::new();
        current.insert(
            "newAdmissions",
            json!({ "name": "Patients admitted", "tags": ["healthcare"], "deprecated": null }),
        );
        current.insert("newCasesBySpecimenDate", json!("cases"));

        let bytes = current.to_json_vec().unwrap();
        let restored = MetricDefinitions::from_json_slice(&bytes).unwrap();
        assert_eq!(restored, current);
    }

    #[test]
    fn non_object_json_is_rejected() {
        assert!(MetricDefinitions::from_json_slice(b"[\"A\"]").is_err());
    }
}
