//! Baseline persisted as a JSON file on the local filesystem.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::{BaselineError, BaselineStore, MetricDefinitions};

/// Keeps the baseline in a local JSON file.
#[derive(Debug, Clone)]
pub struct FileBaselineStore {
    path: PathBuf,
}

impl FileBaselineStore {
    /// Creates a store backed by `path`. The file need not exist yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BaselineStore for FileBaselineStore {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    async fn read_baseline(&self) -> Result<Option<MetricDefinitions>, BaselineError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let definitions = MetricDefinitions::from_json_slice(&bytes)?;
        log::debug!(
            "Read {} definitions from {}",
            definitions.len(),
            self.path.display()
        );
        Ok(Some(definitions))
    }

    async fn write_baseline(&self, definitions: &MetricDefinitions) -> Result<(), BaselineError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&self.path, definitions.to_json_vec()?).await?;
        log::info!(
            "Wrote {} definitions to {}",
            definitions.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("data_alerts_file_store_{}", std::process::id()))
            .join(name)
    }

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let store = FileBaselineStore::new(temp_path("missing.json"));
        assert!(store.read_baseline().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn write_then_read_is_equal() {
        let path = temp_path("round_trip.json");
        let store = FileBaselineStore::new(&path);

        let mut definitions = MetricDefinitions::new();
        definitions.insert("hospitalCases", json!({ "unit": "people", "weight": 1.5 }));
        definitions.insert("newAdmissions", json!(null));

        store.write_baseline(&definitions).await.unwrap();
        let restored = store.read_baseline().await.unwrap().unwrap();
        assert_eq!(restored, definitions);

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let path = temp_path("corrupt.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not json").unwrap();

        let store = FileBaselineStore::new(&path);
        let err = store.read_baseline().await.unwrap_err();
        assert!(matches!(err, BaselineError::Json(_)));

        let _ = std::fs::remove_file(path);
    }
}
