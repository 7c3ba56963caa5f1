//! New-definition detection against the rolling baseline.

use crate::{BaselineError, BaselineStore, MetricDefinitions};

/// Outcome of one definitions diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionsDiff {
    /// Identifiers not present in the previous baseline, sorted.
    pub added: Vec<String>,
    /// Size of the previous baseline (zero when it was absent or unreadable).
    pub previous_count: usize,
    /// Size of the current snapshot.
    pub current_count: usize,
}

impl DefinitionsDiff {
    /// Whether any new definitions were found.
    #[must_use]
    pub fn has_additions(&self) -> bool {
        !self.added.is_empty()
    }
}

/// Reads the previous baseline, treating absence or failure as empty.
pub async fn read_previous(store: &dyn BaselineStore) -> MetricDefinitions {
    match store.read_baseline().await {
        Ok(Some(previous)) => previous,
        Ok(None) => {
            log::warn!(
                "No previous metrics found at {}, continuing with empty previous metrics set",
                store.location()
            );
            MetricDefinitions::new()
        }
        Err(e) => {
            log::warn!(
                "Failed to read previous metrics from {}: {e}, continuing with empty previous metrics set",
                store.location()
            );
            MetricDefinitions::new()
        }
    }
}

/// Diffs `current` against the persisted baseline, then persists `current`
/// as the new baseline.
///
/// The write happens whether or not anything was added.
///
/// # Errors
///
/// Returns [`BaselineError`] if the new baseline cannot be written. Read
/// failures are logged and never returned.
pub async fn detect_new_definitions(
    store: &dyn BaselineStore,
    current: &MetricDefinitions,
) -> Result<DefinitionsDiff, BaselineError> {
    let previous = read_previous(store).await;
    let diff = DefinitionsDiff {
        added: current.added_since(&previous),
        previous_count: previous.len(),
        current_count: current.len(),
    };

    if diff.has_additions() {
        log::info!(
            "Found {} new metrics: {}",
            diff.added.len(),
            diff.added.join(", ")
        );
    } else {
        log::info!("No new metrics found");
    }

    store.write_baseline(current).await?;

    Ok(diff)
}
