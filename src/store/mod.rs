//! Checkpoint persistence.
//!
//! A store keeps at most one [`Checkpoint`] per survey. Writes are
//! compare-and-swap on the checkpoint revision so two writers that loaded the
//! same baseline cannot silently overwrite each other.

mod file;
mod memory;

pub use file::FileCheckpointStore;
pub use memory::MemoryCheckpointStore;

use crate::models::{Checkpoint, SurveyId};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by checkpoint stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(
        "checkpoint for survey '{survey}' changed concurrently \
         (expected revision {expected:?}, found {found:?})"
    )]
    Conflict {
        survey: SurveyId,
        expected: Option<u64>,
        found: Option<u64>,
    },

    #[error("checkpoint io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("checkpoint file {} holds survey '{found}', expected '{expected}'", .path.display())]
    ForeignCheckpoint {
        path: PathBuf,
        expected: SurveyId,
        found: SurveyId,
    },

    #[error("checkpoint store lock poisoned")]
    Poisoned,
}

/// Storage for per-survey checkpoints.
pub trait CheckpointStore: Send + Sync {
    /// Loads the checkpoint of `survey`, if one was ever written.
    fn get(&self, survey: &SurveyId) -> Result<Option<Checkpoint>, StoreError>;

    /// Creates or replaces the checkpoint of `checkpoint.survey_id`.
    ///
    /// `expected_revision` is the revision the caller loaded, or `None` if it
    /// found no checkpoint. On success the stored copy, with its new revision,
    /// is returned.
    fn upsert(
        &self,
        checkpoint: &Checkpoint,
        expected_revision: Option<u64>,
    ) -> Result<Checkpoint, StoreError>;
}

/// Checks the current revision against the expected one and returns the
/// checkpoint to write.
pub(crate) fn next_revision(
    checkpoint: &Checkpoint,
    current: Option<u64>,
    expected: Option<u64>,
) -> Result<Checkpoint, StoreError> {
    if current != expected {
        return Err(StoreError::Conflict {
            survey: checkpoint.survey_id.clone(),
            expected,
            found: current,
        });
    }

    let mut stored = checkpoint.clone();
    stored.revision = expected.unwrap_or(0) + 1;
    Ok(stored)
}
