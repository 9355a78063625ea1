//! In-process checkpoint store.

use super::{next_revision, CheckpointStore, StoreError};
use crate::models::{Checkpoint, SurveyId};
use std::collections::HashMap;
use std::sync::Mutex;

/// Keeps checkpoints in a mutex-guarded map. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: Mutex<HashMap<SurveyId, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn get(&self, survey: &SurveyId) -> Result<Option<Checkpoint>, StoreError> {
        let map = self.checkpoints.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(map.get(survey).cloned())
    }

    fn upsert(
        &self,
        checkpoint: &Checkpoint,
        expected_revision: Option<u64>,
    ) -> Result<Checkpoint, StoreError> {
        let mut map = self.checkpoints.lock().map_err(|_| StoreError::Poisoned)?;
        let current = map.get(&checkpoint.survey_id).map(|c| c.revision);
        let stored = next_revision(checkpoint, current, expected_revision)?;
        map.insert(stored.survey_id.clone(), stored.clone());
        Ok(stored)
    }
}
