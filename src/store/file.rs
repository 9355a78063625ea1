//! Directory-backed checkpoint store.
//!
//! Each survey gets one pretty-printed JSON file named after its escaped id.
//! Writes go through a temporary file in the same directory and are renamed
//! into place, so a crash never leaves a half-written checkpoint behind.

use super::{next_revision, CheckpointStore, StoreError};
use crate::models::{Checkpoint, SurveyId};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::debug;

/// Stores checkpoints as JSON files in one directory.
#[derive(Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
    // Serializes read-check-write within this process.
    write_lock: Mutex<()>,
}

impl FileCheckpointStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the checkpoint file for `survey`.
    pub fn path_for(&self, survey: &SurveyId) -> PathBuf {
        self.dir.join(format!("{}.json", escape(survey.as_str())))
    }

    fn read(&self, survey: &SurveyId) -> Result<Option<Checkpoint>, StoreError> {
        let path = self.path_for(survey);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let checkpoint: Checkpoint = serde_json::from_str(&content)?;
        if checkpoint.survey_id != *survey {
            return Err(StoreError::ForeignCheckpoint {
                path,
                expected: survey.clone(),
                found: checkpoint.survey_id,
            });
        }
        Ok(Some(checkpoint))
    }
}

/// Maps a survey id onto a file stem, one-to-one.
///
/// ASCII letters, digits and `-` are kept; every other byte, `_` included,
/// becomes `_XX` in upper-case hex.
fn escape(id: &str) -> String {
    let mut stem = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("_{:02X}", byte));
        }
    }
    stem
}

impl CheckpointStore for FileCheckpointStore {
    fn get(&self, survey: &SurveyId) -> Result<Option<Checkpoint>, StoreError> {
        self.read(survey)
    }

    fn upsert(
        &self,
        checkpoint: &Checkpoint,
        expected_revision: Option<u64>,
    ) -> Result<Checkpoint, StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;

        let current = self.read(&checkpoint.survey_id)?.map(|c| c.revision);
        let stored = next_revision(checkpoint, current, expected_revision)?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(serde_json::to_string_pretty(&stored)?.as_bytes())?;
        tmp.flush()?;

        let path = self.path_for(&stored.survey_id);
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        debug!(
            "Wrote checkpoint revision {} to {}",
            stored.revision,
            path.display()
        );

        Ok(stored)
    }
}
