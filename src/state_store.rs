//! Load and save the job state record.
//!
//! The record lives at [`crate::keys::state_key`] in the job's output bucket.
//! `save` always writes the whole record; nothing here merges or locks.

use crate::error::Pdf2ImageError;
use crate::keys;
use crate::state::JobState;
use crate::storage::ObjectStorage;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

const CONTENT_TYPE: &str = "application/json";

/// Reads and writes [`JobState`] records through an [`ObjectStorage`].
#[derive(Clone)]
pub struct StateStore {
    storage: Arc<dyn ObjectStorage>,
}

impl StateStore {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    /// Load the record for `output_prefix`, or `None` if there is none.
    ///
    /// A blob that is not a valid record is logged and treated as absent:
    /// the next save replaces it, so a corrupt record cannot wedge the job.
    pub async fn load(
        &self,
        bucket: &str,
        output_prefix: &str,
    ) -> Result<Option<JobState>, Pdf2ImageError> {
        let key = keys::state_key(output_prefix);
        let body = self
            .storage
            .get(bucket, &key)
            .await
            .map_err(|source| Pdf2ImageError::Storage {
                key: format!("{bucket}/{key}"),
                source,
            })?;

        let Some(body) = body else {
            debug!("No state record at {}/{}", bucket, key);
            return Ok(None);
        };

        match serde_json::from_slice::<JobState>(&body) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!(
                    "Ignoring unreadable state record at {}/{}: {}",
                    bucket, key, e
                );
                Ok(None)
            }
        }
    }

    /// Replace the record for the state's own bucket and prefix.
    pub async fn save(&self, state: &JobState) -> Result<(), Pdf2ImageError> {
        let key = keys::state_key(&state.output_prefix);
        let body = serde_json::to_vec(state)?;
        self.storage
            .put(&state.bucket, &key, Bytes::from(body), CONTENT_TYPE)
            .await
            .map_err(|source| Pdf2ImageError::Storage {
                key: format!("{}/{}", state.bucket, key),
                source,
            })?;
        debug!(
            "Saved state {:?} (attempts={}) to {}/{}",
            state.status, state.attempts, state.bucket, key
        );
        Ok(())
    }
}
