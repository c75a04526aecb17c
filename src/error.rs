//! Error types for the edgequake-pdf2image library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2ImageError`] — **Fatal**: the invocation itself cannot be handled
//!   (malformed request, state record unreadable or unwritable, broken
//!   configuration). Returned as `Err(Pdf2ImageError)` from
//!   [`crate::job::JobRunner`] and reported to the alerting collaborator.
//!
//! * [`JobError`] — **Recorded**: the job ran and failed (download error,
//!   render error, upload error, timeout). Stored inside
//!   [`crate::state::JobState`] with `status = fail`, and the invocation
//!   still returns `Ok`.
//!
//! The split keeps "the job legitimately failed" apart from "the job runner
//! itself is broken".

use crate::storage::StorageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2image library.
///
/// Job-level failures use [`JobError`] and are persisted in the state record
/// rather than propagated here.
#[derive(Debug, Error)]
pub enum Pdf2ImageError {
    // ── Request errors ────────────────────────────────────────────────────
    /// A required field is missing or a field has the wrong shape.
    /// Raised before any state is read or written.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Storage errors ────────────────────────────────────────────────────
    /// The state record could not be read or written, or the cache
    /// liveness probe could not reach storage.
    #[error("Storage failure for '{key}': {source}")]
    Storage {
        key: String,
        #[source]
        source: StorageError,
    },

    /// The state record could not be serialised.
    #[error("Failed to encode state record: {0}")]
    StateEncode(#[from] serde_json::Error),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2ImageError {
    /// True for errors caused by the caller rather than by the runner.
    pub fn is_invalid_request(&self) -> bool {
        matches!(self, Pdf2ImageError::InvalidRequest(_))
    }
}

/// Which stage of a job produced a failure.
///
/// The retry policy treats every kind identically; the tag exists so that
/// logs, dashboards and tests can branch on the kind instead of parsing the
/// message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The source document could not be downloaded or was not found.
    Fetch,
    /// Render parameters were rejected (unsupported dpi, quality, …).
    Validation,
    /// The rendering engine failed.
    Render,
    /// A rendered page could not be uploaded.
    Publish,
    /// The multi-page archive could not be built or uploaded.
    Archive,
    /// A previous invocation stayed `pending` past the timeout.
    Timeout,
    /// Local I/O or task failure inside the runner.
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Fetch => "fetch",
            FailureKind::Validation => "validation",
            FailureKind::Render => "render",
            FailureKind::Publish => "publish",
            FailureKind::Archive => "archive",
            FailureKind::Timeout => "timeout",
            FailureKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// A job failure recorded in the state record.
///
/// `message` is the free-text description shown to operators; `kind` is
/// the machine-readable classification.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct JobError {
    pub kind: FailureKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn fetch(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Fetch, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Validation, message)
    }

    pub fn render(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Render, message)
    }

    pub fn publish(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Publish, message)
    }

    pub fn archive(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Archive, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Internal, message)
    }

    /// The error recorded when a `pending` record outlives the timeout.
    pub fn timed_out() -> Self {
        Self::new(FailureKind::Timeout, "task timed out")
    }
}
