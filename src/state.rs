//! The persisted job state record.
//!
//! One [`JobState`] exists per output prefix, stored as a single JSON blob
//! next to the outputs. Every write replaces the whole blob; there is no
//! patching and no merge, so the stored record always reflects exactly one
//! invocation's view of the job.
//!
//! Deserialisation is forward-tolerant: unknown fields are ignored and every
//! optional field defaults, so records written by newer or older releases
//! still load.

use crate::config::OutputFormat;
use crate::error::JobError;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a job.
///
/// "No record yet" is represented by the absence of a [`JobState`], never by
/// a status value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Success,
    Fail,
}

/// A published page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEntry {
    /// 1-indexed page number.
    pub page: usize,
    /// Storage key inside the job's bucket.
    pub key: String,
}

/// A named result file listed in the manifest of a successful job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultFile {
    pub id: usize,
    pub name: String,
    pub size: u64,
}

/// Normalised request parameters, kept for observability only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestParams {
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub dpi: u32,
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub quality: Option<u8>,
}

/// The job state record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobState {
    pub status: JobStatus,

    #[serde(default)]
    pub bucket: String,

    #[serde(default)]
    pub output_prefix: String,

    /// When the invocation that wrote `pending` started.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    /// Failed executions since the last success.
    #[serde(default)]
    pub attempts: u32,

    #[serde(default)]
    pub schema_version: u32,

    #[serde(default)]
    pub error: Option<JobError>,

    /// Seconds from invocation start until rendering finished.
    #[serde(default)]
    pub convert_time: Option<f64>,

    /// Seconds from invocation start until the final record was written.
    #[serde(default)]
    pub total_time: Option<f64>,

    #[serde(default)]
    pub outputs: Vec<OutputEntry>,

    #[serde(default)]
    pub result_manifest: Vec<ResultFile>,

    #[serde(default)]
    pub request_params: Option<RequestParams>,
}

impl JobState {
    /// A fresh `pending` record for an invocation that is about to execute.
    ///
    /// Outputs and manifest always start empty so entries from an earlier
    /// run can never leak into this one.
    pub fn pending(
        bucket: impl Into<String>,
        output_prefix: impl Into<String>,
        started_at: DateTime<Utc>,
        attempts: u32,
        schema_version: u32,
        params: RequestParams,
    ) -> Self {
        Self {
            status: JobStatus::Pending,
            bucket: bucket.into(),
            output_prefix: output_prefix.into(),
            started_at: Some(started_at),
            attempts,
            schema_version,
            error: None,
            convert_time: None,
            total_time: None,
            outputs: Vec::new(),
            result_manifest: Vec::new(),
            request_params: Some(params),
        }
    }

    /// Mark the execution failed. Counts as one attempt.
    pub fn fail(&mut self, error: JobError) {
        self.status = JobStatus::Fail;
        self.attempts = self.attempts.saturating_add(1);
        self.error = Some(error);
    }

    /// Mark the execution successful and publish its manifest.
    pub fn succeed(&mut self, manifest: Vec<ResultFile>) {
        self.status = JobStatus::Success;
        self.attempts = 0;
        self.error = None;
        self.result_manifest = manifest;
    }

    /// The record written when a `pending` run is presumed dead.
    ///
    /// `attempts` is the caller's effective count (already forgiven on a
    /// schema mismatch); the result carries one more.
    pub fn timed_out(&self, attempts: u32, schema_version: u32) -> Self {
        let mut next = self.clone();
        next.attempts = attempts;
        next.schema_version = schema_version;
        next.fail(JobError::timed_out());
        next
    }

    /// First published output, the target of the cache liveness probe.
    pub fn first_output(&self) -> Option<&OutputEntry> {
        self.outputs.first()
    }

    /// Whether a `pending` record started more than `timeout` before `now`.
    ///
    /// A record without `started_at` cannot be judged and is never
    /// considered timed out.
    pub fn is_timed_out(&self, now: DateTime<Utc>, timeout: TimeDelta) -> bool {
        match self.started_at {
            Some(started) => now.signed_duration_since(started) >= timeout,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    fn params() -> RequestParams {
        RequestParams {
            source_url: "https://x/doc.pdf".into(),
            format: OutputFormat::Png,
            dpi: 150,
            page: None,
            quality: None,
        }
    }

    fn pending() -> JobState {
        JobState::pending("b", "out/job1", Utc::now(), 1, 1, params())
    }

    #[test]
    fn fail_increments_attempts_and_records_error() {
        let mut s = pending();
        s.fail(JobError::render("PDF has no pages"));
        assert_eq!(s.status, JobStatus::Fail);
        assert_eq!(s.attempts, 2);
        assert_eq!(s.error.as_ref().unwrap().kind, FailureKind::Render);
    }

    #[test]
    fn succeed_resets_attempts() {
        let mut s = pending();
        s.succeed(vec![ResultFile {
            id: 1,
            name: "doc-1.png".into(),
            size: 10,
        }]);
        assert_eq!(s.status, JobStatus::Success);
        assert_eq!(s.attempts, 0);
        assert!(s.error.is_none());
        assert_eq!(s.result_manifest.len(), 1);
    }

    #[test]
    fn timeout_boundary_is_inclusive() {
        let now = Utc::now();
        let mut s = pending();
        s.started_at = Some(now - TimeDelta::seconds(60));
        assert!(s.is_timed_out(now, TimeDelta::seconds(60)));
        assert!(!s.is_timed_out(now, TimeDelta::seconds(61)));
    }

    #[test]
    fn missing_started_at_never_times_out() {
        let mut s = pending();
        s.started_at = None;
        assert!(!s.is_timed_out(Utc::now(), TimeDelta::zero()));
    }

    #[test]
    fn timed_out_record_is_a_failure() {
        let s = pending();
        let t = s.timed_out(2, 1);
        assert_eq!(t.status, JobStatus::Fail);
        assert_eq!(t.attempts, 3);
        assert_eq!(t.error, Some(JobError::timed_out()));
        assert_eq!(t.started_at, s.started_at);
    }

    #[test]
    fn serialises_camel_case() {
        let json = serde_json::to_value(pending()).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["outputPrefix"], "out/job1");
        assert_eq!(json["schemaVersion"], 1);
        assert!(json.get("startedAt").is_some());
        assert!(json.get("resultManifest").is_some());
    }

    #[test]
    fn tolerates_unknown_and_missing_fields() {
        let s: JobState = serde_json::from_str(
            r#"{"status":"fail","attempts":2,"someFutureField":{"x":1}}"#,
        )
        .unwrap();
        assert_eq!(s.status, JobStatus::Fail);
        assert_eq!(s.attempts, 2);
        assert_eq!(s.schema_version, 0);
        assert!(s.outputs.is_empty());
        assert!(s.started_at.is_none());
        assert!(s.request_params.is_none());
    }
}
