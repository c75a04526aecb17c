//! Admission: decide what an invocation should do given the prior record.
//!
//! ```text
//!  prior record ──┬─ none / force ───────────────────────▶ ProceedFresh
//!                 ├─ success, first output present ──────▶ ReturnCached
//!                 ├─ success, first output missing ──────▶ ProceedFresh
//!                 ├─ pending, within timeout ────────────▶ ReturnPending
//!                 ├─ pending, timed out ─┬─ attempts < max ▶ RetryAfterTimeout
//!                 │                      └─ otherwise ─────▶ Refuse (timed_out)
//!                 ├─ fail, attempts ≥ max ───────────────▶ Refuse
//!                 └─ fail, attempts < max ───────────────▶ ProceedFresh
//! ```
//!
//! A record written under another schema version has its attempt counter
//! forgiven before any check. [`decide`] is pure; [`admit`] adds the
//! storage probe needed for the success branch.
//!
//! The probe only checks that the *first* output still exists. It is a
//! liveness check, not a manifest verification: a success record whose
//! later pages were deleted out-of-band is still served from cache.

use crate::state::{JobState, JobStatus};
use crate::storage::{ObjectStorage, StorageError};
use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

/// Inputs to the admission decision other than the prior record.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionPolicy {
    pub now: DateTime<Utc>,
    pub timeout: TimeDelta,
    pub max_attempts: u32,
    pub schema_version: u32,
    pub force: bool,
}

/// What an invocation should do.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Execute, starting the new record with this attempt count.
    ProceedFresh { attempts: u32 },
    /// A usable success record exists; return it without executing.
    ReturnCached(JobState),
    /// Another execution is presumed in flight; return its record.
    ReturnPending(JobState),
    /// The prior run timed out. Persist this record, then execute carrying
    /// its attempt count.
    RetryAfterTimeout(JobState),
    /// Attempts are exhausted. Return `state`; when `timed_out` is set it is
    /// a new timeout record that must be persisted first.
    Refuse { state: JobState, timed_out: bool },
}

impl Decision {
    /// Short label for logs and progress events.
    pub fn label(&self) -> &'static str {
        match self {
            Decision::ProceedFresh { .. } => "proceed-fresh",
            Decision::ReturnCached(_) => "return-cached",
            Decision::ReturnPending(_) => "return-pending",
            Decision::RetryAfterTimeout(_) => "retry-after-timeout",
            Decision::Refuse { .. } => "refuse-exhausted",
        }
    }

    /// Whether the pipeline runs for this decision.
    pub fn executes(&self) -> bool {
        matches!(
            self,
            Decision::ProceedFresh { .. } | Decision::RetryAfterTimeout(_)
        )
    }
}

/// Decide from the prior record alone.
///
/// `first_output_present` is only consulted when the prior status is
/// `success`.
pub fn decide(
    prior: Option<&JobState>,
    policy: &AdmissionPolicy,
    first_output_present: bool,
) -> Decision {
    let Some(prior) = prior else {
        return Decision::ProceedFresh { attempts: 0 };
    };

    let attempts = if prior.schema_version == policy.schema_version {
        prior.attempts
    } else {
        debug!(
            "State schema {} differs from {}; forgiving {} attempts",
            prior.schema_version, policy.schema_version, prior.attempts
        );
        0
    };

    if policy.force {
        return Decision::ProceedFresh { attempts };
    }

    match prior.status {
        JobStatus::Success if first_output_present => Decision::ReturnCached(prior.clone()),
        JobStatus::Success => Decision::ProceedFresh { attempts: 0 },
        JobStatus::Pending if !prior.is_timed_out(policy.now, policy.timeout) => {
            Decision::ReturnPending(prior.clone())
        }
        JobStatus::Pending => {
            let timed_out = prior.timed_out(attempts, policy.schema_version);
            if timed_out.attempts >= policy.max_attempts {
                Decision::Refuse {
                    state: timed_out,
                    timed_out: true,
                }
            } else {
                Decision::RetryAfterTimeout(timed_out)
            }
        }
        JobStatus::Fail if attempts >= policy.max_attempts => Decision::Refuse {
            state: prior.clone(),
            timed_out: false,
        },
        JobStatus::Fail => Decision::ProceedFresh { attempts },
    }
}

/// Decide, probing storage for the first output of a success record.
pub async fn admit(
    prior: Option<&JobState>,
    policy: &AdmissionPolicy,
    storage: &dyn ObjectStorage,
) -> Result<Decision, StorageError> {
    let needs_probe = !policy.force && matches!(prior, Some(p) if p.status == JobStatus::Success);

    let first_output_present = match prior {
        Some(p) if needs_probe => match p.first_output() {
            Some(out) if !p.bucket.is_empty() => storage.exists(&p.bucket, &out.key).await?,
            _ => false,
        },
        _ => false,
    };

    Ok(decide(prior, policy, first_output_present))
}
