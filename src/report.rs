//! Alerting hook for faults of the runner itself.
//!
//! A job that fails is not an alert: its failure is in the state record.
//! An invocation that cannot even produce a record (state store down,
//! internal bug) is, and goes through [`ErrorReporter`] before the error is
//! returned to the scheduler.

use crate::error::Pdf2ImageError;
use std::sync::Arc;
use tracing::error;

/// Where the runner sends faults it cannot record in a job state.
pub trait ErrorReporter: Send + Sync {
    /// Report a fault. `context` identifies the job (`bucket/prefix`) when
    /// the request got far enough to name one.
    fn report(&self, error: &Pdf2ImageError, context: Option<&str>);
}

/// Default reporter: a structured `error!` event for the log pipeline to
/// alert on.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, err: &Pdf2ImageError, context: Option<&str>) {
        error!(
            job = context.unwrap_or("-"),
            error = %err,
            "pdf2image invocation aborted"
        );
    }
}

/// Convenience alias matching the type held by [`crate::job::JobRunner`].
pub type SharedReporter = Arc<dyn ErrorReporter>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collecting(Mutex<Vec<String>>);

    impl ErrorReporter for Collecting {
        fn report(&self, error: &Pdf2ImageError, context: Option<&str>) {
            self.0
                .lock()
                .unwrap()
                .push(format!("{}|{}", context.unwrap_or("-"), error));
        }
    }

    #[test]
    fn tracing_reporter_does_not_panic() {
        TracingReporter.report(&Pdf2ImageError::Internal("x".into()), None);
    }

    #[test]
    fn custom_reporter_receives_context() {
        let r = Collecting::default();
        r.report(&Pdf2ImageError::Internal("boom".into()), Some("b/out/job1"));
        let seen = r.0.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].starts_with("b/out/job1|"));
        assert!(seen[0].contains("boom"));
    }
}
