//! Progress-callback trait for per-invocation job events.
//!
//! Inject an [`Arc<dyn JobProgressCallback>`] via
//! [`crate::job::JobRunnerBuilder::progress_callback`] to observe an
//! invocation as it moves through admission, state writes and publishing.
//! Callers can forward events to a terminal spinner, a metrics sink, or a
//! log shipper without the library knowing about any of them.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2image::JobProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     published: AtomicUsize,
//! }
//!
//! impl JobProgressCallback for CountingCallback {
//!     fn on_page_published(&self, page: usize, key: &str, size: u64) {
//!         self.published.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("page {page} → {key} ({size} bytes)");
//!     }
//! }
//! ```

use crate::state::{JobState, JobStatus};
use std::sync::Arc;

/// Called by the job runner at each observable step of an invocation.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. An invocation is sequential, but one callback may
/// be shared by several concurrent invocations, hence `Send + Sync`.
pub trait JobProgressCallback: Send + Sync {
    /// Called once with the admission decision label
    /// (`proceed-fresh`, `return-cached`, …).
    fn on_admission(&self, decision: &str) {
        let _ = decision;
    }

    /// Called after every state record write.
    fn on_state_saved(&self, status: JobStatus, attempts: u32) {
        let _ = (status, attempts);
    }

    /// Called once the renderer has produced its pages.
    ///
    /// # Arguments
    /// * `pages` — number of rendered pages about to be published
    fn on_render_complete(&self, pages: usize) {
        let _ = pages;
    }

    /// Called after each page upload succeeds.
    ///
    /// # Arguments
    /// * `page` — 1-indexed page number
    /// * `key`  — storage key the page was written to
    /// * `size` — uploaded size in bytes
    fn on_page_published(&self, page: usize, key: &str, size: u64) {
        let _ = (page, key, size);
    }

    /// Called after the multi-page archive upload succeeds.
    fn on_archive_published(&self, key: &str, size: u64) {
        let _ = (key, size);
    }

    /// Called once with the record the invocation returns.
    fn on_job_complete(&self, state: &JobState) {
        let _ = state;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl JobProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type held by [`crate::job::JobRunner`].
pub type ProgressCallback = Arc<dyn JobProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        decisions: Mutex<Vec<String>>,
        saves: AtomicUsize,
        published: AtomicUsize,
    }

    impl JobProgressCallback for TrackingCallback {
        fn on_admission(&self, decision: &str) {
            self.decisions.lock().unwrap().push(decision.to_string());
        }

        fn on_state_saved(&self, _status: JobStatus, _attempts: u32) {
            self.saves.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_published(&self, _page: usize, _key: &str, _size: u64) {
            self.published.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_admission("proceed-fresh");
        cb.on_state_saved(JobStatus::Pending, 0);
        cb.on_render_complete(2);
        cb.on_page_published(1, "out/doc-1.png", 42);
        cb.on_archive_published("out/doc.zip", 84);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_admission("proceed-fresh");
        tracker.on_state_saved(JobStatus::Pending, 0);
        tracker.on_page_published(1, "k1", 1);
        tracker.on_page_published(2, "k2", 1);
        tracker.on_state_saved(JobStatus::Success, 0);

        assert_eq!(*tracker.decisions.lock().unwrap(), vec!["proceed-fresh"]);
        assert_eq!(tracker.saves.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.published.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_admission("return-cached");
        cb.on_render_complete(10);
    }
}
