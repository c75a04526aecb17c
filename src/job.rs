//! The job driver: one invocation from request to returned record.
//!
//! ```text
//!  event ─▶ validate ─▶ load state ─▶ admit ─┬─ cached / pending / refuse ─▶ return record
//!                                            ├─ retry-after-timeout ─▶ save timeout ─▶ execute
//!                                            └─ proceed-fresh ─────────────────────▶ execute
//! ```
//!
//! Every path that returns `Ok` returns the record now stored for the job
//! (or the one found there). `Err` is reserved for faults that prevented a
//! record from being read or written, and for malformed requests; the
//! former are sent to the [`ErrorReporter`](crate::report::ErrorReporter).

use crate::admission::{self, AdmissionPolicy, Decision};
use crate::config::JobConfig;
use crate::error::Pdf2ImageError;
use crate::pipeline::fetch::{DocumentFetcher, SourceFetcher};
use crate::pipeline::render::{PageRenderer, PdfiumRenderer};
use crate::pipeline::{self, InvocationClock, PipelineContext};
use crate::progress::ProgressCallback;
use crate::report::{SharedReporter, TracingReporter};
use crate::request::{JobRequest, ValidatedRequest};
use crate::state::JobState;
use crate::state_store::StateStore;
use crate::storage::ObjectStorage;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Runs conversion jobs against one storage backend.
///
/// Cheap to clone; every collaborator is behind an `Arc`.
#[derive(Clone)]
pub struct JobRunner {
    config: Arc<JobConfig>,
    storage: Arc<dyn ObjectStorage>,
    state_store: StateStore,
    fetcher: Arc<dyn DocumentFetcher>,
    renderer: Arc<dyn PageRenderer>,
    reporter: SharedReporter,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("config", &self.config)
            .field("progress_callback", &self.progress.as_ref().map(|_| "<callback>"))
            .finish_non_exhaustive()
    }
}

impl JobRunner {
    /// Start building a runner over `storage`.
    pub fn builder(config: JobConfig, storage: Arc<dyn ObjectStorage>) -> JobRunnerBuilder {
        JobRunnerBuilder {
            config,
            storage,
            fetcher: None,
            renderer: None,
            reporter: None,
            progress: None,
        }
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Handle a raw JSON event.
    pub async fn handle(&self, event: serde_json::Value) -> Result<JobState, Pdf2ImageError> {
        let request =
            JobRequest::from_event(event).inspect_err(|e| warn!("Rejected event: {e}"))?;
        self.invoke(request).await
    }

    /// Handle one request and return the job's record.
    ///
    /// # Errors
    /// * [`Pdf2ImageError::InvalidRequest`] — nothing was read or written
    /// * [`Pdf2ImageError::Storage`] — the state record or liveness probe
    ///   could not reach storage
    pub async fn invoke(&self, request: JobRequest) -> Result<JobState, Pdf2ImageError> {
        let request = request
            .validate(&self.config)
            .inspect_err(|e| warn!("Rejected request: {e}"))?;
        let context = format!("{}/{}", request.bucket, request.prefix);

        match self.run(&request).await {
            Ok(state) => {
                if let Some(cb) = &self.progress {
                    cb.on_job_complete(&state);
                }
                Ok(state)
            }
            Err(e) => {
                if !e.is_invalid_request() {
                    self.reporter.report(&e, Some(&context));
                }
                Err(e)
            }
        }
    }

    async fn run(&self, request: &ValidatedRequest) -> Result<JobState, Pdf2ImageError> {
        let clock = InvocationClock::now();
        info!(
            "Job {}/{}: {} ({} dpi, page {:?})",
            request.bucket,
            request.prefix,
            request.format,
            request.dpi,
            request.page.page()
        );

        let prior = self
            .state_store
            .load(&request.bucket, &request.prefix)
            .await?;

        let policy = AdmissionPolicy {
            now: clock.started_at,
            timeout: self.config.timeout(),
            max_attempts: self.config.max_attempts,
            schema_version: self.config.schema_version,
            force: request.force,
        };

        let decision = admission::admit(prior.as_ref(), &policy, self.storage.as_ref())
            .await
            .map_err(|source| Pdf2ImageError::Storage {
                key: match prior.as_ref().and_then(|p| p.first_output()) {
                    Some(out) => format!("{}/{}", request.bucket, out.key),
                    None => format!("{}/{}", request.bucket, request.state_key()),
                },
                source,
            })?;

        info!(
            "Job {}/{}: admission {}",
            request.bucket,
            request.prefix,
            decision.label()
        );
        if let Some(cb) = &self.progress {
            cb.on_admission(decision.label());
        }

        let ctx = PipelineContext {
            config: &self.config,
            storage: self.storage.as_ref(),
            state_store: &self.state_store,
            fetcher: self.fetcher.as_ref(),
            renderer: self.renderer.as_ref(),
            progress: self.progress.as_ref(),
        };

        match decision {
            Decision::ProceedFresh { attempts } => {
                pipeline::execute(&ctx, request, attempts, clock).await
            }
            Decision::RetryAfterTimeout(timed_out) => {
                ctx.save(&timed_out).await?;
                pipeline::execute(&ctx, request, timed_out.attempts, clock).await
            }
            Decision::Refuse {
                state,
                timed_out: true,
            } => {
                ctx.save(&state).await?;
                Ok(state)
            }
            Decision::Refuse { state, .. }
            | Decision::ReturnCached(state)
            | Decision::ReturnPending(state) => {
                debug!(
                    "Job {}/{}: returning stored {:?} record",
                    request.bucket, request.prefix, state.status
                );
                Ok(state)
            }
        }
    }
}

/// Builder for [`JobRunner`].
///
/// Collaborators left unset default to [`SourceFetcher`],
/// [`PdfiumRenderer`] and [`TracingReporter`].
pub struct JobRunnerBuilder {
    config: JobConfig,
    storage: Arc<dyn ObjectStorage>,
    fetcher: Option<Arc<dyn DocumentFetcher>>,
    renderer: Option<Arc<dyn PageRenderer>>,
    reporter: Option<SharedReporter>,
    progress: Option<ProgressCallback>,
}

impl JobRunnerBuilder {
    pub fn fetcher(mut self, fetcher: Arc<dyn DocumentFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn reporter(mut self, reporter: SharedReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.progress = Some(cb);
        self
    }

    pub fn build(self) -> Result<JobRunner, Pdf2ImageError> {
        let fetcher: Arc<dyn DocumentFetcher> = match self.fetcher {
            Some(f) => f,
            None => Arc::new(SourceFetcher::new(
                Arc::clone(&self.storage),
                self.config.download_timeout_secs,
            )?),
        };
        let renderer: Arc<dyn PageRenderer> = match self.renderer {
            Some(r) => r,
            None => Arc::new(PdfiumRenderer::new(self.config.pdfium_lib_path.clone())),
        };

        Ok(JobRunner {
            state_store: StateStore::new(Arc::clone(&self.storage)),
            config: Arc::new(self.config),
            storage: self.storage,
            fetcher,
            renderer,
            reporter: self.reporter.unwrap_or_else(|| Arc::new(TracingReporter)),
            progress: self.progress,
        })
    }
}
