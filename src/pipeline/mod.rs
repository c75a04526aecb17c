//! The execution pipeline and its stages.
//!
//! Each submodule implements exactly one step; [`execute`] sequences them
//! and owns every state transition of a proceeding invocation.
//!
//! ## Data Flow
//!
//! ```text
//!  save(pending) ──▶ fetch ──▶ render ──▶ publish ──▶ archive ──▶ save(success|fail)
//!                   (http/s3)  (pdfium)   (per page)  (>1 page)
//! ```
//!
//! 1. [`fetch`]   — materialise the source document in the scratch directory
//! 2. [`render`]  — resolve parameters and rasterise pages on the blocking pool
//! 3. [`publish`] — upload each page; `outputs` grows one entry per success
//! 4. [`archive`] — zip all pages when there is more than one
//!
//! The `pending` record is written before any remote call, so a worker that
//! dies mid-fetch leaves something the next invocation can time out. Any
//! stage failure ends the run as `fail` with the stage's [`JobError`]; the
//! record then reflects exactly the outputs that were uploaded. The scratch
//! directory is a `TempDir` and is removed on every exit path.

pub mod archive;
pub mod fetch;
pub mod publish;
pub mod render;

use crate::config::JobConfig;
use crate::error::{JobError, Pdf2ImageError};
use crate::progress::ProgressCallback;
use crate::request::ValidatedRequest;
use crate::state::{JobState, OutputEntry, ResultFile};
use crate::state_store::StateStore;
use crate::storage::ObjectStorage;
use chrono::{DateTime, Utc};
use fetch::DocumentFetcher;
use render::{PageRenderer, RenderParams};
use std::path::Path;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Collaborators the pipeline runs against.
pub struct PipelineContext<'a> {
    pub config: &'a JobConfig,
    pub storage: &'a dyn ObjectStorage,
    pub state_store: &'a StateStore,
    pub fetcher: &'a dyn DocumentFetcher,
    pub renderer: &'a dyn PageRenderer,
    pub progress: Option<&'a ProgressCallback>,
}

impl PipelineContext<'_> {
    /// Persist `state` and notify the progress callback.
    pub async fn save(&self, state: &JobState) -> Result<(), Pdf2ImageError> {
        self.state_store.save(state).await?;
        if let Some(cb) = self.progress {
            cb.on_state_saved(state.status, state.attempts);
        }
        Ok(())
    }
}

/// When the invocation started, as wall-clock (recorded) and monotonic
/// (timings) instants.
#[derive(Debug, Clone, Copy)]
pub struct InvocationClock {
    pub started_at: DateTime<Utc>,
    pub started: Instant,
}

impl InvocationClock {
    pub fn now() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

/// Run the job and return its terminal record.
///
/// Returns `Err` only when the state record itself cannot be written; every
/// other failure is recorded in the returned `fail` record.
pub async fn execute(
    ctx: &PipelineContext<'_>,
    request: &ValidatedRequest,
    attempts: u32,
    clock: InvocationClock,
) -> Result<JobState, Pdf2ImageError> {
    let mut state = JobState::pending(
        &request.bucket,
        &request.prefix,
        clock.started_at,
        attempts,
        ctx.config.schema_version,
        request.params(),
    );
    ctx.save(&state).await?;

    let work_dir = create_work_dir(ctx.config);
    let outcome = match &work_dir {
        Ok(dir) => run_stages(ctx, request, &mut state, dir.path(), &clock).await,
        Err(e) => Err(e.clone()),
    };

    match outcome {
        Ok(manifest) => {
            info!(
                "Job {}/{} succeeded: {} outputs",
                request.bucket,
                request.prefix,
                state.outputs.len()
            );
            state.succeed(manifest);
        }
        Err(e) => {
            warn!(
                "Job {}/{} failed ({}): {}",
                request.bucket, request.prefix, e.kind, e.message
            );
            state.fail(e);
        }
    }

    state.total_time = Some(clock.elapsed_secs());
    ctx.save(&state).await?;

    // Source, pages and archive go with the directory.
    drop(work_dir);
    Ok(state)
}

fn create_work_dir(config: &JobConfig) -> Result<TempDir, JobError> {
    let builder = {
        let mut b = tempfile::Builder::new();
        b.prefix("pdf2image-");
        b
    };
    match &config.work_dir {
        Some(parent) => builder.tempdir_in(parent),
        None => builder.tempdir(),
    }
    .map_err(|e| JobError::internal(format!("Failed to create work directory: {e}")))
}

/// Fetch, render, publish and archive. Returns the result manifest.
///
/// `state.outputs` is appended as each page lands in storage, so on error
/// the caller's record already lists exactly what was published.
async fn run_stages(
    ctx: &PipelineContext<'_>,
    request: &ValidatedRequest,
    state: &mut JobState,
    work_dir: &Path,
    clock: &InvocationClock,
) -> Result<Vec<ResultFile>, JobError> {
    // ── Step 1: Fetch ────────────────────────────────────────────────────
    let pdf_path = ctx.fetcher.fetch(&request.source, work_dir).await?;
    debug!("Source ready at {}", pdf_path.display());

    // ── Step 2: Render ───────────────────────────────────────────────────
    let params = RenderParams::resolve(
        request.format,
        request.dpi,
        request.quality,
        request.page,
        ctx.config,
    )?;
    let rendered = ctx.renderer.render(&pdf_path, &params, work_dir).await?;
    if rendered.is_empty() {
        return Err(JobError::render("Renderer produced no pages"));
    }
    state.convert_time = Some(clock.elapsed_secs());
    info!(
        "Rendered {} pages as {} at {} dpi",
        rendered.len(),
        params.encoding.extension(),
        params.dpi
    );
    if let Some(cb) = ctx.progress {
        cb.on_render_complete(rendered.len());
    }

    // ── Step 3: Publish pages ────────────────────────────────────────────
    let name_root = request.name_root();
    let mut manifest = Vec::with_capacity(rendered.len() + 1);
    let mut archive_entries = Vec::with_capacity(rendered.len());

    for page in &rendered {
        let published = publish::publish_page(
            ctx.storage,
            &request.bucket,
            &request.prefix,
            &name_root,
            page,
        )
        .await?;

        state.outputs.push(OutputEntry {
            page: published.page,
            key: published.key.clone(),
        });
        manifest.push(ResultFile {
            id: manifest.len() + 1,
            name: published.filename.clone(),
            size: published.size,
        });
        archive_entries.push((page.path.clone(), published.filename));

        if let Some(cb) = ctx.progress {
            cb.on_page_published(published.page, &published.key, published.size);
        }
    }

    // ── Step 4: Archive ──────────────────────────────────────────────────
    if archive_entries.len() > 1 {
        let archive = archive::publish_archive(
            ctx.storage,
            &request.bucket,
            &request.prefix,
            &name_root,
            archive_entries,
            work_dir,
        )
        .await?;

        manifest.push(ResultFile {
            id: manifest.len() + 1,
            name: archive.filename,
            size: archive.size,
        });
        if let Some(cb) = ctx.progress {
            cb.on_archive_published(&archive.key, archive.size);
        }
    }

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_dir_is_created_under_configured_parent_and_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let config = JobConfig::builder()
            .work_dir(parent.path())
            .build()
            .unwrap();

        let dir = create_work_dir(&config).unwrap();
        let path = dir.path().to_path_buf();
        assert!(path.starts_with(parent.path()));
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("pdf2image-"));

        drop(dir);
        assert!(!path.exists());
    }

    #[test]
    fn missing_work_dir_parent_is_an_internal_failure() {
        let config = JobConfig::builder()
            .work_dir("/definitely/not/a/real/dir")
            .build()
            .unwrap();
        let err = create_work_dir(&config).unwrap_err();
        assert_eq!(err.kind, crate::error::FailureKind::Internal);
    }
}
