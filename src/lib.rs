//! # edgequake-pdf2image
//!
//! Convert PDF documents into page images, as an idempotent job whose state
//! lives next to its outputs in object storage.
//!
//! ## Why a state record?
//!
//! Conversion runs are triggered by schedulers that retry, duplicate and
//! time out. Every job keeps one JSON record at `{output_prefix}.state.json`
//! and each invocation starts by reading it: a finished job is answered from
//! cache, a job in flight is left alone, a stalled job is timed out and
//! retried, and a job that keeps failing is eventually refused.
//!
//! ## Pipeline Overview
//!
//! ```text
//! request
//!  │
//!  ├─ 1. Validate  required fields, format, page
//!  ├─ 2. Admit     prior record → proceed / cached / pending / retry / refuse
//!  ├─ 3. Fetch     HTTP(S) or s3:// source into a scratch directory
//!  ├─ 4. Render    rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 5. Publish   upload {name}-{page}.{ext} under the output prefix
//!  ├─ 6. Archive   zip the pages when there is more than one
//!  └─ 7. Record    save success or fail with timings and manifest
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2image::{BucketStore, JobConfig, JobRunner, StorageBackend};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = Arc::new(BucketStore::new(StorageBackend::S3));
//!     let runner = JobRunner::builder(JobConfig::default(), storage).build()?;
//!
//!     let state = runner
//!         .handle(serde_json::json!({
//!             "source_url": "https://example.com/report.pdf",
//!             "output_bucket": "renders",
//!             "output_prefix": "jobs/report-1",
//!             "output_format": "jpg",
//!         }))
//!         .await?;
//!     println!("{:?}: {} outputs", state.status, state.outputs.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2image` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-pdf2image = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod admission;
pub mod config;
pub mod error;
pub mod job;
pub mod keys;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod request;
pub mod state;
pub mod state_store;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use admission::{AdmissionPolicy, Decision};
pub use config::{ImageEncoding, JobConfig, JobConfigBuilder, OutputFormat, PageSelector};
pub use error::{FailureKind, JobError, Pdf2ImageError};
pub use job::{JobRunner, JobRunnerBuilder};
pub use pipeline::fetch::{DocumentFetcher, SourceFetcher};
pub use pipeline::render::{PageRenderer, PdfiumRenderer, RenderParams, RenderedPage};
pub use progress::{JobProgressCallback, NoopProgressCallback, ProgressCallback};
pub use report::{ErrorReporter, SharedReporter, TracingReporter};
pub use request::{JobRequest, PageValue, SourceLocation, ValidatedRequest};
pub use state::{JobState, JobStatus, OutputEntry, RequestParams, ResultFile};
pub use state_store::StateStore;
pub use storage::{BucketStore, ObjectStorage, StorageBackend, StorageError};
