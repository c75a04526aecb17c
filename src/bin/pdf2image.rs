//! CLI binary for edgequake-pdf2image.
//!
//! A thin shim over the library crate that maps CLI flags to a
//! `JobConfig` + `JobRequest`, runs one invocation and prints the record.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_pdf2image::{
    BucketStore, JobConfig, JobProgressCallback, JobRequest, JobRunner, JobState, JobStatus,
    OutputFormat, PageValue, ProgressCallback, StorageBackend,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal spinner plus one log line per published object.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Admitting");
        bar.set_message("Reading job state…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl JobProgressCallback for CliProgressCallback {
    fn on_admission(&self, decision: &str) {
        self.bar
            .println(format!("{} admission: {}", cyan("◆"), decision));
        self.bar.set_prefix("Running");
        self.bar.set_message("Fetching and rendering…");
    }

    fn on_state_saved(&self, status: JobStatus, attempts: u32) {
        self.bar.println(format!(
            "  {} state {:?} (attempts {})",
            dim("•"),
            status,
            attempts
        ));
    }

    fn on_render_complete(&self, pages: usize) {
        self.bar.set_prefix("Publishing");
        self.bar.set_message(format!("{pages} pages"));
    }

    fn on_page_published(&self, page: usize, key: &str, size: u64) {
        self.bar.println(format!(
            "  {} Page {:>3}  {}  {}",
            green("✓"),
            page,
            key,
            dim(&format!("{size} bytes"))
        ));
    }

    fn on_archive_published(&self, key: &str, size: u64) {
        self.bar.println(format!(
            "  {} Archive   {}  {}",
            green("✓"),
            key,
            dim(&format!("{size} bytes"))
        ));
    }

    fn on_job_complete(&self, state: &JobState) {
        self.bar.finish_and_clear();
        match state.status {
            JobStatus::Success => eprintln!(
                "{} {} outputs published",
                green("✔"),
                state.outputs.len()
            ),
            JobStatus::Pending => eprintln!("{} job is still pending", cyan("⚠")),
            JobStatus::Fail => eprintln!(
                "{} job failed: {}",
                red("✘"),
                state
                    .error
                    .as_ref()
                    .map(|e| e.message.as_str())
                    .unwrap_or("unknown error")
            ),
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Render every page of a URL to PNG under s3://renders/jobs/report-1/
  pdf2image --source-url https://example.com/report.pdf \
            --bucket renders --prefix jobs/report-1

  # Page 2 only, as JPEG at quality 90
  pdf2image --source-url s3://inbox/report.pdf --bucket renders \
            --prefix jobs/report-1-p2 --format jpg --page 2 --quality 90

  # Replay a scheduler event against a local directory tree
  pdf2image --event event.json --storage fs --fs-root ./buckets

  # Event from stdin
  echo '{"source_url": "...", "output_bucket": "b", "output_prefix": "p"}' | pdf2image --event -

OUTPUT:
  The job's state record is printed as JSON on stdout. The exit code is 0
  whenever a record is returned (including status "fail"), 1 otherwise.

ENVIRONMENT VARIABLES:
  AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AWS_REGION, AWS_ENDPOINT
                          S3 credentials and endpoint (--storage s3)
  PDFIUM_LIB_PATH         Directory containing libpdfium
  RUST_LOG                Overrides the log filter
"#;

#[derive(clap::ValueEnum, Clone, Debug)]
enum StorageArg {
    S3,
    Fs,
}

/// Convert a PDF into page images as an idempotent, state-tracked job.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2image",
    version,
    about = "Convert a PDF into page images as an idempotent, state-tracked job",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// JSON event file, or `-` for stdin. Overrides the request flags.
    #[arg(long, env = "PDF2IMAGE_EVENT")]
    event: Option<String>,

    /// Source PDF: http(s):// or s3://bucket/key.
    #[arg(long, env = "PDF2IMAGE_SOURCE_URL")]
    source_url: Option<String>,

    /// Output bucket.
    #[arg(long, env = "PDF2IMAGE_BUCKET")]
    bucket: Option<String>,

    /// Output prefix (also the job identity).
    #[arg(long, env = "PDF2IMAGE_PREFIX")]
    prefix: Option<String>,

    /// Output format: png, jpg, small-jpg.
    #[arg(long, env = "PDF2IMAGE_FORMAT")]
    format: Option<String>,

    /// Rendering DPI.
    #[arg(long, env = "PDF2IMAGE_DPI")]
    dpi: Option<u32>,

    /// Render only this page (1-indexed).
    #[arg(long, env = "PDF2IMAGE_PAGE")]
    page: Option<i64>,

    /// JPEG quality (10–100, step 10).
    #[arg(long, env = "PDF2IMAGE_QUALITY")]
    quality: Option<u8>,

    /// Ignore a cached success and re-run.
    #[arg(long, env = "PDF2IMAGE_FORCE")]
    force: bool,

    /// Storage backend.
    #[arg(long, env = "PDF2IMAGE_STORAGE", value_enum, default_value = "s3")]
    storage: StorageArg,

    /// Root directory for `--storage fs`; bucket `b` maps to `<root>/b`.
    #[arg(long, env = "PDF2IMAGE_FS_ROOT")]
    fs_root: Option<PathBuf>,

    /// Seconds after which a pending job is considered dead.
    #[arg(long, env = "PDF2IMAGE_TIMEOUT", default_value_t = 900)]
    timeout: u64,

    /// Attempts before a job is refused.
    #[arg(long, env = "PDF2IMAGE_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Default format when a request names none.
    #[arg(long, env = "PDF2IMAGE_DEFAULT_FORMAT", default_value = "png")]
    default_format: String,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2IMAGE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Parent directory for per-invocation scratch space.
    #[arg(long, env = "PDF2IMAGE_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Directory containing the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Disable the progress spinner.
    #[arg(long, env = "PDF2IMAGE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2IMAGE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2IMAGE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build runner ─────────────────────────────────────────────────────
    let config = build_config(&cli)?;
    let backend = match cli.storage {
        StorageArg::S3 => StorageBackend::S3,
        StorageArg::Fs => StorageBackend::Fs(
            cli.fs_root
                .clone()
                .context("--fs-root is required with --storage fs")?,
        ),
    };
    let storage = Arc::new(BucketStore::new(backend));

    let mut builder = JobRunner::builder(config, storage);
    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new();
        builder = builder.progress_callback(cb);
    }
    let runner = builder.build().context("Failed to build job runner")?;

    // ── Run ──────────────────────────────────────────────────────────────
    let state = match cli.event.as_deref() {
        Some(source) => {
            let event = read_event(source)?;
            runner.handle(event).await
        }
        None => runner.invoke(request_from_flags(&cli)).await,
    }
    .context("Invocation failed")?;

    let json = serde_json::to_string_pretty(&state).context("Failed to serialise state")?;
    println!("{json}");
    Ok(())
}

/// Map CLI args to `JobConfig`.
fn build_config(cli: &Cli) -> Result<JobConfig> {
    let default_format: OutputFormat = cli
        .default_format
        .parse()
        .context("Invalid --default-format")?;

    let mut builder = JobConfig::builder()
        .timeout_secs(cli.timeout)
        .max_attempts(cli.max_attempts)
        .default_format(default_format)
        .download_timeout_secs(cli.download_timeout);
    if let Some(ref dir) = cli.work_dir {
        builder = builder.work_dir(dir);
    }
    if let Some(ref dir) = cli.pdfium_lib_path {
        builder = builder.pdfium_lib_path(dir);
    }
    builder.build().context("Invalid configuration")
}

fn request_from_flags(cli: &Cli) -> JobRequest {
    JobRequest {
        source_url: cli.source_url.clone(),
        output_bucket: cli.bucket.clone(),
        output_prefix: cli.prefix.clone(),
        output_format: cli.format.clone(),
        dpi: cli.dpi,
        page: cli.page.map(PageValue::Number),
        quality: cli.quality,
        force: cli.force.then_some(true),
    }
}

fn read_event(source: &str) -> Result<serde_json::Value> {
    let raw = if source == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read event from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read event file {source}"))?
    };
    let value: serde_json::Value =
        serde_json::from_str(&raw).context("Event is not valid JSON")?;
    if !value.is_object() {
        bail!("Event must be a JSON object");
    }
    Ok(value)
}
