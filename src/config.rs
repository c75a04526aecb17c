//! Configuration types for PDF-to-image jobs.
//!
//! Every knob that used to be a process-wide setting (rendering defaults,
//! timeout, attempt limit, record schema version) lives in one immutable
//! [`JobConfig`], built via its [`JobConfigBuilder`] and handed to the
//! admission engine and the execution pipeline explicitly.

use crate::error::Pdf2ImageError;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Resolutions the renderer accepts.
pub const VALID_DPI_VALUES: [u32; 8] = [72, 96, 110, 150, 200, 250, 300, 600];

/// JPEG qualities the renderer accepts.
pub const VALID_QUALITY_VALUES: [u8; 10] = [10, 20, 30, 40, 50, 60, 70, 80, 90, 100];

/// Fixed resolution of the `small-jpg` preset.
pub const SMALL_JPG_DPI: u32 = 110;

/// Fixed quality of the `small-jpg` preset.
pub const SMALL_JPG_QUALITY: u8 = 50;

/// Current version of the persisted state record format.
pub const STATE_SCHEMA_VERSION: u32 = 1;

/// Configuration shared by every invocation handled by a
/// [`crate::job::JobRunner`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2image::{JobConfig, OutputFormat};
///
/// let config = JobConfig::builder()
///     .timeout_secs(600)
///     .max_attempts(5)
///     .default_format(OutputFormat::Jpg)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_attempts, 5);
/// ```
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Seconds after which a `pending` record is presumed dead. Default: 900.
    ///
    /// Should exceed the longest legitimate run, otherwise a slow but alive
    /// worker gets a duplicate started next to it.
    pub timeout_secs: u64,

    /// Failed executions tolerated before a job is refused. Default: 3.
    pub max_attempts: u32,

    /// Schema version written into every record. Default: [`STATE_SCHEMA_VERSION`].
    ///
    /// Records carrying a different version have their attempt counter
    /// forgiven, so bumping this after a fix lets exhausted jobs run again.
    pub schema_version: u32,

    /// Output format when the request names none. Default: png.
    pub default_format: OutputFormat,

    /// Resolution when the request names none. Default: 150.
    pub default_dpi: u32,

    /// JPEG quality when a jpg request names none. Default: 80.
    pub default_jpg_quality: u8,

    /// Download timeout for HTTP sources in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Parent directory for per-invocation scratch space. Default: system temp dir.
    pub work_dir: Option<PathBuf>,

    /// Directory containing the pdfium shared library. Default: system library.
    pub pdfium_lib_path: Option<PathBuf>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 900,
            max_attempts: 3,
            schema_version: STATE_SCHEMA_VERSION,
            default_format: OutputFormat::default(),
            default_dpi: 150,
            default_jpg_quality: 80,
            download_timeout_secs: 120,
            work_dir: None,
            pdfium_lib_path: None,
        }
    }
}

impl JobConfig {
    /// Create a new builder for `JobConfig`.
    pub fn builder() -> JobConfigBuilder {
        JobConfigBuilder {
            config: Self::default(),
        }
    }

    /// The pending timeout as a signed duration for timestamp arithmetic.
    pub fn timeout(&self) -> TimeDelta {
        i64::try_from(self.timeout_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }
}

/// Builder for [`JobConfig`].
#[derive(Debug)]
pub struct JobConfigBuilder {
    config: JobConfig,
}

impl JobConfigBuilder {
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn schema_version(mut self, v: u32) -> Self {
        self.config.schema_version = v;
        self
    }

    pub fn default_format(mut self, format: OutputFormat) -> Self {
        self.config.default_format = format;
        self
    }

    pub fn default_dpi(mut self, dpi: u32) -> Self {
        self.config.default_dpi = dpi;
        self
    }

    pub fn default_jpg_quality(mut self, quality: u8) -> Self {
        self.config.default_jpg_quality = quality;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = Some(dir.into());
        self
    }

    pub fn pdfium_lib_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(dir.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<JobConfig, Pdf2ImageError> {
        let c = &self.config;
        if c.timeout_secs == 0 {
            return Err(Pdf2ImageError::InvalidConfig(
                "Timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_attempts == 0 {
            return Err(Pdf2ImageError::InvalidConfig(
                "Max attempts must be ≥ 1".into(),
            ));
        }
        if !VALID_DPI_VALUES.contains(&c.default_dpi) {
            return Err(Pdf2ImageError::InvalidConfig(format!(
                "Default DPI must be one of {:?}, got {}",
                VALID_DPI_VALUES, c.default_dpi
            )));
        }
        if !VALID_QUALITY_VALUES.contains(&c.default_jpg_quality) {
            return Err(Pdf2ImageError::InvalidConfig(format!(
                "Default JPEG quality must be one of {:?}, got {}",
                VALID_QUALITY_VALUES, c.default_jpg_quality
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Requested output format.
///
/// `SmallJpg` is a preset, not an encoding: it renders JPEG at a fixed low
/// resolution and quality for thumbnails and previews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    #[default]
    #[serde(rename = "png")]
    Png,
    #[serde(rename = "jpg")]
    Jpg,
    #[serde(rename = "small-jpg", alias = "small.jpg")]
    SmallJpg,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpg => "jpg",
            OutputFormat::SmallJpg => "small-jpg",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = Pdf2ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "jpg" | "jpeg" => Ok(OutputFormat::Jpg),
            "small-jpg" | "small.jpg" => Ok(OutputFormat::SmallJpg),
            other => Err(Pdf2ImageError::InvalidRequest(format!(
                "Unsupported output format: {other}"
            ))),
        }
    }
}

/// Encoding actually written to disk once presets are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageEncoding {
    Png,
    Jpg,
}

impl ImageEncoding {
    /// File extension used in output keys.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageEncoding::Png => "png",
            ImageEncoding::Jpg => "jpg",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageEncoding::Png => "image/png",
            ImageEncoding::Jpg => "image/jpeg",
        }
    }
}

/// Specifies which pages of the PDF to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageSelector {
    /// Render every page (default).
    #[default]
    All,
    /// Render one page (1-indexed).
    Single(usize),
}

impl PageSelector {
    /// Expand the selector into 0-indexed page numbers.
    ///
    /// A single page beyond the end of the document is clamped to the last
    /// page, so a request for "page 9" of a 3-page file yields page 3.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        if total_pages == 0 {
            return vec![];
        }
        match self {
            PageSelector::All => (0..total_pages).collect(),
            PageSelector::Single(p) => vec![(*p).clamp(1, total_pages) - 1],
        }
    }

    pub fn page(&self) -> Option<usize> {
        match self {
            PageSelector::All => None,
            PageSelector::Single(p) => Some(*p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = JobConfig::builder().build().expect("defaults must validate");
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.timeout_secs, 900);
        assert_eq!(config.schema_version, STATE_SCHEMA_VERSION);
        assert_eq!(config.default_format, OutputFormat::Png);
    }

    #[test]
    fn rejects_zero_attempts_and_timeout() {
        assert!(JobConfig::builder().max_attempts(0).build().is_err());
        assert!(JobConfig::builder().timeout_secs(0).build().is_err());
    }

    #[test]
    fn rejects_unsupported_default_dpi() {
        let err = JobConfig::builder().default_dpi(123).build().unwrap_err();
        assert!(err.to_string().contains("123"));
    }

    #[test]
    fn output_format_parsing() {
        assert_eq!("PNG".parse::<OutputFormat>().unwrap(), OutputFormat::Png);
        assert_eq!("jpeg".parse::<OutputFormat>().unwrap(), OutputFormat::Jpg);
        assert_eq!(
            "small.jpg".parse::<OutputFormat>().unwrap(),
            OutputFormat::SmallJpg
        );
        assert!("tiff".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn output_format_serde_accepts_legacy_alias() {
        let f: OutputFormat = serde_json::from_str("\"small.jpg\"").unwrap();
        assert_eq!(f, OutputFormat::SmallJpg);
        assert_eq!(serde_json::to_string(&f).unwrap(), "\"small-jpg\"");
    }

    #[test]
    fn page_selector_to_indices() {
        assert_eq!(PageSelector::All.to_indices(3), vec![0, 1, 2]);
        assert_eq!(PageSelector::Single(2).to_indices(3), vec![1]);
        assert_eq!(PageSelector::Single(9).to_indices(3), vec![2]);
        assert_eq!(PageSelector::All.to_indices(0), Vec::<usize>::new());
    }
}
