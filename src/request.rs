//! Invocation requests: the raw event and its validated form.
//!
//! The scheduler delivers a loosely-typed JSON event. [`JobRequest`] mirrors
//! it field for field; [`JobRequest::validate`] turns it into a
//! [`ValidatedRequest`] or fails with [`Pdf2ImageError::InvalidRequest`]
//! before any state is touched.
//!
//! Only shape is checked here. Value-set checks on dpi and quality belong to
//! the renderer and surface as recorded `validation` failures.

use crate::config::{JobConfig, OutputFormat, PageSelector};
use crate::error::Pdf2ImageError;
use crate::keys;
use crate::state::RequestParams;
use serde::{Deserialize, Serialize};

/// The raw invocation event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub output_bucket: Option<String>,
    #[serde(default)]
    pub output_prefix: Option<String>,
    #[serde(default)]
    pub output_format: Option<String>,
    #[serde(default)]
    pub dpi: Option<u32>,
    #[serde(default)]
    pub page: Option<PageValue>,
    #[serde(default)]
    pub quality: Option<u8>,
    #[serde(default)]
    pub force: Option<bool>,
}

/// A page number as sent by callers: either a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageValue {
    Number(i64),
    Text(String),
}

/// Where the source document lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    /// `http://` or `https://` URL.
    Http(String),
    /// `s3://bucket/key` object.
    Object { bucket: String, key: String },
}

impl SourceLocation {
    /// Classify a source URL.
    pub fn parse(url: &str) -> Result<Self, Pdf2ImageError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            return Ok(SourceLocation::Http(url.to_string()));
        }
        if let Some(rest) = url.strip_prefix("s3://") {
            return match rest.split_once('/') {
                Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
                    Ok(SourceLocation::Object {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    })
                }
                _ => Err(Pdf2ImageError::InvalidRequest(format!(
                    "source_url '{url}' must have the form s3://bucket/key"
                ))),
            };
        }
        Err(Pdf2ImageError::InvalidRequest(format!(
            "source_url '{url}' is not an http(s):// or s3:// URL"
        )))
    }
}

/// A request whose shape has been checked and whose defaults are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub source_url: String,
    pub source: SourceLocation,
    pub bucket: String,
    pub prefix: String,
    pub format: OutputFormat,
    pub dpi: u32,
    pub page: PageSelector,
    pub quality: Option<u8>,
    pub force: bool,
}

impl JobRequest {
    /// Parse a raw JSON event.
    pub fn from_event(event: serde_json::Value) -> Result<Self, Pdf2ImageError> {
        serde_json::from_value(event)
            .map_err(|e| Pdf2ImageError::InvalidRequest(format!("Malformed event: {e}")))
    }

    /// Check required fields and apply configured defaults.
    pub fn validate(&self, config: &JobConfig) -> Result<ValidatedRequest, Pdf2ImageError> {
        let source_url = non_empty(self.source_url.as_deref())
            .ok_or_else(|| Pdf2ImageError::InvalidRequest("source_url is required".into()))?;

        let (bucket, prefix) = match (
            non_empty(self.output_bucket.as_deref()),
            non_empty(self.output_prefix.as_deref()),
        ) {
            (Some(b), Some(p)) => (b, p),
            _ => {
                return Err(Pdf2ImageError::InvalidRequest(
                    "output_bucket and output_prefix are required".into(),
                ))
            }
        };

        let source = SourceLocation::parse(source_url)?;

        let format = match non_empty(self.output_format.as_deref()) {
            Some(f) => f.parse()?,
            None => config.default_format,
        };

        Ok(ValidatedRequest {
            source_url: source_url.to_string(),
            source,
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            format,
            dpi: self.dpi.unwrap_or(config.default_dpi),
            page: resolve_page(self.page.as_ref())?,
            quality: self.quality,
            force: self.force.unwrap_or(false),
        })
    }
}

impl ValidatedRequest {
    /// Key of this job's state record.
    pub fn state_key(&self) -> String {
        keys::state_key(&self.prefix)
    }

    /// Stem used for page and archive filenames.
    pub fn name_root(&self) -> String {
        keys::name_root(&self.source_url)
    }

    /// The normalised parameters recorded in the state.
    pub fn params(&self) -> RequestParams {
        RequestParams {
            source_url: self.source_url.clone(),
            format: self.format,
            dpi: self.dpi,
            page: self.page.page(),
            quality: self.quality,
        }
    }
}

fn non_empty(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

fn resolve_page(page: Option<&PageValue>) -> Result<PageSelector, Pdf2ImageError> {
    let n = match page {
        None => return Ok(PageSelector::All),
        Some(PageValue::Number(n)) => *n,
        Some(PageValue::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| Pdf2ImageError::InvalidRequest("page must be an integer".into()))?,
    };
    if n <= 0 {
        return Err(Pdf2ImageError::InvalidRequest(format!(
            "page must be >= 1, got {n}"
        )));
    }
    let n = usize::try_from(n)
        .map_err(|_| Pdf2ImageError::InvalidRequest(format!("page {n} is too large")))?;
    Ok(PageSelector::Single(n))
}
