//! Deterministic storage key derivation.
//!
//! Every key a job touches is a pure function of the request's output prefix
//! and source URL. Two invocations of the same job therefore always write
//! the same objects, which is what makes overlapping runs harmless.

use crate::config::ImageEncoding;

/// Suffix appended to the output prefix to locate the state record.
pub const STATE_SUFFIX: &str = ".state.json";

/// Basename used when the source URL has none.
const DEFAULT_FILENAME: &str = "document.pdf";

/// Key of the state record for an output prefix: `out/job1/` → `out/job1.state.json`.
pub fn state_key(output_prefix: &str) -> String {
    format!("{}{}", output_prefix.trim_end_matches('/'), STATE_SUFFIX)
}

/// Key of an artifact under an output prefix: `out/job1/` + `a.png` → `out/job1/a.png`.
pub fn output_key(output_prefix: &str, filename: &str) -> String {
    format!("{}/{}", output_prefix.trim_end_matches('/'), filename)
}

/// Filename stem derived from the source URL (query string stripped).
///
/// `https://x/reports/q3.pdf?sig=1` → `q3`; a URL ending in `/` → `document`.
pub fn name_root(source_url: &str) -> String {
    let path = source_url.split(['?', '#']).next().unwrap_or_default();
    let base = path.rsplit('/').next().unwrap_or_default();
    let filename = if base.is_empty() { DEFAULT_FILENAME } else { base };
    match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => filename.to_string(),
    }
}

/// Filename of a rendered page (1-based page number).
pub fn page_filename(name_root: &str, page: usize, encoding: ImageEncoding) -> String {
    format!("{}-{}.{}", name_root, page, encoding.extension())
}

/// Filename of the multi-page archive.
pub fn archive_filename(name_root: &str) -> String {
    format!("{name_root}.zip")
}
