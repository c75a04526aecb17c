//! Source fetching: bring the input document into the invocation's scratch
//! directory.
//!
//! pdfium needs a file-system path, so the document is always materialised
//! on disk. The file lives inside the invocation's `TempDir`, which removes
//! it on every exit path.
//!
//! Every failure here is a recorded `fetch` failure, never a fatal error:
//! a 404 or a vanished input object is a legitimate job outcome.

use crate::error::{JobError, Pdf2ImageError};
use crate::request::SourceLocation;
use crate::storage::ObjectStorage;
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

/// Name of the downloaded document inside the scratch directory.
const SOURCE_FILENAME: &str = "source.pdf";

/// Fetches a source document to a local file.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Write the document into `dest_dir` and return its path.
    async fn fetch(&self, source: &SourceLocation, dest_dir: &Path) -> Result<PathBuf, JobError>;
}

/// Default fetcher: HTTP(S) via reqwest, `s3://` via the object storage.
pub struct SourceFetcher {
    client: reqwest::Client,
    storage: Arc<dyn ObjectStorage>,
    timeout_secs: u64,
}

impl SourceFetcher {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        timeout_secs: u64,
    ) -> Result<Self, Pdf2ImageError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Pdf2ImageError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            storage,
            timeout_secs,
        })
    }

    /// Stream an HTTP body to disk.
    async fn download_url(&self, url: &str, dest: &Path) -> Result<(), JobError> {
        info!("Downloading source from: {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                JobError::fetch(format!(
                    "Download timed out after {}s for '{}'",
                    self.timeout_secs, url
                ))
            } else {
                JobError::fetch(format!("Failed to download '{url}': {e}"))
            }
        })?;

        if !response.status().is_success() {
            return Err(JobError::fetch(format!(
                "Could not download input file, status {}",
                response.status().as_u16()
            )));
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| JobError::internal(format!("Failed to create source file: {e}")))?;

        let mut written: u64 = 0;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk
                .map_err(|e| JobError::fetch(format!("Failed to download '{url}': {e}")))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| JobError::internal(format!("Failed to write source file: {e}")))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| JobError::internal(format!("Failed to write source file: {e}")))?;

        debug!("Downloaded {} bytes to {}", written, dest.display());
        Ok(())
    }

    /// Copy an object from storage to disk.
    async fn download_object(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), JobError> {
        info!("Reading source from: s3://{}/{}", bucket, key);

        let body = self
            .storage
            .get(bucket, key)
            .await
            .map_err(|e| JobError::fetch(format!("Failed to read s3://{bucket}/{key}: {e}")))?
            .ok_or_else(|| JobError::fetch("input file not found"))?;

        tokio::fs::write(dest, &body)
            .await
            .map_err(|e| JobError::internal(format!("Failed to write source file: {e}")))?;

        debug!("Copied {} bytes to {}", body.len(), dest.display());
        Ok(())
    }
}

#[async_trait]
impl DocumentFetcher for SourceFetcher {
    async fn fetch(&self, source: &SourceLocation, dest_dir: &Path) -> Result<PathBuf, JobError> {
        let dest = dest_dir.join(SOURCE_FILENAME);
        match source {
            SourceLocation::Http(url) => self.download_url(url, &dest).await?,
            SourceLocation::Object { bucket, key } => {
                self.download_object(bucket, key, &dest).await?
            }
        }
        verify_pdf_magic(&dest).await?;
        Ok(dest)
    }
}

/// Reject files that do not start with `%PDF`.
///
/// Catching this here gives a readable error instead of an opaque pdfium
/// load failure. Files shorter than four bytes are left to the renderer.
pub async fn verify_pdf_magic(path: &Path) -> Result<(), JobError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| JobError::internal(format!("Failed to open source file: {e}")))?;
    let mut magic = [0u8; 4];
    match file.read_exact(&mut magic).await {
        Ok(_) if &magic != b"%PDF" => Err(JobError::fetch(format!(
            "Source is not a valid PDF, first bytes: {magic:?}"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::storage::BucketStore;
    use bytes::Bytes;

    #[tokio::test]
    async fn magic_accepts_pdf_and_rejects_html() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("a.pdf");
        std::fs::write(&pdf, b"%PDF-1.7\n...").unwrap();
        assert!(verify_pdf_magic(&pdf).await.is_ok());

        let html = dir.path().join("b.pdf");
        std::fs::write(&html, b"<html>").unwrap();
        let err = verify_pdf_magic(&html).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Fetch);
    }

    #[tokio::test]
    async fn object_source_is_copied() {
        let storage = Arc::new(BucketStore::in_memory());
        storage
            .put(
                "in",
                "docs/a.pdf",
                Bytes::from_static(b"%PDF-1.4 body"),
                "application/pdf",
            )
            .await
            .unwrap();
        let fetcher = SourceFetcher::new(storage, 5).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let path = fetcher
            .fetch(
                &SourceLocation::Object {
                    bucket: "in".into(),
                    key: "docs/a.pdf".into(),
                },
                dir.path(),
            )
            .await
            .unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"%PDF-1.4 body");
    }

    #[tokio::test]
    async fn missing_object_source_is_not_found() {
        let fetcher = SourceFetcher::new(Arc::new(BucketStore::in_memory()), 5).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = fetcher
            .fetch(
                &SourceLocation::Object {
                    bucket: "in".into(),
                    key: "missing.pdf".into(),
                },
                dir.path(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, JobError::fetch("input file not found"));
    }
}
