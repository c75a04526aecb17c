//! Upload rendered pages to their deterministic output keys.

use crate::error::JobError;
use crate::keys;
use crate::pipeline::render::RenderedPage;
use crate::storage::ObjectStorage;
use tracing::debug;

/// A page that is now in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPage {
    pub page: usize,
    pub key: String,
    /// Filename used in the key, the manifest and the archive.
    pub filename: String,
    pub size: u64,
}

/// Upload one rendered page under `output_prefix`.
pub async fn publish_page(
    storage: &dyn ObjectStorage,
    bucket: &str,
    output_prefix: &str,
    name_root: &str,
    rendered: &RenderedPage,
) -> Result<PublishedPage, JobError> {
    let filename = keys::page_filename(name_root, rendered.page, rendered.encoding);
    let key = keys::output_key(output_prefix, &filename);

    let size = storage
        .upload_file(bucket, &key, &rendered.path, rendered.encoding.content_type())
        .await
        .map_err(|e| JobError::publish(format!("Failed to upload page {}: {}", rendered.page, e)))?;

    debug!("Published page {} → {}/{} ({} bytes)", rendered.page, bucket, key, size);

    Ok(PublishedPage {
        page: rendered.page,
        key,
        filename,
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageEncoding;
    use crate::error::FailureKind;
    use crate::storage::BucketStore;

    #[tokio::test]
    async fn uploads_to_derived_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page-2.jpg");
        std::fs::write(&path, b"jpegbytes").unwrap();
        let storage = BucketStore::in_memory();

        let published = publish_page(
            &storage,
            "b",
            "out/job1/",
            "doc",
            &RenderedPage {
                page: 2,
                path,
                encoding: ImageEncoding::Jpg,
            },
        )
        .await
        .unwrap();

        assert_eq!(published.key, "out/job1/doc-2.jpg");
        assert_eq!(published.filename, "doc-2.jpg");
        assert_eq!(published.size, 9);
        assert!(storage.exists("b", "out/job1/doc-2.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn missing_local_file_is_a_publish_failure() {
        let storage = BucketStore::in_memory();
        let err = publish_page(
            &storage,
            "b",
            "out",
            "doc",
            &RenderedPage {
                page: 1,
                path: "/nope/page-1.png".into(),
                encoding: ImageEncoding::Png,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, FailureKind::Publish);
    }
}
