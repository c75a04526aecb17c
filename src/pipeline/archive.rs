//! Bundle multi-page output into a single zip and publish it.
//!
//! Packing is blocking file I/O plus deflate, so it runs on the blocking
//! pool like rendering does.

use crate::error::JobError;
use crate::keys;
use crate::storage::ObjectStorage;
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const CONTENT_TYPE: &str = "application/zip";

/// The uploaded archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedArchive {
    pub key: String,
    pub filename: String,
    pub size: u64,
}

/// Write `entries` (local path, name inside the archive) into a deflated
/// zip at `dest`. Returns the archive size in bytes.
pub fn build_archive(entries: &[(PathBuf, String)], dest: &Path) -> io::Result<u64> {
    let mut zip = ZipWriter::new(BufWriter::new(File::create(dest)?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (path, name) in entries {
        zip.start_file(name.as_str(), options).map_err(io::Error::other)?;
        let mut reader = BufReader::new(File::open(path)?);
        io::copy(&mut reader, &mut zip)?;
    }

    let mut writer = zip.finish().map_err(io::Error::other)?;
    io::Write::flush(&mut writer)?;
    drop(writer);

    Ok(std::fs::metadata(dest)?.len())
}

/// Pack the pages and upload the archive to `{prefix}/{name_root}.zip`.
pub async fn publish_archive(
    storage: &dyn ObjectStorage,
    bucket: &str,
    output_prefix: &str,
    name_root: &str,
    entries: Vec<(PathBuf, String)>,
    work_dir: &Path,
) -> Result<PublishedArchive, JobError> {
    let filename = keys::archive_filename(name_root);
    let local = work_dir.join(&filename);
    let dest = local.clone();
    let count = entries.len();

    tokio::task::spawn_blocking(move || build_archive(&entries, &dest))
        .await
        .map_err(|e| JobError::internal(format!("Archive task panicked: {e}")))?
        .map_err(|e| JobError::archive(format!("Failed to build archive: {e}")))?;

    let key = keys::output_key(output_prefix, &filename);
    let size = storage
        .upload_file(bucket, &key, &local, CONTENT_TYPE)
        .await
        .map_err(|e| JobError::archive(format!("Failed to upload archive: {e}")))?;

    debug!("Published archive of {} pages → {}/{} ({} bytes)", count, bucket, key, size);

    Ok(PublishedArchive {
        key,
        filename,
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::BucketStore;
    use std::io::Read;

    fn pages(dir: &Path) -> Vec<(PathBuf, String)> {
        (1..=2)
            .map(|n| {
                let p = dir.join(format!("page-{n}.png"));
                std::fs::write(&p, format!("page {n}")).unwrap();
                (p, format!("doc-{n}.png"))
            })
            .collect()
    }

    #[test]
    fn archive_contains_named_entries() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("doc.zip");
        let size = build_archive(&pages(dir.path()), &dest).unwrap();
        assert!(size > 0);

        let mut zip = zip::ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        assert_eq!(zip.len(), 2);
        let mut body = String::new();
        zip.by_name("doc-2.png")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "page 2");
    }

    #[tokio::test]
    async fn publishes_under_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let storage = BucketStore::in_memory();
        let published = publish_archive(
            &storage,
            "b",
            "out/job1",
            "doc",
            pages(dir.path()),
            dir.path(),
        )
        .await
        .unwrap();
        assert_eq!(published.key, "out/job1/doc.zip");
        assert_eq!(published.filename, "doc.zip");
        assert!(storage.exists("b", "out/job1/doc.zip").await.unwrap());
    }

    #[tokio::test]
    async fn missing_page_file_is_an_archive_failure() {
        let dir = tempfile::tempdir().unwrap();
        let storage = BucketStore::in_memory();
        let err = publish_archive(
            &storage,
            "b",
            "out",
            "doc",
            vec![(dir.path().join("gone.png"), "doc-1.png".into())],
            dir.path(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, crate::error::FailureKind::Archive);
    }
}
