//! Object storage adapter.
//!
//! The job engine only needs four operations: read an object (or learn it
//! is absent), probe for existence, write bytes, and upload a local file.
//! [`ObjectStorage`] is that seam; [`BucketStore`] implements it on top of
//! the `object_store` crate so the same code runs against S3, a local
//! directory tree, or memory (tests).
//!
//! Absence is a value (`Ok(None)` / `Ok(false)`), never an error. Only
//! transport and backend failures produce a [`StorageError`].

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectStore, PutMultipartOpts, PutOptions, PutPayload,
    WriteMultipart,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Failures talking to object storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("failed to read local file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid storage location: {0}")]
    InvalidLocation(String),
}

/// Minimal object-storage interface used by the job engine.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Read an object; `Ok(None)` when it does not exist.
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Bytes>, StorageError>;

    /// Cheap existence probe.
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError>;

    /// Write (or overwrite) an object.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// Upload a local file and return its size in bytes.
    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<u64, StorageError> {
        let body = tokio::fs::read(path)
            .await
            .map_err(|source| StorageError::ReadFile {
                path: path.to_path_buf(),
                source,
            })?;
        let size = body.len() as u64;
        self.put(bucket, key, Bytes::from(body), content_type).await?;
        Ok(size)
    }
}

/// Which backend a [`BucketStore`] resolves buckets against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// Amazon S3 (or compatible), credentials and region from `AWS_*` env vars.
    S3,
    /// Local directory tree: bucket `b` maps to `<root>/b`.
    Fs(PathBuf),
    /// Process-local memory. Data is lost when the store is dropped.
    Memory,
}

/// Files at least this large are uploaded in parts.
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 16 * 1024 * 1024;

/// Part size for multipart uploads. S3 requires at least 5 MiB per part.
pub const DEFAULT_MULTIPART_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Parts uploaded concurrently by one multipart upload.
const MULTIPART_CONCURRENCY: usize = 4;

/// [`ObjectStorage`] over `object_store`, one store per bucket.
///
/// Stores are created on first use and cached for the lifetime of the
/// `BucketStore`, so a memory backend keeps its contents across calls.
pub struct BucketStore {
    backend: StorageBackend,
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
    multipart_threshold: u64,
    multipart_chunk_size: usize,
}

impl std::fmt::Debug for BucketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketStore")
            .field("backend", &self.backend)
            .field("multipart_threshold", &self.multipart_threshold)
            .finish()
    }
}

impl BucketStore {
    pub fn new(backend: StorageBackend) -> Self {
        Self {
            backend,
            stores: Mutex::new(HashMap::new()),
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            multipart_chunk_size: DEFAULT_MULTIPART_CHUNK_SIZE,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(StorageBackend::Memory)
    }

    /// Upload files of `threshold` bytes or more in parts of `chunk_size`.
    pub fn with_multipart(mut self, threshold: u64, chunk_size: usize) -> Self {
        self.multipart_threshold = threshold;
        self.multipart_chunk_size = chunk_size.max(1);
        self
    }

    pub fn backend(&self) -> &StorageBackend {
        &self.backend
    }

    fn cached(&self, bucket: &str) -> Option<Arc<dyn ObjectStore>> {
        let stores = self.stores.lock().unwrap_or_else(|e| e.into_inner());
        stores.get(bucket).cloned()
    }

    async fn store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
        if bucket.is_empty() || bucket.contains('/') || bucket == "." || bucket == ".." {
            return Err(StorageError::InvalidLocation(format!(
                "bad bucket name '{bucket}'"
            )));
        }

        if let Some(store) = self.cached(bucket) {
            return Ok(store);
        }

        // Built without the lock held: the fs backend touches the disk.
        let store: Arc<dyn ObjectStore> = match &self.backend {
            StorageBackend::S3 => Arc::new(
                AmazonS3Builder::from_env()
                    .with_bucket_name(bucket)
                    .build()?,
            ),
            StorageBackend::Fs(root) => {
                let dir = root.join(bucket);
                tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                    StorageError::InvalidLocation(format!(
                        "failed to create {}: {}",
                        dir.display(),
                        e
                    ))
                })?;
                Arc::new(LocalFileSystem::new_with_prefix(&dir)?)
            }
            StorageBackend::Memory => Arc::new(InMemory::new()),
        };

        // A concurrent first use may have won the race; keep its store so
        // every caller sees the same memory backend.
        let mut stores = self.stores.lock().unwrap_or_else(|e| e.into_inner());
        let store = Arc::clone(stores.entry(bucket.to_string()).or_insert(store));
        debug!("Resolved object store for bucket '{}'", bucket);
        Ok(store)
    }

    fn attributes(&self, content_type: &str) -> Attributes {
        let mut attributes = Attributes::new();
        // LocalFileSystem rejects attributes outright.
        if !matches!(self.backend, StorageBackend::Fs(_)) {
            attributes.insert(
                Attribute::ContentType,
                AttributeValue::from(content_type.to_string()),
            );
        }
        attributes
    }

    /// Stream a local file to storage part by part.
    async fn upload_multipart(
        &self,
        store: &dyn ObjectStore,
        location: &ObjectPath,
        path: &Path,
        content_type: &str,
    ) -> Result<u64, StorageError> {
        let read_err = |source| StorageError::ReadFile {
            path: path.to_path_buf(),
            source,
        };
        let mut file = tokio::fs::File::open(path).await.map_err(read_err)?;

        let opts = PutMultipartOpts {
            attributes: self.attributes(content_type),
            ..Default::default()
        };
        let upload = store.put_multipart_opts(location, opts).await?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, self.multipart_chunk_size);

        let mut buf = vec![0u8; self.multipart_chunk_size];
        let mut size: u64 = 0;
        loop {
            let n = match file.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    let _ = writer.abort().await;
                    return Err(read_err(e));
                }
            };
            if let Err(e) = writer.wait_for_capacity(MULTIPART_CONCURRENCY).await {
                let _ = writer.abort().await;
                return Err(e.into());
            }
            writer.write(&buf[..n]);
            size += n as u64;
        }
        writer.finish().await?;
        Ok(size)
    }
}

#[async_trait]
impl ObjectStorage for BucketStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Bytes>, StorageError> {
        let store = self.store(bucket).await?;
        match store.get(&ObjectPath::from(key)).await {
            Ok(result) => Ok(Some(result.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        let store = self.store(bucket).await?;
        match store.head(&ObjectPath::from(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let store = self.store(bucket).await?;
        let len = body.len();
        let opts = PutOptions {
            attributes: self.attributes(content_type),
            ..Default::default()
        };
        store
            .put_opts(&ObjectPath::from(key), PutPayload::from(body), opts)
            .await?;
        debug!("Stored {} bytes at {}/{}", len, bucket, key);
        Ok(())
    }

    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<u64, StorageError> {
        let len = tokio::fs::metadata(path)
            .await
            .map_err(|source| StorageError::ReadFile {
                path: path.to_path_buf(),
                source,
            })?
            .len();

        if len < self.multipart_threshold {
            let body = tokio::fs::read(path)
                .await
                .map_err(|source| StorageError::ReadFile {
                    path: path.to_path_buf(),
                    source,
                })?;
            let size = body.len() as u64;
            self.put(bucket, key, Bytes::from(body), content_type).await?;
            return Ok(size);
        }

        let store = self.store(bucket).await?;
        let size = self
            .upload_multipart(store.as_ref(), &ObjectPath::from(key), path, content_type)
            .await?;
        debug!("Uploaded {} bytes in parts to {}/{}", size, bucket, key);
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_get_absent_then_present() {
        let store = BucketStore::in_memory();
        assert_eq!(store.get("b", "k.json").await.unwrap(), None);
        assert!(!store.exists("b", "k.json").await.unwrap());

        store
            .put("b", "k.json", Bytes::from_static(b"{}"), "application/json")
            .await
            .unwrap();

        assert_eq!(
            store.get("b", "k.json").await.unwrap(),
            Some(Bytes::from_static(b"{}"))
        );
        assert!(store.exists("b", "k.json").await.unwrap());
    }

    #[tokio::test]
    async fn buckets_are_isolated() {
        let store = BucketStore::in_memory();
        store
            .put("a", "x", Bytes::from_static(b"1"), "text/plain")
            .await
            .unwrap();
        assert!(store.exists("a", "x").await.unwrap());
        assert!(!store.exists("b", "x").await.unwrap());
    }

    #[tokio::test]
    async fn fs_backend_writes_under_bucket_dir() {
        let root = tempfile::tempdir().unwrap();
        let store = BucketStore::new(StorageBackend::Fs(root.path().to_path_buf()));

        let src = root.path().join("page.png");
        std::fs::write(&src, b"not really a png").unwrap();

        let size = store
            .upload_file("out", "job1/page.png", &src, "image/png")
            .await
            .unwrap();
        assert_eq!(size, 16);
        assert!(root.path().join("out/job1/page.png").exists());
        assert!(store.exists("out", "job1/page.png").await.unwrap());
    }

    #[tokio::test]
    async fn rejects_bad_bucket_names() {
        let store = BucketStore::in_memory();
        assert!(matches!(
            store.get("", "k").await,
            Err(StorageError::InvalidLocation(_))
        ));
        assert!(store.exists("a/b", "k").await.is_err());
    }

    #[tokio::test]
    async fn upload_missing_file_fails() {
        let store = BucketStore::in_memory();
        let err = store
            .upload_file("b", "k", Path::new("/definitely/not/here.png"), "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ReadFile { .. }));
    }

    fn numbered_file(dir: &Path, len: usize) -> (PathBuf, Vec<u8>) {
        let body: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let path = dir.join("big.zip");
        std::fs::write(&path, &body).unwrap();
        (path, body)
    }

    #[tokio::test]
    async fn large_upload_goes_in_parts_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        let (src, body) = numbered_file(dir.path(), 45);
        let store = BucketStore::in_memory().with_multipart(16, 10);

        let size = store
            .upload_file("b", "job1/big.zip", &src, "application/zip")
            .await
            .unwrap();
        assert_eq!(size, 45);
        assert_eq!(
            store.get("b", "job1/big.zip").await.unwrap(),
            Some(Bytes::from(body))
        );
    }

    #[tokio::test]
    async fn large_upload_goes_in_parts_to_fs() {
        let root = tempfile::tempdir().unwrap();
        let (src, body) = numbered_file(root.path(), 45);
        let store = BucketStore::new(StorageBackend::Fs(root.path().to_path_buf()))
            .with_multipart(16, 10);

        let size = store
            .upload_file("out", "job1/big.zip", &src, "application/zip")
            .await
            .unwrap();
        assert_eq!(size, 45);
        assert_eq!(
            std::fs::read(root.path().join("out/job1/big.zip")).unwrap(),
            body
        );
    }

    #[tokio::test]
    async fn upload_below_threshold_is_a_single_put() {
        let dir = tempfile::tempdir().unwrap();
        let (src, body) = numbered_file(dir.path(), 15);
        let store = BucketStore::in_memory().with_multipart(16, 10);

        let size = store
            .upload_file("b", "small.zip", &src, "application/zip")
            .await
            .unwrap();
        assert_eq!(size, 15);
        assert_eq!(
            store.get("b", "small.zip").await.unwrap(),
            Some(Bytes::from(body))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_use_of_a_bucket_shares_one_store() {
        let root = tempfile::tempdir().unwrap();
        let store = Arc::new(BucketStore::new(StorageBackend::Fs(
            root.path().to_path_buf(),
        )));
        let memory = Arc::new(BucketStore::in_memory());

        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            let memory = Arc::clone(&memory);
            tasks.push(tokio::spawn(async move {
                let key = format!("k{i}");
                let body = Bytes::from(format!("v{i}"));
                store.put("fresh", &key, body.clone(), "text/plain").await?;
                memory.put("fresh", &key, body, "text/plain").await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        for i in 0..16 {
            let key = format!("k{i}");
            assert!(store.exists("fresh", &key).await.unwrap());
            // Every writer must have landed in the same in-memory store.
            assert_eq!(
                memory.get("fresh", &key).await.unwrap(),
                Some(Bytes::from(format!("v{i}")))
            );
        }
    }
}
