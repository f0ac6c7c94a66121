use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::presigning::PresigningConfig;
use s3::primitives::ByteStream;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::{StorageConfig, StorageProvider};
use crate::error::AppError;

/// StorageError
///
/// Failure modes shared by every storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => AppError::NotFound("File not found in storage".to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

// 1. StorageService Contract
/// StorageService
///
/// Defines the abstract contract for all interactions with the object storage layer.
/// Handlers address objects by key only; the concrete backend decides whether a key
/// maps to a file under the upload directory or to an object in an S3-compatible
/// bucket (AWS S3, Cloudflare R2, MinIO).
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Prepares the backing store: creates the upload directory, or the bucket when
    /// running against a local MinIO. Failures are logged, not returned.
    async fn ensure_bucket_exists(&self);

    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError>;

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Removes an object. Deleting a missing key is not an error.
    async fn delete_object(&self, key: &str) -> Result<(), StorageError>;

    /// The URL clients use to fetch a public object.
    fn public_url(&self, key: &str) -> String;

    /// A temporary URL granting read access to a private object.
    async fn signed_url(&self, key: &str, expires_in: Duration) -> Result<String, StorageError>;
}

/// sanitize_key
///
/// Utility function to prevent path traversal attacks by removing directory
/// navigation components (e.g., `..`, `.`) from a user-provided key segment.
pub fn sanitize_key(key: &str) -> String {
    key.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

// 2. Local Disk Implementation
/// LocalStorage
///
/// Stores objects as files below `root`. Files are published by the router's
/// `/uploads` static mount, so public URLs point there.
#[derive(Clone)]
pub struct LocalStorage {
    root: PathBuf,
    base_url: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(sanitize_key(key))
    }
}

#[async_trait]
impl StorageService for LocalStorage {
    async fn ensure_bucket_exists(&self) {
        if let Err(e) = tokio::fs::create_dir_all(&self.root).await {
            tracing::error!("Failed to create upload directory {:?}: {}", self.root, e);
        }
    }

    async fn put_object(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/uploads/{}", self.base_url, sanitize_key(key))
    }

    /// Local files have no access control of their own; the public URL is returned.
    async fn signed_url(&self, key: &str, _expires_in: Duration) -> Result<String, StorageError> {
        Ok(self.public_url(key))
    }
}

// 3. The S3-Compatible Implementation (S3/R2/MinIO)
/// S3StorageClient
///
/// The concrete implementation using the AWS SDK for S3. Due to S3 compatibility,
/// this client transparently handles connections to:
/// - **Local:** Dockerized MinIO instance.
/// - **Production:** AWS S3 or Cloudflare R2 (custom endpoint, region `auto`).
///
/// The `force_path_style(true)` is required for MinIO and R2 endpoints.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
    region: String,
    endpoint: Option<String>,
    cdn_url: Option<String>,
}

impl S3StorageClient {
    /// new
    ///
    /// Constructs the S3 client using credentials and configuration from `StorageConfig`.
    pub fn new(config: &StorageConfig) -> Self {
        let credentials =
            s3::config::Credentials::new(&config.access_key, &config.secret_key, None, None, "static");

        let mut builder = s3::Config::builder()
            .credentials_provider(credentials)
            .region(s3::config::Region::new(config.region.clone()))
            .behavior_version_latest()
            .force_path_style(true);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: s3::Client::from_conf(builder.build()),
            bucket_name: config.bucket.clone(),
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
            cdn_url: config.cdn_url.clone(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    /// ensure_bucket_exists
    ///
    /// Calls the S3 CreateBucket API. An existing bucket makes the call fail, which is
    /// expected and only logged at debug level.
    async fn ensure_bucket_exists(&self) {
        if let Err(e) = self.client.create_bucket().bucket(&self.bucket_name).send().await {
            tracing::debug!("create_bucket for {} skipped: {}", self.bucket_name, e);
        }
    }

    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::Backend(e.to_string())
                }
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    /// public_url
    ///
    /// CDN base first, then the custom endpoint (path style), then the AWS virtual-host URL.
    fn public_url(&self, key: &str) -> String {
        if let Some(cdn) = &self.cdn_url {
            format!("{}/{}", cdn.trim_end_matches('/'), key)
        } else if let Some(endpoint) = &self.endpoint {
            format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.bucket_name, key)
        } else {
            format!("https://{}.s3.{}.amazonaws.com/{}", self.bucket_name, self.region, key)
        }
    }

    async fn signed_url(&self, key: &str, expires_in: Duration) -> Result<String, StorageError> {
        let presigning =
            PresigningConfig::expires_in(expires_in).map_err(|e| StorageError::Backend(e.to_string()))?;

        let presigned_req = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(presigned_req.uri().to_string())
    }
}

// 4. The Mock Implementation (For Tests)
/// MockStorageService
///
/// An in-memory implementation of `StorageService` used by the integration tests, so
/// the media handlers can be exercised without a disk layout or a network connection.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, all operations return a simulated failure.
    pub should_fail: bool,
    objects: Arc<Mutex<HashMap<String, (Vec<u8>, String)>>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects.lock().await.get(key).map(|(_, ct)| ct.clone())
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError::Backend(
                "Mock Storage Error: Simulation requested".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        self.check()?;
        self.objects
            .lock()
            .await
            .insert(sanitize_key(key), (bytes, content_type.to_string()));
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.check()?;
        self.objects
            .lock()
            .await
            .get(&sanitize_key(key))
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.check()?;
        self.objects.lock().await.remove(&sanitize_key(key));
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("http://localhost:9000/mock-bucket/{}", sanitize_key(key))
    }

    async fn signed_url(&self, key: &str, _expires_in: Duration) -> Result<String, StorageError> {
        self.check()?;
        Ok(format!("{}?signature=fake", self.public_url(key)))
    }
}

/// StorageState
///
/// The concrete type used to share the storage service access across the application state.
pub type StorageState = Arc<dyn StorageService>;

/// Builds the backend selected by `STORAGE_PROVIDER`.
pub fn from_config(config: &StorageConfig, media_service_url: &str) -> StorageState {
    match config.provider {
        StorageProvider::Local => Arc::new(LocalStorage::new(&config.upload_path, media_service_url)),
        StorageProvider::S3 | StorageProvider::R2 => Arc::new(S3StorageClient::new(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_traversal() {
        assert_eq!(sanitize_key("../../etc/passwd"), "etc/passwd");
        assert_eq!(sanitize_key("media/./a.png"), "media/a.png");
        assert_eq!(sanitize_key("..\\windows\\a.png"), "windows/a.png");
    }

    #[tokio::test]
    async fn local_storage_round_trip() {
        let root = std::env::temp_dir().join(format!("blog-cms-test-{}", uuid::Uuid::new_v4()));
        let storage = LocalStorage::new(&root, "http://localhost:3000/");

        storage
            .put_object("media/hello.txt", b"hi".to_vec(), "text/plain")
            .await
            .unwrap();
        assert_eq!(storage.get_object("media/hello.txt").await.unwrap(), b"hi");
        assert_eq!(
            storage.public_url("media/hello.txt"),
            "http://localhost:3000/uploads/media/hello.txt"
        );

        storage.delete_object("media/hello.txt").await.unwrap();
        storage.delete_object("media/hello.txt").await.unwrap();
        assert!(matches!(
            storage.get_object("media/hello.txt").await,
            Err(StorageError::NotFound(_))
        ));

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn failing_mock_reports_backend_error() {
        let storage = MockStorageService::new_failing();
        let err = storage.put_object("a", vec![1], "image/png").await.unwrap_err();
        assert!(err.to_string().contains("Simulation requested"));
    }
}
