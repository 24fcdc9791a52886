// crates/tidepool-backup/src/s3_store.rs
// ============================================================================
// Module: S3 Object Store
// Description: ObjectStore implementation on S3-compatible storage.
// Purpose: Hold backup archives as private objects with integrity metadata.
// Dependencies: aws-config, aws-sdk-s3, sha2, tidepool-core, tokio
// ============================================================================

//! ## Overview
//! Archives upload as private objects with a SHA-256 digest stored in
//! object metadata. Download access goes exclusively through presigned
//! URLs with a caller-supplied TTL; the bucket itself is never public.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::Client;
use aws_sdk_s3::presigning::PresigningConfig;
use sha2::Digest;
use sha2::Sha256;
use tidepool_core::ObjectStore;
use tidepool_core::StorageError;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for S3-backed archive storage.
///
/// # Invariants
/// - `bucket` is non-empty; `prefix`, when set, has no leading slash.
#[derive(Debug, Clone)]
pub struct S3ObjectStoreConfig {
    /// Bucket name.
    pub bucket: String,
    /// AWS region (optional; falls back to environment configuration).
    pub region: Option<String>,
    /// Custom endpoint URL (for S3-compatible stores).
    pub endpoint: Option<String>,
    /// Force path-style addressing (for S3-compatible stores).
    pub force_path_style: bool,
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// S3-backed archive store.
pub struct S3ObjectStore {
    /// S3 client handle.
    client: Client,
    /// Bucket name for archive storage.
    bucket: String,
}

impl std::fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore").field("bucket", &self.bucket).finish_non_exhaustive()
    }
}

impl S3ObjectStore {
    /// Creates a store from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Invalid`] when the bucket is unset.
    pub async fn new(config: S3ObjectStoreConfig) -> Result<Self, StorageError> {
        if config.bucket.trim().is_empty() {
            return Err(StorageError::Invalid("bucket must be set".to_string()));
        }
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared_config = loader.load().await;
        let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if config.force_path_style {
            s3_builder = s3_builder.force_path_style(true);
        }
        Ok(Self {
            client: Client::from_conf(s3_builder.build()),
            bucket: config.bucket,
        })
    }

    /// Computes the SHA-256 digest of a file as lowercase hex.
    fn compute_sha256(path: &Path) -> Result<String, StorageError> {
        let mut file =
            std::fs::File::open(path).map_err(|err| StorageError::Io(err.to_string()))?;
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 8192];
        loop {
            let read =
                file.read(&mut buffer).map_err(|err| StorageError::Io(err.to_string()))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[.. read]);
        }
        let digest = hasher.finalize();
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            out.push_str(&format!("{byte:02x}"));
        }
        Ok(out)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(
        &self,
        local_path: &Path,
        object_key: &str,
    ) -> Result<String, StorageError> {
        if object_key.is_empty() || object_key.contains("..") {
            return Err(StorageError::Invalid(format!("object key invalid: {object_key}")));
        }
        let digest = Self::compute_sha256(local_path)?;
        let body = aws_sdk_s3::primitives::ByteStream::from_path(local_path)
            .await
            .map_err(|err| StorageError::Io(err.to_string()))?;
        let mut metadata = HashMap::new();
        metadata.insert("sha256".to_string(), digest);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(object_key)
            .body(body)
            .set_metadata(Some(metadata))
            .content_type("application/gzip")
            .send()
            .await
            .map_err(|err| StorageError::Backend(err.to_string()))?;
        Ok(object_key.to_string())
    }

    async fn signed_download_url(
        &self,
        object_id: &str,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|err| StorageError::Invalid(err.to_string()))?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(object_id)
            .presigned(presigning)
            .await
            .map_err(|err| StorageError::Backend(err.to_string()))?;
        Ok(presigned.uri().to_string())
    }
}
