// src/store.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! The storage operations the upload engine needs from an S3-compatible store.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// A successfully stored part. Produced exactly once per part number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartResult {
    pub part_number: u32,
    /// Opaque token returned by the store, passed back verbatim at completion.
    pub etag: String,
}

/// Store client used by the uploader and the multipart coordinator.
///
/// Object browsing, listing and configuration loading live elsewhere; this is
/// only the write path.
#[async_trait]
pub trait MultipartStore: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    /// Create `bucket`. An "already owned by you" answer counts as success.
    async fn create_bucket(&self, bucket: &str, region: Option<&str>) -> Result<()>;

    /// Start a multipart session and return its upload id.
    async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
    ) -> Result<String>;

    /// Time-limited URL allowing one PUT of `part_number` into the session.
    async fn presign_part_url(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        ttl: Duration,
    ) -> Result<String>;

    /// Assemble the object. `parts` must be sorted by part number.
    /// Returns the object's ETag when the store reports one.
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartResult],
    ) -> Result<Option<String>>;

    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()>;

    /// Single-shot PUT for objects below the multipart threshold.
    async fn put_object_simple(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<Option<String>>;
}
