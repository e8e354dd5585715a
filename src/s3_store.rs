// src/s3_store.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! `MultipartStore` backed by the AWS Rust SDK.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
};
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;

use crate::s3_client::aws_s3_client_async;
use crate::store::{MultipartStore, PartResult};

/// S3 (or S3-compatible) store.
#[derive(Clone, Debug)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build on the shared client configured from the `AWS_*` environment.
    pub async fn from_env() -> Result<Self> {
        Ok(Self::new(aws_s3_client_async().await?))
    }
}

#[async_trait]
impl MultipartStore for S3Store {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let status = e.raw_response().map(|r| r.status().as_u16());
                if status == Some(404)
                    || e.code() == Some("NotFound")
                    || e.code() == Some("NoSuchBucket")
                {
                    Ok(false)
                } else {
                    Err(anyhow::Error::new(e).context(format!("HeadBucket {} failed", bucket)))
                }
            }
        }
    }

    async fn create_bucket(&self, bucket: &str, region: Option<&str>) -> Result<()> {
        let mut req = self.client.create_bucket().bucket(bucket);
        // us-east-1 is the implicit location and must not be sent as a constraint.
        if let Some(region) = region.filter(|r| *r != "us-east-1") {
            req = req.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }
        match req.send().await {
            Ok(_) => Ok(()),
            Err(e) => match e.code() {
                Some("BucketAlreadyOwnedByYou") => {
                    debug!("Bucket {} already owned by caller", bucket);
                    Ok(())
                }
                _ => Err(anyhow::Error::new(e).context(format!("CreateBucket {} failed", bucket))),
            },
        }
    }

    async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
    ) -> Result<String> {
        let mut req = self.client.create_multipart_upload().bucket(bucket).key(key);
        if let Some(ct) = content_type {
            req = req.content_type(ct);
        }
        let resp = req.send().await.context("CreateMultipartUpload failed")?;
        let upload_id = resp.upload_id().unwrap_or_default().to_string();
        if upload_id.is_empty() {
            bail!("CreateMultipartUpload returned empty upload_id");
        }
        Ok(upload_id)
    }

    async fn presign_part_url(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        ttl: Duration,
    ) -> Result<String> {
        let presigning = PresigningConfig::expires_in(ttl).context("invalid presign TTL")?;
        let presigned = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number as i32)
            .presigned(presigning)
            .await
            .with_context(|| format!("presigning UploadPart {} failed", part_number))?;
        Ok(presigned.uri().to_string())
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartResult],
    ) -> Result<Option<String>> {
        let completed_parts: Vec<CompletedPart> = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .e_tag(p.etag.clone())
                    .part_number(p.part_number as i32)
                    .build()
            })
            .collect();
        let cmu = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        let resp = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(cmu)
            .send()
            .await
            .context("CompleteMultipartUpload failed")?;
        Ok(resp.e_tag().map(|s| s.to_string()))
    }

    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .context("AbortMultipartUpload failed")?;
        Ok(())
    }

    async fn put_object_simple(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<Option<String>> {
        let mut req = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body));
        if let Some(ct) = content_type {
            req = req.content_type(ct);
        }
        let resp = req.send().await.context("PutObject failed")?;
        Ok(resp.e_tag().map(|s| s.to_string()))
    }
}
