// src/uploader.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Entry point for uploading one file: picks the single-shot path for small
//! sources and the multipart coordinator for everything else.

use anyhow::{Context, bail};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::cancel::CancellationToken;
use crate::config::UploadConfig;
use crate::coordinator::{
    PartialFailureHandler, PlannedUpload, UploadCoordinator, UploadOutcome, UploadState,
};
use crate::error::{UploadError, UploadResult};
use crate::http::HttpClientConfig;
use crate::presigned::{PartTransport, ReqwestTransport};
use crate::progress::ProgressAggregator;
use crate::s3_store::S3Store;
use crate::source::{FileSource, UploadSource};
use crate::store::MultipartStore;

/// Which path an upload takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    Simple,
    Multipart,
}

enum Prepared {
    Simple {
        bucket: String,
        key: String,
        source: Arc<dyn UploadSource>,
    },
    Multipart {
        coordinator: UploadCoordinator,
        planned: PlannedUpload,
    },
}

/// An upload whose path is decided and whose progress can be polled.
pub struct PreparedUpload {
    progress: Arc<ProgressAggregator>,
    inner: Prepared,
}

impl PreparedUpload {
    pub fn mode(&self) -> UploadMode {
        match self.inner {
            Prepared::Simple { .. } => UploadMode::Simple,
            Prepared::Multipart { .. } => UploadMode::Multipart,
        }
    }

    pub fn progress(&self) -> Arc<ProgressAggregator> {
        Arc::clone(&self.progress)
    }

    /// State of the multipart state machine; `None` on the simple path.
    pub fn state(&self) -> Option<watch::Receiver<UploadState>> {
        match &self.inner {
            Prepared::Simple { .. } => None,
            Prepared::Multipart { coordinator, .. } => Some(coordinator.subscribe()),
        }
    }
}

/// Uploads files into an S3-compatible store.
pub struct Uploader {
    store: Arc<dyn MultipartStore>,
    transport: Arc<dyn PartTransport>,
    config: UploadConfig,
    handler: Arc<dyn PartialFailureHandler>,
    cancel: CancellationToken,
}

impl Uploader {
    pub fn new(
        store: Arc<dyn MultipartStore>,
        transport: Arc<dyn PartTransport>,
        config: UploadConfig,
        handler: Arc<dyn PartialFailureHandler>,
    ) -> UploadResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            transport,
            config,
            handler,
            cancel: CancellationToken::new(),
        })
    }

    /// S3 store from the `AWS_*` environment and a reqwest part transport.
    pub async fn from_env(
        config: UploadConfig,
        handler: Arc<dyn PartialFailureHandler>,
    ) -> anyhow::Result<Self> {
        let store = S3Store::from_env().await?;
        let transport = ReqwestTransport::new(&HttpClientConfig::for_part_size(config.part_size))?;
        Ok(Self::new(Arc::new(store), Arc::new(transport), config, handler)?)
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Raising this token cancels whatever upload is running.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn MultipartStore> {
        Arc::clone(&self.store)
    }

    /// Make sure `bucket` exists, creating it when `create` is set.
    pub async fn ensure_bucket(
        &self,
        bucket: &str,
        region: Option<&str>,
        create: bool,
    ) -> anyhow::Result<()> {
        if self.store.bucket_exists(bucket).await? {
            return Ok(());
        }
        if !create {
            bail!("bucket {} does not exist (pass --create-bucket to create it)", bucket);
        }
        info!("Creating bucket {}", bucket);
        self.store
            .create_bucket(bucket, region)
            .await
            .with_context(|| format!("failed to create bucket {}", bucket))
    }

    /// Decide the path for `source` and allocate its progress counters.
    pub fn prepare(
        &self,
        source: Arc<dyn UploadSource>,
        bucket: &str,
        key: &str,
    ) -> UploadResult<PreparedUpload> {
        let size = source.size();
        if size > self.config.max_file_size {
            return Err(UploadError::InvalidConfiguration(format!(
                "file of {} bytes exceeds the maximum of {} bytes",
                size, self.config.max_file_size
            )));
        }

        if size < self.config.multipart_threshold {
            debug!(
                "{} bytes < threshold {}, using single PUT",
                size, self.config.multipart_threshold
            );
            return Ok(PreparedUpload {
                progress: Arc::new(ProgressAggregator::new(1, size)),
                inner: Prepared::Simple {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    source,
                },
            });
        }

        let coordinator = UploadCoordinator::new(
            Arc::clone(&self.store),
            Arc::clone(&self.transport),
            self.config.clone(),
            Arc::clone(&self.handler),
        )
        .with_cancellation(self.cancel.clone());
        let planned = coordinator.plan(source, bucket, key)?;
        Ok(PreparedUpload {
            progress: planned.progress(),
            inner: Prepared::Multipart {
                coordinator,
                planned,
            },
        })
    }

    pub async fn execute(&self, prepared: PreparedUpload) -> UploadResult<UploadOutcome> {
        match prepared.inner {
            Prepared::Simple {
                bucket,
                key,
                source,
            } => {
                self.upload_simple(&bucket, &key, source, &prepared.progress)
                    .await
            }
            Prepared::Multipart {
                coordinator,
                planned,
            } => coordinator.run(planned).await,
        }
    }

    /// Upload a local file to `bucket/key`.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        bucket: &str,
        key: &str,
    ) -> UploadResult<UploadOutcome> {
        let source = FileSource::open(path).await?;
        let prepared = self.prepare(Arc::new(source), bucket, key)?;
        self.execute(prepared).await
    }

    async fn upload_simple(
        &self,
        bucket: &str,
        key: &str,
        source: Arc<dyn UploadSource>,
        progress: &ProgressAggregator,
    ) -> UploadResult<UploadOutcome> {
        let started_at = SystemTime::now();
        if self.cancel.is_cancelled() {
            return Err(UploadError::UploadCancelled);
        }
        let size = source.size();
        let body = source.read_range(0, size).await?;

        let put = self.store.put_object_simple(
            bucket,
            key,
            body,
            self.config.content_type.as_deref(),
        );
        let e_tag = tokio::select! {
            _ = self.cancel.cancelled() => return Err(UploadError::UploadCancelled),
            res = put => res.map_err(|e| UploadError::SimpleUploadFailed(format!("{:#}", e)))?,
        };
        progress.record_part_progress(1, size);
        info!("Uploaded {} bytes to s3://{}/{}", size, bucket, key);

        Ok(UploadOutcome {
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id: None,
            e_tag,
            total_bytes: size,
            parts: 1,
            retry_rounds: 0,
            started_at,
            completed_at: SystemTime::now(),
        })
    }
}
