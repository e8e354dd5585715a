// src/retry.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Bounded, linearly backed-off retries for a single part.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cancel::CancellationToken;
use crate::error::PartError;
use crate::planner::Part;
use crate::presigned::PresignedPutClient;
use crate::progress::ProgressAggregator;
use crate::source::UploadSource;
use crate::store::PartResult;

/// Identifies the multipart session parts are uploaded into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTarget {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
}

/// Uploads one part, retrying failures with `attempt * base_delay` backoff.
#[derive(Clone)]
pub struct RetryingPartUploader {
    client: PresignedPutClient,
    source: Arc<dyn UploadSource>,
    progress: Arc<ProgressAggregator>,
    cancel: CancellationToken,
    target: Arc<SessionTarget>,
    presign_ttl: Duration,
    base_delay: Duration,
}

impl RetryingPartUploader {
    pub fn new(
        client: PresignedPutClient,
        source: Arc<dyn UploadSource>,
        progress: Arc<ProgressAggregator>,
        cancel: CancellationToken,
        target: Arc<SessionTarget>,
        presign_ttl: Duration,
        base_delay: Duration,
    ) -> Self {
        Self {
            client,
            source,
            progress,
            cancel,
            target,
            presign_ttl,
            base_delay,
        }
    }

    /// Upload `part`, making at most `max_retries + 1` attempts.
    ///
    /// Returns `Cancelled` as soon as the token is raised, without further
    /// attempts, and `PartUploadFailed` carrying the last error once the
    /// attempts are used up.
    pub async fn upload(&self, part: Part, max_retries: u32) -> Result<PartResult, PartError> {
        let mut last_error = None;

        for attempt in 0..=max_retries {
            if self.cancel.is_cancelled() {
                return Err(PartError::Cancelled);
            }
            if attempt > 0 {
                let delay = self.base_delay * attempt;
                debug!(
                    "Part {} retry {}/{} in {:?}",
                    part.part_number, attempt, max_retries, delay
                );
                tokio::select! {
                    _ = self.cancel.cancelled() => return Err(PartError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                self.progress.reset_part(part.part_number);
            }

            match self.attempt(part).await {
                Ok(etag) => {
                    return Ok(PartResult {
                        part_number: part.part_number,
                        etag,
                    });
                }
                Err(PartError::Cancelled) => return Err(PartError::Cancelled),
                Err(e) => {
                    warn!(
                        "Part {} attempt {}/{} failed: {}",
                        part.part_number,
                        attempt + 1,
                        max_retries + 1,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(PartError::PartUploadFailed {
            part_number: part.part_number,
            last_error: Box::new(
                last_error.unwrap_or_else(|| PartError::Network("no attempt made".to_string())),
            ),
        })
    }

    async fn attempt(&self, part: Part) -> Result<String, PartError> {
        let url = self
            .client
            .presign(
                &self.target.bucket,
                &self.target.key,
                &self.target.upload_id,
                part.part_number,
                self.presign_ttl,
            )
            .await?;

        let bytes = self
            .source
            .read_range(part.start, part.end)
            .await
            .map_err(|e| PartError::Source(e.to_string()))?;

        let progress = Arc::clone(&self.progress);
        let part_number = part.part_number;
        self.client
            .put_range(
                &url,
                bytes,
                Arc::new(move |sent| progress.record_part_progress(part_number, sent)),
            )
            .await
    }
}
