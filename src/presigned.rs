// src/presigned.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Pre-signed part URLs and the single HTTP PUT of a part against one.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use reqwest::header::{CONTENT_LENGTH, ETAG};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use crate::cancel::CancellationToken;
use crate::constants::DEFAULT_PUT_CHUNK_SIZE;
use crate::error::PartError;
use crate::http::HttpClientConfig;
use crate::store::MultipartStore;

/// Receives the cumulative number of body bytes written so far.
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Raw answer to a part PUT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResponse {
    pub status: u16,
    pub etag: Option<String>,
    /// Start of the response body, kept for error messages.
    pub body_excerpt: String,
}

/// Wire-level PUT of a byte buffer to a URL.
#[async_trait]
pub trait PartTransport: Send + Sync {
    /// Send `body` to `url`, reporting progress as it is written. Non-2xx
    /// statuses are returned, not raised; only transport failures are errors.
    async fn put(&self, url: &str, body: Bytes, on_progress: ProgressFn)
    -> Result<PutResponse, PartError>;
}

/// reqwest-based transport that streams the body in fixed-size chunks.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    chunk_size: usize,
}

impl ReqwestTransport {
    pub fn new(config: &HttpClientConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: config.build()?,
            chunk_size: DEFAULT_PUT_CHUNK_SIZE,
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

fn network_error(e: reqwest::Error) -> PartError {
    let kind = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connect"
    } else if e.is_body() {
        "body"
    } else {
        "request"
    };
    PartError::Network(format!("{} error: {}", kind, e))
}

#[async_trait]
impl PartTransport for ReqwestTransport {
    async fn put(
        &self,
        url: &str,
        body: Bytes,
        on_progress: ProgressFn,
    ) -> Result<PutResponse, PartError> {
        let total = body.len();
        let chunk_size = self.chunk_size;
        let chunks: Vec<Bytes> = (0..total)
            .step_by(chunk_size)
            .map(|start| body.slice(start..(start + chunk_size).min(total)))
            .collect();

        let mut sent = 0u64;
        let body_stream = stream::iter(chunks).map(move |chunk| {
            sent += chunk.len() as u64;
            on_progress(sent);
            Ok::<_, std::io::Error>(chunk)
        });

        // Pre-signed PUTs must not use chunked transfer encoding.
        let resp = self
            .client
            .put(url)
            .header(CONTENT_LENGTH, total)
            .body(reqwest::Body::wrap_stream(body_stream))
            .send()
            .await
            .map_err(network_error)?;

        let status = resp.status().as_u16();
        let etag = resp
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body_excerpt = if resp.status().is_success() {
            String::new()
        } else {
            let text = resp.text().await.unwrap_or_default();
            text.chars().take(512).collect()
        };

        Ok(PutResponse {
            status,
            etag,
            body_excerpt,
        })
    }
}

/// Signs part URLs through the store and PUTs part bytes against them.
///
/// Every PUT is registered with the cancellation token for its whole duration,
/// so cancelling closes the connection mid-transfer.
#[derive(Clone)]
pub struct PresignedPutClient {
    store: Arc<dyn MultipartStore>,
    transport: Arc<dyn PartTransport>,
    cancel: CancellationToken,
}

impl PresignedPutClient {
    pub fn new(
        store: Arc<dyn MultipartStore>,
        transport: Arc<dyn PartTransport>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            transport,
            cancel,
        }
    }

    pub async fn presign(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        ttl: Duration,
    ) -> Result<String, PartError> {
        self.store
            .presign_part_url(bucket, key, upload_id, part_number, ttl)
            .await
            .map_err(|e| PartError::Signing(format!("{:#}", e)))
    }

    /// PUT `bytes` to `url` and return the part's ETag.
    pub async fn put_range(
        &self,
        url: &str,
        bytes: Bytes,
        on_progress: ProgressFn,
    ) -> Result<String, PartError> {
        let len = bytes.len();
        let resp = self
            .cancel
            .run_abortable(self.transport.put(url, bytes, on_progress))
            .await??;

        if !(200..300).contains(&resp.status) {
            return Err(PartError::Http {
                status: resp.status,
                message: if resp.body_excerpt.is_empty() {
                    "part upload rejected".to_string()
                } else {
                    resp.body_excerpt
                },
            });
        }
        match resp.etag {
            Some(etag) if !etag.is_empty() => {
                trace!("PUT {} bytes -> {} ETag {}", len, resp.status, etag);
                Ok(etag)
            }
            _ => Err(PartError::Http {
                status: resp.status,
                message: "response carried no ETag".to_string(),
            }),
        }
    }
}
