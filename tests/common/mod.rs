// tests/common/mod.rs
//
// Common test utilities: an in-memory multipart store and a scriptable part
// transport, so the upload engine can be driven without a real endpoint.

#![allow(dead_code)]

use anyhow::{Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use s3mpu::{
    Decision, MultipartStore, PartError, PartResult, PartTransport, PartialFailureHandler,
    PartialFailureReport, ProgressFn, PutResponse, UploadConfig, UploadSource,
};

pub const MIB: u64 = 1024 * 1024;

/// Engine settings tuned for fast tests.
pub fn test_config(part_size: u64, concurrency: usize, max_retries: u32) -> UploadConfig {
    UploadConfig {
        part_size,
        concurrency,
        max_retries,
        retry_base_delay: Duration::from_millis(5),
        ..Default::default()
    }
}

/// Source of `size` zero bytes, allocated per read.
pub struct ZeroSource {
    pub size: u64,
}

#[async_trait]
impl UploadSource for ZeroSource {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read_range(&self, start: u64, end: u64) -> std::io::Result<Bytes> {
        Ok(Bytes::from(vec![0u8; (end - start) as usize]))
    }
}

// -----------------------------------------------------------------------------
// Store
// -----------------------------------------------------------------------------

#[derive(Default)]
pub struct MockStore {
    pub fail_initiate: bool,
    pub fail_complete: bool,
    pub fail_abort: bool,
    /// Number of presign calls to fail before succeeding.
    pub presign_failures: AtomicU32,

    pub initiate_calls: AtomicUsize,
    pub presign_calls: AtomicUsize,
    pub abort_calls: AtomicUsize,
    pub completions: Mutex<Vec<Vec<PartResult>>>,
    pub simple_puts: Mutex<Vec<(String, String, usize)>>,
    pub buckets: Mutex<HashSet<String>>,
}

impl MockStore {
    pub fn initiates(&self) -> usize {
        self.initiate_calls.load(Ordering::SeqCst)
    }

    pub fn aborts(&self) -> usize {
        self.abort_calls.load(Ordering::SeqCst)
    }

    pub fn completions(&self) -> Vec<Vec<PartResult>> {
        self.completions.lock().unwrap().clone()
    }
}

#[async_trait]
impl MultipartStore for MockStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.buckets.lock().unwrap().contains(bucket))
    }

    async fn create_bucket(&self, bucket: &str, _region: Option<&str>) -> Result<()> {
        self.buckets.lock().unwrap().insert(bucket.to_string());
        Ok(())
    }

    async fn initiate_multipart_upload(
        &self,
        _bucket: &str,
        _key: &str,
        _content_type: Option<&str>,
    ) -> Result<String> {
        self.initiate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_initiate {
            bail!("AccessDenied");
        }
        Ok("upload-1".to_string())
    }

    async fn presign_part_url(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        _ttl: Duration,
    ) -> Result<String> {
        self.presign_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .presign_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            bail!("RequestTimeTooSkewed");
        }
        Ok(format!(
            "mock://{bucket}/{key}?uploadId={upload_id}&partNumber={part_number}"
        ))
    }

    async fn complete_multipart_upload(
        &self,
        _bucket: &str,
        _key: &str,
        _upload_id: &str,
        parts: &[PartResult],
    ) -> Result<Option<String>> {
        self.completions.lock().unwrap().push(parts.to_vec());
        if self.fail_complete {
            bail!("InvalidPart");
        }
        Ok(Some("\"final-etag\"".to_string()))
    }

    async fn abort_multipart_upload(
        &self,
        _bucket: &str,
        _key: &str,
        _upload_id: &str,
    ) -> Result<()> {
        self.abort_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_abort {
            bail!("NoSuchUpload");
        }
        Ok(())
    }

    async fn put_object_simple(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        _content_type: Option<&str>,
    ) -> Result<Option<String>> {
        self.simple_puts
            .lock()
            .unwrap()
            .push((bucket.to_string(), key.to_string(), body.len()));
        Ok(Some("\"simple-etag\"".to_string()))
    }
}

// -----------------------------------------------------------------------------
// Transport
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    /// Fail the first `n` attempts with a connection reset, then succeed.
    FailTimes(u32),
    AlwaysFail,
    /// Answer with this HTTP status.
    Status(u16),
    /// Send half the body, then hang until aborted.
    Stall,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MockTransport {
    behaviors: Mutex<HashMap<u32, Behavior>>,
    default_behavior: Behavior,
    attempts: Mutex<HashMap<u32, u32>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    /// Per-chunk delay; scaled per part so completion order is shuffled.
    delay: Duration,
}

impl MockTransport {
    pub fn new(delay: Duration) -> Self {
        Self {
            behaviors: Mutex::new(HashMap::new()),
            default_behavior: Behavior::Succeed,
            attempts: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn with_default(mut self, behavior: Behavior) -> Self {
        self.default_behavior = behavior;
        self
    }

    pub fn with_part(self, part_number: u32, behavior: Behavior) -> Self {
        self.behaviors.lock().unwrap().insert(part_number, behavior);
        self
    }

    pub fn attempts(&self, part_number: u32) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(&part_number)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts.lock().unwrap().values().sum()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

pub fn part_number_of(url: &str) -> u32 {
    url.rsplit("partNumber=")
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl PartTransport for MockTransport {
    async fn put(
        &self,
        url: &str,
        body: Bytes,
        on_progress: ProgressFn,
    ) -> Result<PutResponse, PartError> {
        let part = part_number_of(url);
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(part).or_insert(0);
            *n += 1;
            *n
        };
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&part)
            .copied()
            .unwrap_or(self.default_behavior);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let len = body.len() as u64;
        let chunk_delay = self.delay * ((part * 7) % 5 + 1);
        let fails = match behavior {
            Behavior::FailTimes(n) => attempt <= n,
            Behavior::AlwaysFail => true,
            _ => false,
        };
        let chunks = if fails || behavior == Behavior::Stall { 2 } else { 4 };
        for i in 1..=chunks {
            tokio::time::sleep(chunk_delay).await;
            on_progress(len * i / 4);
        }

        match behavior {
            Behavior::Stall => futures::future::pending().await,
            Behavior::Status(status) => Ok(PutResponse {
                status,
                etag: None,
                body_excerpt: "<Error><Code>SignatureDoesNotMatch</Code></Error>".to_string(),
            }),
            _ if fails => Err(PartError::Network("connection reset by peer".to_string())),
            _ => Ok(PutResponse {
                status: 200,
                etag: Some(format!("\"etag-{part}\"")),
                body_excerpt: String::new(),
            }),
        }
    }
}

/// Records every partial-failure report and answers from a script, then
/// `Abort` once the script runs out.
#[derive(Default)]
pub struct RecordingHandler {
    pub reports: Mutex<Vec<PartialFailureReport>>,
    script: Mutex<VecDeque<Decision>>,
}

impl RecordingHandler {
    pub fn answering(decisions: &[Decision]) -> Arc<Self> {
        Arc::new(Self {
            reports: Mutex::new(Vec::new()),
            script: Mutex::new(decisions.iter().copied().collect()),
        })
    }

    pub fn calls(&self) -> usize {
        self.reports.lock().unwrap().len()
    }
}

impl PartialFailureHandler for RecordingHandler {
    fn on_partial_failure(&self, report: &PartialFailureReport) -> Decision {
        self.reports.lock().unwrap().push(report.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Decision::Abort)
    }
}
