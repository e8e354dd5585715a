// src/config.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Runtime parameters for the upload engine.

use std::env;
use std::time::Duration;

use tracing::warn;

use crate::constants::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_RETRIES, DEFAULT_MULTIPART_THRESHOLD,
    DEFAULT_PART_SIZE, DEFAULT_PRESIGN_TTL, DEFAULT_RETRY_BASE_DELAY, MAX_PRESIGN_TTL,
    MAX_S3_MULTIPART_PART_SIZE, MIN_S3_MULTIPART_PART_SIZE,
};
use crate::error::{UploadError, UploadResult};

/// Settings consumed by the uploader and the multipart coordinator.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Size of each part in bytes (>= 5 MiB).
    pub part_size: u64,
    /// Number of concurrent part workers.
    pub concurrency: usize,
    /// Retries per part after the first attempt.
    pub max_retries: u32,
    /// Backoff unit; the wait before retry `n` is `n * retry_base_delay`.
    pub retry_base_delay: Duration,
    /// Files smaller than this go through a single PUT.
    pub multipart_threshold: u64,
    /// Files larger than this are refused.
    pub max_file_size: u64,
    /// Lifetime of each pre-signed part URL.
    pub presign_ttl: Duration,
    /// Optional content-type for the stored object.
    pub content_type: Option<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            presign_ttl: DEFAULT_PRESIGN_TTL,
            content_type: None,
        }
    }
}

impl UploadConfig {
    /// Defaults overridden by `S3MPU_*` environment variables (and `.env`).
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut cfg = Self::default();
        if let Some(v) = env_parse::<u64>("S3MPU_PART_SIZE") {
            cfg.part_size = v;
        }
        if let Some(v) = env_parse::<usize>("S3MPU_CONCURRENCY") {
            cfg.concurrency = v;
        }
        if let Some(v) = env_parse::<u32>("S3MPU_MAX_RETRIES") {
            cfg.max_retries = v;
        }
        if let Some(v) = env_duration("S3MPU_RETRY_DELAY") {
            cfg.retry_base_delay = v;
        }
        if let Some(v) = env_parse::<u64>("S3MPU_MULTIPART_THRESHOLD") {
            cfg.multipart_threshold = v;
        }
        if let Some(v) = env_parse::<u64>("S3MPU_MAX_FILE_SIZE") {
            cfg.max_file_size = v;
        }
        if let Some(v) = env_duration("S3MPU_PRESIGN_TTL") {
            cfg.presign_ttl = v;
        }
        if let Ok(v) = env::var("S3MPU_CONTENT_TYPE") {
            if !v.is_empty() {
                cfg.content_type = Some(v);
            }
        }
        cfg
    }

    pub fn with_part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_multipart_threshold(mut self, threshold: u64) -> Self {
        self.multipart_threshold = threshold;
        self
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> UploadResult<()> {
        if self.part_size < MIN_S3_MULTIPART_PART_SIZE {
            return Err(UploadError::InvalidConfiguration(format!(
                "part_size {} is below the store minimum of {} bytes",
                self.part_size, MIN_S3_MULTIPART_PART_SIZE
            )));
        }
        if self.part_size > MAX_S3_MULTIPART_PART_SIZE {
            return Err(UploadError::InvalidConfiguration(format!(
                "part_size {} exceeds the store maximum of {} bytes",
                self.part_size, MAX_S3_MULTIPART_PART_SIZE
            )));
        }
        if self.concurrency == 0 {
            return Err(UploadError::InvalidConfiguration(
                "concurrency must be >= 1".to_string(),
            ));
        }
        if self.multipart_threshold == 0 {
            return Err(UploadError::InvalidConfiguration(
                "multipart_threshold must be >= 1".to_string(),
            ));
        }
        if self.presign_ttl < Duration::from_secs(1) || self.presign_ttl > MAX_PRESIGN_TTL {
            return Err(UploadError::InvalidConfiguration(format!(
                "presign_ttl {} must be between 1s and {}",
                humantime::format_duration(self.presign_ttl),
                humantime::format_duration(MAX_PRESIGN_TTL)
            )));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid number", name, raw);
            None
        }
    }
}

fn env_duration(name: &str) -> Option<Duration> {
    let raw = env::var(name).ok()?;
    match humantime::parse_duration(raw.trim()) {
        Ok(d) => Some(d),
        Err(e) => {
            warn!("Ignoring {}={:?}: {}", name, raw, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(UploadConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_small_part_size() {
        let cfg = UploadConfig::default().with_part_size(1024 * 1024);
        assert!(matches!(
            cfg.validate(),
            Err(UploadError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn rejects_zero_concurrency() {
        let cfg = UploadConfig::default().with_concurrency(0);
        assert!(matches!(
            cfg.validate(),
            Err(UploadError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn rejects_excessive_ttl() {
        let cfg = UploadConfig {
            presign_ttl: Duration::from_secs(8 * 24 * 60 * 60),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
