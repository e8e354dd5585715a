// src/http/client.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// HTTP client used for PUTs against pre-signed part URLs

use anyhow::{Context, Result};
use reqwest::ClientBuilder;
use std::time::Duration;
use tracing::debug;

/// HTTP client configuration for pre-signed part uploads
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Maximum idle connections kept per host
    pub max_idle_per_host: usize,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Whole-request timeout for a single part PUT
    pub request_timeout: Duration,
    /// TCP keepalive settings
    pub tcp_keepalive: Option<Duration>,
    /// Pool idle timeout
    pub pool_idle_timeout: Option<Duration>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 32,
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(300),
            tcp_keepalive: Some(Duration::from_secs(60)),
            pool_idle_timeout: Some(Duration::from_secs(90)),
        }
    }
}

impl HttpClientConfig {
    /// Scale the per-request timeout to the part size, assuming a floor of
    /// 1 MiB/s, but never below the default.
    pub fn for_part_size(part_size: u64) -> Self {
        let mut cfg = Self::default();
        let secs = part_size / (1024 * 1024);
        cfg.request_timeout = cfg.request_timeout.max(Duration::from_secs(secs));
        cfg
    }

    /// Build the underlying reqwest client.
    pub fn build(&self) -> Result<reqwest::Client> {
        let mut builder = ClientBuilder::new()
            .pool_max_idle_per_host(self.max_idle_per_host)
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            // S3 does not speak HTTP/2
            .http1_only()
            .tcp_nodelay(true)
            .use_rustls_tls();

        if let Some(keepalive) = self.tcp_keepalive {
            builder = builder.tcp_keepalive(keepalive);
        }
        if let Some(idle_timeout) = self.pool_idle_timeout {
            builder = builder.pool_idle_timeout(idle_timeout);
        }

        debug!(
            "Building part PUT client: connect_timeout={:?}, request_timeout={:?}",
            self.connect_timeout, self.request_timeout
        );
        builder.build().context("Failed to build HTTP client")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_creation() {
        assert!(HttpClientConfig::default().build().is_ok());
    }

    #[test]
    fn test_timeout_scales_with_part_size() {
        let small = HttpClientConfig::for_part_size(5 * 1024 * 1024);
        assert_eq!(small.request_timeout, Duration::from_secs(300));
        let huge = HttpClientConfig::for_part_size(1024 * 1024 * 1024);
        assert_eq!(huge.request_timeout, Duration::from_secs(1024));
    }
}
