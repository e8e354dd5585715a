// src/s3_client.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Lazily-built, process-wide AWS S3 client configured from the environment.

use anyhow::{Context, Result, bail};
use aws_config::meta::region::RegionProviderChain;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_s3::{Client, config::Region};
use aws_smithy_http_client::tls;
use aws_smithy_http_client::tls::rustls_provider::CryptoMode;
use std::path::Path;
use std::{env, fs, time::Duration};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::constants::DEFAULT_REGION;

static CLIENT: OnceCell<Client> = OnceCell::const_new();

/// Create a TLS context using a CA bundle file
fn tls_context_from_pem(filename: impl AsRef<Path>) -> Result<tls::TlsContext> {
    let pem_contents = fs::read(&filename).with_context(|| {
        format!(
            "Failed to read CA bundle file: {}",
            filename.as_ref().display()
        )
    })?;

    let trust_store = tls::TrustStore::empty().with_pem_certificate(pem_contents.as_slice());

    tls::TlsContext::builder()
        .with_trust_store(trust_store)
        .build()
        .with_context(|| {
            format!(
                "Failed to build TLS context from PEM {}",
                filename.as_ref().display()
            )
        })
}

/// Operation timeout for simple PUTs and the multipart control calls.
fn get_operation_timeout() -> Duration {
    env::var("S3MPU_OPERATION_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(300))
}

/// Async getter for the global S3 client; initializes once.
pub async fn aws_s3_client_async() -> Result<Client> {
    let client_ref = CLIENT
        .get_or_try_init(|| async {
            dotenvy::dotenv().ok();

            if env::var("AWS_ACCESS_KEY_ID").is_err() || env::var("AWS_SECRET_ACCESS_KEY").is_err()
            {
                bail!("Missing AWS_ACCESS_KEY_ID or AWS_SECRET_ACCESS_KEY");
            }

            let http_client = match env::var("AWS_CA_BUNDLE_PATH") {
                Ok(ca_bundle_path) if !ca_bundle_path.is_empty() => {
                    debug!("Loading CA bundle from: {}", ca_bundle_path);
                    let tls_context = tls_context_from_pem(&ca_bundle_path)?;
                    Some(
                        aws_smithy_http_client::Builder::new()
                            .tls_provider(tls::Provider::Rustls(CryptoMode::AwsLc))
                            .tls_context(tls_context)
                            .build_https(),
                    )
                }
                _ => None,
            };

            let region =
                RegionProviderChain::first_try(env::var("AWS_REGION").ok().map(Region::new))
                    .or_default_provider()
                    .or_else(Region::new(DEFAULT_REGION));

            let mut loader =
                aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);
            if let Ok(endpoint) = env::var("AWS_ENDPOINT_URL") {
                if !endpoint.is_empty() {
                    loader = loader.endpoint_url(endpoint);
                }
            }

            let timeout_config = TimeoutConfig::builder()
                .connect_timeout(Duration::from_secs(5))
                .operation_timeout(get_operation_timeout())
                .build();

            let mut config_builder = loader.timeout_config(timeout_config);
            if let Some(client) = http_client {
                config_builder = config_builder.http_client(client);
            }
            let cfg = config_builder.load().await;

            // Path-style addressing: virtual-hosted buckets don't resolve on
            // custom endpoints (MinIO, Ceph, ...).
            let s3_config = aws_sdk_s3::config::Builder::from(&cfg)
                .force_path_style(true)
                .build();
            Ok::<_, anyhow::Error>(Client::from_conf(s3_config))
        })
        .await?;

    Ok(client_ref.clone())
}
