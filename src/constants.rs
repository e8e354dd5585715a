// src/constants.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Centralized constants for s3mpu to avoid hardcoded values throughout the codebase

use std::time::Duration;

/// Minimum S3 multipart upload part size (5 MiB - AWS requirement)
pub const MIN_S3_MULTIPART_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum S3 multipart upload part size (5 GiB - AWS limit)
pub const MAX_S3_MULTIPART_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Maximum number of parts in a multipart upload
pub const MAX_MULTIPART_PARTS: u64 = 10_000;

/// Default multipart upload part size (5 MiB)
pub const DEFAULT_PART_SIZE: u64 = MIN_S3_MULTIPART_PART_SIZE;

/// Default multipart upload threshold (16 MiB). Files strictly below it use a single PUT.
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 16 * 1024 * 1024;

/// Default largest file we are willing to upload (5 TiB - AWS object limit)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024 * 1024 * 1024;

/// Default number of concurrent part workers
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default number of retries per part, after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default linear backoff unit between part attempts
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default lifetime of a pre-signed part URL (1 hour)
pub const DEFAULT_PRESIGN_TTL: Duration = Duration::from_secs(60 * 60);

/// Longest lifetime SigV4 allows for a pre-signed URL (7 days)
pub const MAX_PRESIGN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Size of the body chunks streamed to a pre-signed URL (64 KiB).
/// Progress is reported at this granularity.
pub const DEFAULT_PUT_CHUNK_SIZE: usize = 64 * 1024;

/// Default region used when none can be discovered
pub const DEFAULT_REGION: &str = "us-east-1";

/// Refresh period for the CLI progress bar
pub const PROGRESS_REFRESH_INTERVAL: Duration = Duration::from_millis(100);
