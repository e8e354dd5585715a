//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// src/s3_utils.rs
//! URI helpers shared by the CLI and library callers.

use anyhow::{Context, Result, bail};

/// Split `s3://bucket/key` into `(bucket, key)`.
pub fn parse_s3_uri(uri: &str) -> Result<(String, String)> {
    let trimmed = uri
        .strip_prefix("s3://")
        .context("URI must start with s3://")?;
    let (bucket, key) = trimmed
        .split_once('/')
        .context("URI must contain a '/' after bucket")?;
    if bucket.is_empty() {
        bail!("URI has an empty bucket name: {}", uri);
    }
    Ok((bucket.to_owned(), key.to_owned()))
}

/// Like `parse_s3_uri`, but a key ending in '/' (or empty) is completed with
/// `file_name`, the way `cp file s3://bucket/dir/` behaves.
pub fn object_uri_for_file(uri: &str, file_name: &str) -> Result<(String, String)> {
    let (bucket, mut key) = parse_s3_uri(uri)?;
    if key.is_empty() || key.ends_with('/') {
        key.push_str(file_name);
    }
    if key.is_empty() {
        bail!("cannot derive an object key from {}", uri);
    }
    Ok((bucket, key))
}
