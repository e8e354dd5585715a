// src/error.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Error taxonomy for the upload engine.
//!
//! Per-part failures (`PartError`) are absorbed by the coordinator and folded
//! into a partial-failure report. Only session-level outcomes (`UploadError`)
//! reach the caller.

use thiserror::Error;

/// Failure of a single part attempt, or of a part after its retries ran out.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartError {
    /// Could not produce a pre-signed URL (credentials, clock skew, config).
    #[error("failed to sign part URL: {0}")]
    Signing(String),

    /// Connection reset, timeout, DNS failure or broken pipe.
    #[error("network error: {0}")]
    Network(String),

    /// Store answered with a status outside [200, 300), or without an ETag.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Reading the part's bytes from the local source failed.
    #[error("failed to read part bytes: {0}")]
    Source(String),

    #[error("part upload cancelled")]
    Cancelled,

    #[error("part {part_number} failed after retries: {last_error}")]
    PartUploadFailed {
        part_number: u32,
        last_error: Box<PartError>,
    },
}

impl PartError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PartError::Cancelled)
    }
}

/// Terminal outcome of an upload session.
#[derive(Error, Debug)]
pub enum UploadError {
    /// Bad part size, file size or engine settings. No session was created.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("failed to initiate multipart upload: {0}")]
    InitiateFailed(String),

    /// The caller declined to retry failed parts; the session was aborted.
    #[error("upload aborted: {completed}/{total} parts uploaded, {failed} failed")]
    UploadAborted {
        completed: usize,
        total: usize,
        failed: usize,
    },

    #[error("upload cancelled")]
    UploadCancelled,

    /// Every part was stored but the final assembly call was rejected. The
    /// parts remain in an orphaned multipart session that must be cleaned up.
    #[error(
        "failed to complete multipart upload {upload_id}: {reason} \
         (uploaded parts remain on the store; abort the session to release them)"
    )]
    CompletionFailed { upload_id: String, reason: String },

    #[error("single-shot upload failed: {0}")]
    SimpleUploadFailed(String),

    #[error("failed to read source: {0}")]
    Source(#[from] std::io::Error),
}

pub type UploadResult<T> = std::result::Result<T, UploadError>;
