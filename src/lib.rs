// src/lib.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Concurrent multipart uploads to S3-compatible stores through pre-signed part URLs.

pub mod cancel;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod http;
pub mod planner;
pub mod presigned;
pub mod progress;
pub mod retry;
pub mod s3_client;
pub mod s3_store;
pub mod s3_utils;
pub mod source;
pub mod store;
pub mod uploader;

pub use cancel::CancellationToken;
pub use config::UploadConfig;
pub use coordinator::{
    BoundedRetry, Decision, FixedDecision, PartialFailureHandler, PartialFailureReport,
    PlannedUpload, UploadCoordinator, UploadOutcome, UploadState,
};
pub use error::{PartError, UploadError, UploadResult};
pub use planner::{Part, UploadPlan, plan};
pub use presigned::{PartTransport, PresignedPutClient, ProgressFn, PutResponse, ReqwestTransport};
pub use progress::{ProgressAggregator, ProgressSnapshot, UploadProgressBar};
pub use retry::{RetryingPartUploader, SessionTarget};
pub use s3_store::S3Store;
pub use s3_utils::{object_uri_for_file, parse_s3_uri};
pub use source::{FileSource, UploadSource};
pub use store::{MultipartStore, PartResult};
pub use uploader::{PreparedUpload, UploadMode, Uploader};
