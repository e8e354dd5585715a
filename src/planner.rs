// src/planner.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Splits an object into the fixed-size byte ranges uploaded as parts.

use crate::constants::{MAX_MULTIPART_PARTS, MIN_S3_MULTIPART_PART_SIZE};
use crate::error::{UploadError, UploadResult};

/// One contiguous byte range `[start, end)` uploaded as an independent part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Part {
    /// 1-based, contiguous.
    pub part_number: u32,
    pub start: u64,
    pub end: u64,
}

impl Part {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Index into per-part arrays.
    pub fn index(&self) -> usize {
        (self.part_number - 1) as usize
    }
}

/// The ordered partition of `[0, file_size)` into parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPlan {
    pub file_size: u64,
    pub part_size: u64,
    pub parts: Vec<Part>,
}

impl UploadPlan {
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }
}

/// Plan the parts for an object of `file_size` bytes.
///
/// The last part carries the remainder. Part count is `ceil(file_size / part_size)`.
pub fn plan(file_size: u64, part_size: u64) -> UploadResult<UploadPlan> {
    if part_size < MIN_S3_MULTIPART_PART_SIZE {
        return Err(UploadError::InvalidConfiguration(format!(
            "part size {} is below the store minimum of {} bytes",
            part_size, MIN_S3_MULTIPART_PART_SIZE
        )));
    }
    if file_size == 0 {
        return Err(UploadError::InvalidConfiguration(
            "cannot plan a multipart upload for an empty file".to_string(),
        ));
    }

    let count = file_size.div_ceil(part_size);
    if count > MAX_MULTIPART_PARTS {
        return Err(UploadError::InvalidConfiguration(format!(
            "{} bytes at part size {} needs {} parts, store allows at most {}",
            file_size, part_size, count, MAX_MULTIPART_PARTS
        )));
    }

    let mut parts = Vec::with_capacity(count as usize);
    let mut offset = 0u64;
    let mut part_number = 1u32;
    while offset < file_size {
        let end = offset.saturating_add(part_size).min(file_size);
        parts.push(Part {
            part_number,
            start: offset,
            end,
        });
        offset = end;
        part_number += 1;
    }

    Ok(UploadPlan {
        file_size,
        part_size,
        parts,
    })
}
