//! Upload planning
//!
//! Picks single-shot or multipart transfer and splits the file into parts.

use super::UploadError;
use serde::{Deserialize, Serialize};

/// Default size at which multipart upload is used (32 MiB)
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 32 * 1024 * 1024;

/// Default part size (16 MiB)
pub const DEFAULT_PART_SIZE: u64 = 16 * 1024 * 1024;

/// Transfer strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Single,
    Multipart,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Single => "put_object",
            Strategy::Multipart => "multipart",
        }
    }
}

/// One contiguous byte range of the file. `start` and `end` are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartBoundary {
    pub index: usize,
    pub start: u64,
    pub end: u64,
    pub part_size: u64,
}

impl PartBoundary {
    /// 1-based number used on the wire
    pub fn part_number(&self) -> u32 {
        self.index as u32 + 1
    }
}

/// Identifier of an uploaded part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartResult {
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
}

impl PartResult {
    pub fn new(part_number: u32, etag: impl Into<String>) -> Self {
        Self {
            etag: etag.into(),
            part_number,
        }
    }
}

/// Planner output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPlan {
    pub strategy: Strategy,
    pub parts: Vec<PartBoundary>,
}

/// Choose a strategy for `file_size` and compute part ranges when multipart.
///
/// Files of at least `multipart_threshold` bytes go multipart.
pub fn plan_upload(
    file_size: u64,
    multipart_threshold: u64,
    part_size: u64,
) -> Result<UploadPlan, UploadError> {
    if file_size == 0 {
        return Err(UploadError::InvalidFileSize(file_size));
    }

    if file_size < multipart_threshold {
        return Ok(UploadPlan {
            strategy: Strategy::Single,
            parts: Vec::new(),
        });
    }

    Ok(UploadPlan {
        strategy: Strategy::Multipart,
        parts: part_boundaries(file_size, part_size)?,
    })
}

/// Split `[0, file_size)` into fixed-size ranges; only the last may be shorter.
pub fn part_boundaries(file_size: u64, part_size: u64) -> Result<Vec<PartBoundary>, UploadError> {
    if file_size == 0 {
        return Err(UploadError::InvalidFileSize(file_size));
    }
    // Config validation rejects zero, this only guards direct callers
    let part_size = part_size.max(1);
    let num_parts = file_size.div_ceil(part_size);

    Ok((0..num_parts)
        .map(|index| {
            let start = index * part_size;
            let end = (start + part_size).min(file_size) - 1;
            PartBoundary {
                index: index as usize,
                start,
                end,
                part_size: end - start + 1,
            }
        })
        .collect())
}
