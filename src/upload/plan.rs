//! Chunk planning.

use thiserror::Error;

use crate::storage::{MAX_PARTS, MIN_PART_SIZE};

/// Errors raised while planning a chunked upload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// The source has no bytes.
    #[error("source is empty")]
    EmptySource,

    /// The chunk size is below the backend's minimum part size.
    #[error("chunk size {chunk_size} is below the minimum part size {min}")]
    ChunkTooSmall {
        /// Requested chunk size.
        chunk_size: u64,
        /// Minimum part size.
        min: u64,
    },

    /// The source fits in a single chunk; use a single-shot upload.
    #[error("source of {size} bytes is smaller than the chunk size {chunk_size}")]
    SourceTooSmall {
        /// Source size.
        size: u64,
        /// Requested chunk size.
        chunk_size: u64,
    },

    /// The plan needs more parts than the backend allows.
    #[error("{parts} parts exceed the maximum of {max}")]
    TooManyParts {
        /// Parts the plan would need.
        parts: u64,
        /// Maximum allowed.
        max: u32,
    },

    /// The computed ranges do not cover the source exactly.
    #[error("inconsistent chunk plan: {0}")]
    Inconsistent(String),
}

/// One byte range of the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    /// 1-based part number.
    pub part_number: u32,
    /// Offset of the first byte.
    pub offset: u64,
    /// Length in bytes.
    pub len: u64,
}

/// Ordered byte ranges covering a source.
///
/// Every part but the last is exactly `chunk_size` bytes; the last holds
/// the remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    size: u64,
    chunk_size: u64,
    parts: Vec<PartRange>,
}

impl ChunkPlan {
    /// Plan a source of `size` bytes with the given chunk size.
    pub fn new(size: u64, chunk_size: u64) -> Result<Self, PlanError> {
        if size == 0 {
            return Err(PlanError::EmptySource);
        }
        if chunk_size < MIN_PART_SIZE {
            return Err(PlanError::ChunkTooSmall {
                chunk_size,
                min: MIN_PART_SIZE,
            });
        }
        if size < chunk_size {
            return Err(PlanError::SourceTooSmall { size, chunk_size });
        }

        let total = size.div_ceil(chunk_size);
        if total > u64::from(MAX_PARTS) {
            return Err(PlanError::TooManyParts {
                parts: total,
                max: MAX_PARTS,
            });
        }

        let parts = (0..total)
            .map(|i| {
                let offset = i * chunk_size;
                PartRange {
                    part_number: i as u32 + 1,
                    offset,
                    len: chunk_size.min(size - offset),
                }
            })
            .collect();

        let plan = Self {
            size,
            chunk_size,
            parts,
        };
        plan.check()?;
        Ok(plan)
    }

    /// Verify the ranges tile the source.
    fn check(&self) -> Result<(), PlanError> {
        let mut expected_offset = 0u64;
        let last = self.parts.len().saturating_sub(1);

        for (i, part) in self.parts.iter().enumerate() {
            if part.part_number as usize != i + 1 {
                return Err(PlanError::Inconsistent(format!(
                    "part at position {} is numbered {}",
                    i + 1,
                    part.part_number
                )));
            }
            if part.offset != expected_offset {
                return Err(PlanError::Inconsistent(format!(
                    "part {} starts at {}, expected {}",
                    part.part_number, part.offset, expected_offset
                )));
            }
            if i < last && part.len != self.chunk_size {
                return Err(PlanError::Inconsistent(format!(
                    "non-final part {} is {} bytes, expected {}",
                    part.part_number, part.len, self.chunk_size
                )));
            }
            if part.len == 0 || part.len > self.chunk_size {
                return Err(PlanError::Inconsistent(format!(
                    "part {} has invalid length {}",
                    part.part_number, part.len
                )));
            }
            expected_offset += part.len;
        }

        if expected_offset != self.size {
            return Err(PlanError::Inconsistent(format!(
                "parts cover {} bytes, source has {}",
                expected_offset, self.size
            )));
        }
        Ok(())
    }

    /// Source size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Chunk size in bytes.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of parts.
    pub fn total_parts(&self) -> u32 {
        self.parts.len() as u32
    }

    /// Ranges in part-number order.
    pub fn parts(&self) -> &[PartRange] {
        &self.parts
    }
}
