// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error taxonomy shared by the tensor model and the invocation engine.

use crate::TensorType;
use std::fmt;

/// Coarse status codes every error in the workspace maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    InvalidParameter,
    OutOfMemory,
    NotSupported,
    PermissionDenied,
    TryAgain,
    TimedOut,
    StreamsPipe,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidParameter => "invalid-parameter",
            ErrorCode::OutOfMemory => "out-of-memory",
            ErrorCode::NotSupported => "not-supported",
            ErrorCode::PermissionDenied => "permission-denied",
            ErrorCode::TryAgain => "try-again",
            ErrorCode::TimedOut => "timed-out",
            ErrorCode::StreamsPipe => "streams-pipe",
            ErrorCode::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by descriptor and buffer operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TensorError {
    /// A tensor index was at or past the descriptor's count.
    #[error("tensor index {index} out of range (count {count})")]
    IndexOutOfRange { index: usize, count: usize },

    /// The tensor count is outside `1..=16`.
    #[error("invalid tensor count {0}: must be between 1 and {max}", max = crate::MAX_TENSORS)]
    InvalidCount(usize),

    /// A dimension slot was zero or the rank exceeded the descriptor's limit.
    #[error("invalid dimension for tensor {index}: {detail}")]
    InvalidDimension { index: usize, detail: String },

    /// The element type is `Unknown`.
    #[error("tensor {index} has no valid element type")]
    UnknownType { index: usize },

    /// The element type exists but this build cannot hold it.
    #[error("tensor type {0} is not supported by this build")]
    UnsupportedType(TensorType),

    /// A buffer's size does not match what the descriptor requires.
    #[error("size mismatch for tensor {index}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    /// A raw write was empty or larger than the slot.
    #[error("invalid write of {len} bytes into tensor {index} (slot holds {capacity})")]
    InvalidWrite {
        index: usize,
        len: usize,
        capacity: usize,
    },

    /// A tensor slot has no memory attached.
    #[error("tensor {index} has no memory attached")]
    NotAllocated { index: usize },

    /// Memory for a buffer could not be reserved.
    #[error("cannot allocate {bytes} bytes for tensor data")]
    OutOfMemory { bytes: usize },

    /// A textual descriptor could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
}

impl TensorError {
    /// Maps this error onto the shared status taxonomy.
    pub fn code(&self) -> ErrorCode {
        match self {
            TensorError::UnsupportedType(_) => ErrorCode::NotSupported,
            TensorError::OutOfMemory { .. } => ErrorCode::OutOfMemory,
            _ => ErrorCode::InvalidParameter,
        }
    }

    /// Records this error in the process-wide diagnostic slot and returns it.
    pub fn reported(self) -> Self {
        crate::diagnostic::report(self.code(), &self);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(
            TensorError::UnsupportedType(TensorType::Float16).code(),
            ErrorCode::NotSupported
        );
        assert_eq!(
            TensorError::OutOfMemory { bytes: 1 }.code(),
            ErrorCode::OutOfMemory
        );
        assert_eq!(
            TensorError::IndexOutOfRange { index: 3, count: 1 }.code(),
            ErrorCode::InvalidParameter
        );
    }

    #[test]
    fn test_display() {
        let e = TensorError::InvalidWrite {
            index: 0,
            len: 12,
            capacity: 8,
        };
        assert_eq!(
            e.to_string(),
            "invalid write of 12 bytes into tensor 0 (slot holds 8)"
        );
        assert_eq!(ErrorCode::TryAgain.to_string(), "try-again");
    }
}
