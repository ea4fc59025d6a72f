// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for backends and the invocation engine.

use tensor_core::{ErrorCode, TensorError};

/// Errors a backend reports back to the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend cannot take the requested shapes.
    #[error("backend does not support {0}")]
    NotSupported(String),

    /// The backend could not load or start.
    #[error("backend failed to start: {0}")]
    StartFailed(String),

    /// A single invocation failed.
    #[error("backend invocation failed: {0}")]
    InvokeFailed(String),

    /// The named property does not exist or rejected the value.
    #[error("invalid property '{name}': {detail}")]
    Property { name: String, detail: String },

    /// A tensor buffer operation inside the backend failed.
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

impl BackendError {
    pub fn code(&self) -> ErrorCode {
        match self {
            BackendError::NotSupported(_) => ErrorCode::NotSupported,
            BackendError::StartFailed(_) | BackendError::InvokeFailed(_) => ErrorCode::StreamsPipe,
            BackendError::Property { .. } => ErrorCode::InvalidParameter,
            BackendError::Tensor(e) => e.code(),
        }
    }
}

/// Errors returned by [`Single`](crate::Single) and the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SingleError {
    /// Bad argument, closed handle, or a shape/size mismatch.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Memory for a buffer could not be reserved.
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// The backend cannot do what was asked (e.g. dynamic reshaping).
    #[error("not supported: {0}")]
    NotSupported(String),

    /// A model path could not be accessed.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Another invocation is in flight on this handle.
    #[error("engine busy: an invocation is already in flight")]
    TryAgain,

    /// The caller stopped waiting; the backend call keeps running.
    #[error("invocation timed out after {timeout_ms} ms")]
    TimedOut { timeout_ms: u64 },

    /// The backend failed to start or to run.
    #[error("backend pipeline error: {0}")]
    StreamsPipe(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl SingleError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SingleError::InvalidParameter(_) => ErrorCode::InvalidParameter,
            SingleError::OutOfMemory(_) => ErrorCode::OutOfMemory,
            SingleError::NotSupported(_) => ErrorCode::NotSupported,
            SingleError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            SingleError::TryAgain => ErrorCode::TryAgain,
            SingleError::TimedOut { .. } => ErrorCode::TimedOut,
            SingleError::StreamsPipe(_) => ErrorCode::StreamsPipe,
            SingleError::Unknown(_) => ErrorCode::Unknown,
        }
    }

    /// Records this error in the process-wide diagnostic slot and returns it.
    pub(crate) fn reported(self) -> Self {
        tensor_core::diagnostic::report(self.code(), &self);
        self
    }

    pub(crate) fn closed() -> Self {
        SingleError::InvalidParameter("handle is closed".into()).reported()
    }
}

impl From<TensorError> for SingleError {
    fn from(e: TensorError) -> Self {
        match e.code() {
            ErrorCode::OutOfMemory => SingleError::OutOfMemory(e.to_string()),
            ErrorCode::NotSupported => SingleError::NotSupported(e.to_string()),
            _ => SingleError::InvalidParameter(e.to_string()),
        }
    }
}

impl From<BackendError> for SingleError {
    fn from(e: BackendError) -> Self {
        match e.code() {
            ErrorCode::NotSupported => SingleError::NotSupported(e.to_string()),
            ErrorCode::StreamsPipe => SingleError::StreamsPipe(e.to_string()),
            ErrorCode::OutOfMemory => SingleError::OutOfMemory(e.to_string()),
            ErrorCode::InvalidParameter => SingleError::InvalidParameter(e.to_string()),
            _ => SingleError::Unknown(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_codes() {
        assert_eq!(
            BackendError::NotSupported("reshape".into()).code(),
            ErrorCode::NotSupported
        );
        assert_eq!(
            BackendError::InvokeFailed("boom".into()).code(),
            ErrorCode::StreamsPipe
        );
    }

    #[test]
    fn test_conversions_keep_code() {
        let e: SingleError = BackendError::StartFailed("no model".into()).into();
        assert_eq!(e.code(), ErrorCode::StreamsPipe);

        let e: SingleError = TensorError::OutOfMemory { bytes: 8 }.into();
        assert_eq!(e.code(), ErrorCode::OutOfMemory);

        let e: SingleError = TensorError::IndexOutOfRange { index: 2, count: 1 }.into();
        assert_eq!(e.code(), ErrorCode::InvalidParameter);

        let e: SingleError = BackendError::Tensor(TensorError::UnsupportedType(
            tensor_core::TensorType::Float16,
        ))
        .into();
        assert_eq!(e.code(), ErrorCode::NotSupported);
    }

    #[test]
    fn test_timed_out_display() {
        let e = SingleError::TimedOut { timeout_ms: 10 };
        assert_eq!(e.to_string(), "invocation timed out after 10 ms");
        assert_eq!(e.code(), ErrorCode::TimedOut);
    }
}
