// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Open-time options and model path checks.

use crate::SingleError;
use std::path::{Path, PathBuf};
use tensor_core::TensorsInfo;

/// Whether a model path points at a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    File,
    Directory,
}

/// A model path that existed when it was checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPath {
    path: PathBuf,
    kind: ModelKind,
}

impl ModelPath {
    /// Checks that `path` exists and classifies it.
    pub fn resolve(path: &Path) -> Result<Self, SingleError> {
        let meta = std::fs::metadata(path).map_err(|e| {
            let msg = format!("model path '{}': {e}", path.display());
            let err = match e.kind() {
                std::io::ErrorKind::PermissionDenied => SingleError::PermissionDenied(msg),
                _ => SingleError::InvalidParameter(msg),
            };
            err.reported()
        })?;
        let kind = if meta.is_dir() {
            ModelKind::Directory
        } else {
            ModelKind::File
        };
        Ok(Self {
            path: path.to_path_buf(),
            kind,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }
}

/// Everything [`Single::open_with`](crate::Single::open_with) needs.
///
/// # Example
/// ```no_run
/// use single_shot::{Single, SingleOptions};
///
/// let single = Single::open_with(
///     SingleOptions::new("my-runtime")
///         .model("./models/mobilenet.bin")
///         .timeout_ms(500),
/// )?;
/// # Ok::<(), single_shot::SingleError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct SingleOptions {
    pub backend: String,
    pub models: Vec<PathBuf>,
    pub input_info: Option<TensorsInfo>,
    pub output_info: Option<TensorsInfo>,
    pub timeout_ms: u64,
}

impl SingleOptions {
    pub fn new(backend: &str) -> Self {
        Self {
            backend: backend.to_string(),
            ..Default::default()
        }
    }

    pub fn model(mut self, path: impl Into<PathBuf>) -> Self {
        self.models.push(path.into());
        self
    }

    pub fn input_info(mut self, info: TensorsInfo) -> Self {
        self.input_info = Some(info);
        self
    }

    pub fn output_info(mut self, info: TensorsInfo) -> Self {
        self.output_info = Some(info);
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    /// Resolves every model path.
    pub fn resolve_models(&self) -> Result<Vec<ModelPath>, SingleError> {
        self.models.iter().map(|p| ModelPath::resolve(p)).collect()
    }
}
