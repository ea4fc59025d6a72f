// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Handle configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! backend = "custom-passthrough"
//! models = ["./models/mobilenet.bin"]
//! timeout_ms = 500
//!
//! [[input]]
//! type = "uint8"
//! dimension = "3:224:224:1"
//!
//! [[output]]
//! name = "logits"
//! type = "float32"
//! dimension = "1001:1"
//! ```

use crate::{SingleError, SingleOptions};
use std::path::{Path, PathBuf};
use tensor_core::{TensorType, TensorsInfo};

/// One tensor entry of a config file.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TensorSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Element type, e.g. `"float32"`.
    #[serde(rename = "type")]
    pub tensor_type: TensorType,
    /// Colon-separated dimensions, innermost first, e.g. `"3:224:224:1"`.
    pub dimension: String,
}

/// Configuration for opening a [`Single`](crate::Single) handle.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SingleConfig {
    /// Registered backend name.
    pub backend: String,
    /// Model files or directories handed to the backend factory.
    #[serde(default)]
    pub models: Vec<PathBuf>,
    /// Caller wait in milliseconds; 0 runs the backend on the caller's thread.
    #[serde(default)]
    pub timeout_ms: u64,
    /// Allow ranks up to 8 instead of 4.
    #[serde(default)]
    pub extended: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input: Vec<TensorSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<TensorSpec>,
}

impl SingleConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, SingleError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SingleError::InvalidParameter(format!(
                "cannot read config '{}': {e}",
                path.display()
            ))
            .reported()
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, SingleError> {
        toml::from_str(toml_str).map_err(|e| {
            SingleError::InvalidParameter(format!("TOML parse error: {e}")).reported()
        })
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, SingleError> {
        toml::to_string_pretty(self).map_err(|e| {
            SingleError::InvalidParameter(format!("TOML serialise error: {e}")).reported()
        })
    }

    /// The configured input descriptor, if any tensors are listed.
    pub fn input_info(&self) -> Result<Option<TensorsInfo>, SingleError> {
        self.build_info(&self.input)
    }

    /// The configured output descriptor, if any tensors are listed.
    pub fn output_info(&self) -> Result<Option<TensorsInfo>, SingleError> {
        self.build_info(&self.output)
    }

    /// Converts into open-time options.
    pub fn to_options(&self) -> Result<SingleOptions, SingleError> {
        Ok(SingleOptions {
            backend: self.backend.clone(),
            models: self.models.clone(),
            input_info: self.input_info()?,
            output_info: self.output_info()?,
            timeout_ms: self.timeout_ms,
        })
    }

    fn build_info(&self, specs: &[TensorSpec]) -> Result<Option<TensorsInfo>, SingleError> {
        if specs.is_empty() {
            return Ok(None);
        }
        let mut info = if self.extended {
            TensorsInfo::new_extended()
        } else {
            TensorsInfo::new()
        };
        info.set_count(specs.len())?;
        for (index, spec) in specs.iter().enumerate() {
            let dims = TensorsInfo::parse_dimension(&spec.dimension)?;
            info.set_tensor_type(index, spec.tensor_type)?;
            info.set_tensor_dimension(index, &dims)?;
            info.set_tensor_name(index, spec.name.as_deref())?;
        }
        info.validate()?;
        Ok(Some(info))
    }
}

impl Default for SingleConfig {
    fn default() -> Self {
        Self {
            backend: "custom-passthrough".to_string(),
            models: Vec::new(),
            timeout_ms: 0,
            extended: false,
            input: Vec::new(),
            output: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
backend = "custom-passthrough"
models = ["/tmp/model.bin"]
timeout_ms = 250

[[input]]
type = "uint8"
dimension = "3:224:224:1"

[[output]]
name = "logits"
type = "float32"
dimension = "1001:1"
"#;

    #[test]
    fn test_default() {
        let c = SingleConfig::default();
        assert_eq!(c.timeout_ms, 0);
        assert!(!c.extended);
        assert_eq!(c.input_info().unwrap(), None);
    }

    #[test]
    fn test_from_toml() {
        let c = SingleConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(c.backend, "custom-passthrough");
        assert_eq!(c.models, vec![PathBuf::from("/tmp/model.bin")]);
        assert_eq!(c.timeout_ms, 250);

        let input = c.input_info().unwrap().unwrap();
        assert_eq!(input.tensor_size(0).unwrap(), 3 * 224 * 224);

        let output = c.output_info().unwrap().unwrap();
        assert_eq!(output.tensor_name(0).unwrap(), Some("logits"));
        assert_eq!(output.tensor_type(0).unwrap(), TensorType::Float32);
        assert_eq!(output.tensor_size(0).unwrap(), 1001 * 4);
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let c = SingleConfig::from_toml(SAMPLE).unwrap();
        let back = SingleConfig::from_toml(&c.to_toml().unwrap()).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_rank_above_legacy_needs_extended() {
        let five_d = r#"
backend = "x"
[[input]]
type = "int8"
dimension = "1:2:3:4:5"
"#;
        let c = SingleConfig::from_toml(five_d).unwrap();
        assert!(matches!(
            c.input_info(),
            Err(SingleError::InvalidParameter(_))
        ));

        let c = SingleConfig {
            extended: true,
            ..c
        };
        let info = c.input_info().unwrap().unwrap();
        assert!(info.is_extended());
        assert_eq!(info.tensor_size(0).unwrap(), 120);
    }

    #[test]
    fn test_bad_dimension_rejected() {
        let c = SingleConfig::from_toml(
            "backend = \"x\"\n[[input]]\ntype = \"uint8\"\ndimension = \"3:0\"\n",
        )
        .unwrap();
        assert!(c.input_info().is_err());
    }

    #[test]
    fn test_unknown_type_is_parse_error() {
        let err = SingleConfig::from_toml(
            "backend = \"x\"\n[[input]]\ntype = \"complex\"\ndimension = \"1\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, SingleError::InvalidParameter(_)));
    }

    #[test]
    fn test_from_file_and_options() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let c = SingleConfig::from_file(file.path()).unwrap();
        let opts = c.to_options().unwrap();
        assert_eq!(opts.backend, "custom-passthrough");
        assert_eq!(opts.timeout_ms, 250);
        assert!(opts.input_info.is_some());
        assert!(opts.output_info.is_some());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SingleConfig::from_file(&dir.path().join("absent.toml")).is_err());
    }
}
