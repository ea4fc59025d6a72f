// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Subcommands and the helpers they share.

pub mod contend;
pub mod info;
pub mod invoke;

use crate::TensorArgs;
use anyhow::Context;
use single_shot::{registry, Backend, BackendError, BackendFactory, CustomBackend, ModelPath};
use single_shot::{SingleConfig, TensorSpec};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tensor_core::{TensorType, TensorsData, TensorsInfo};

/// Name the demo backend is registered under.
pub const PASSTHROUGH: &str = "passthrough";

/// Installs the fmt subscriber; `-v` count picks the level.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

/// Reads `path` if given, otherwise builds a passthrough config from flags.
pub fn load_config(path: Option<&Path>, tensor: &TensorArgs) -> anyhow::Result<SingleConfig> {
    if let Some(path) = path {
        return SingleConfig::from_file(path)
            .with_context(|| format!("loading config '{}'", path.display()));
    }
    let tensor_type: TensorType = tensor
        .tensor_type
        .parse()
        .with_context(|| format!("bad tensor type '{}'", tensor.tensor_type))?;
    let spec = TensorSpec {
        name: None,
        tensor_type,
        dimension: tensor.dimension.clone(),
    };
    Ok(SingleConfig {
        backend: PASSTHROUGH.to_string(),
        extended: tensor.extended,
        input: vec![spec.clone()],
        output: vec![spec],
        ..SingleConfig::default()
    })
}

/// Registers the passthrough backend for the descriptors in `config`.
///
/// It copies each input tensor into the matching output tensor, truncated
/// to the output size, after sleeping `delay`.
pub fn register_passthrough(
    config: &SingleConfig,
    delay: Duration,
    backend_alloc: bool,
) -> anyhow::Result<()> {
    let input = config
        .input_info()?
        .context("config lists no input tensors")?;
    let output = config.output_info()?.unwrap_or_else(|| input.clone());

    let factory: BackendFactory = Arc::new(
        move |_models: &[ModelPath]| -> Result<Box<dyn Backend>, BackendError> {
            let backend = CustomBackend::new(PASSTHROUGH, input.clone(), output.clone(), move |i, o| {
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                copy_truncated(i, o)
            })
            .with_reshape(|info| Ok(info.clone()));
            Ok(Box::new(if backend_alloc {
                backend.with_backend_allocation()
            } else {
                backend
            }))
        },
    );
    registry::global().register(PASSTHROUGH, factory)?;
    Ok(())
}

fn copy_truncated(input: &TensorsData, output: &mut TensorsData) -> Result<(), BackendError> {
    for index in 0..input.count().min(output.count()) {
        let bytes = input.get_tensor_data(index)?;
        let len = bytes.len().min(output.tensor_size(index)?);
        output.set_tensor_data(index, &bytes[..len])?;
    }
    Ok(())
}

/// Human-readable byte count.
pub fn format_bytes(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

/// One line per tensor: index, name, type, dimension, size.
pub fn describe(info: &TensorsInfo) -> Vec<String> {
    info.iter()
        .enumerate()
        .map(|(index, t)| {
            format!(
                "{index:<3} {:<12} {:<8} {:<20} {:>10}",
                t.name.as_deref().unwrap_or("-"),
                t.tensor_type.as_str(),
                t.dimension[..t.rank().max(1)]
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(":"),
                format_bytes(t.size_bytes()),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(ty: &str, dim: &str) -> TensorArgs {
        TensorArgs {
            tensor_type: ty.into(),
            dimension: dim.into(),
            extended: false,
        }
    }

    #[test]
    fn test_config_from_flags() {
        let config = load_config(None, &args("float32", "1000:1")).unwrap();
        assert_eq!(config.backend, PASSTHROUGH);
        let info = config.input_info().unwrap().unwrap();
        assert_eq!(info.tensor_size(0).unwrap(), 4000);
    }

    #[test]
    fn test_bad_type_flag() {
        assert!(load_config(None, &args("complex", "4")).is_err());
    }

    #[test]
    fn test_copy_truncated() {
        let four = TensorsInfo::from_specs(&[(TensorType::Uint8, &[4])]).unwrap();
        let two = TensorsInfo::from_specs(&[(TensorType::Uint8, &[2])]).unwrap();
        let input = TensorsData::from_vecs(&four, vec![vec![1, 2, 3, 4]]).unwrap();
        let mut output = TensorsData::new(&two).unwrap();
        copy_truncated(&input, &mut output).unwrap();
        assert_eq!(output.get_tensor_data(0).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
    }
}
