// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `single info`: print descriptors without opening a backend.

use super::{describe, format_bytes};
use single_shot::SingleConfig;

pub fn execute(config: &SingleConfig) -> anyhow::Result<()> {
    println!("  Backend: {}", config.backend);
    println!("  Timeout: {} ms", config.timeout_ms);
    for model in &config.models {
        println!("  Model:   {}", model.display());
    }
    println!();

    for (label, info) in [("Input", config.input_info()?), ("Output", config.output_info()?)] {
        match info {
            Some(info) => {
                println!(
                    "  {label} ({} tensors, {}, rank limit {}):",
                    info.count(),
                    format_bytes(info.total_size()),
                    info.rank_limit()
                );
                for line in describe(&info) {
                    println!("    {line}");
                }
            }
            None => println!("  {label}: taken from the backend"),
        }
    }
    Ok(())
}
