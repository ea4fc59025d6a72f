// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `single invoke`: open a handle and run a batch of invocations.
//!
//! Timeouts do not abort the batch; they are counted and the next call
//! waits for the engine to become idle again.

use super::{describe, format_bytes, register_passthrough, PASSTHROUGH};
use anyhow::Context;
use single_shot::{Single, SingleConfig, SingleError};
use std::time::{Duration, Instant};
use tensor_core::TensorsData;

/// Flags of the `invoke` subcommand.
#[derive(Debug, Clone)]
pub struct InvokeArgs {
    pub iterations: usize,
    pub timeout_ms: Option<u64>,
    pub delay_ms: u64,
    pub backend_alloc: bool,
    pub json: bool,
}

pub fn execute(config: SingleConfig, args: InvokeArgs) -> anyhow::Result<()> {
    if config.backend == PASSTHROUGH {
        register_passthrough(
            &config,
            Duration::from_millis(args.delay_ms),
            args.backend_alloc,
        )?;
    }

    let mut options = config.to_options()?;
    if let Some(timeout_ms) = args.timeout_ms {
        options.timeout_ms = timeout_ms;
    }
    let single = Single::open_with(options)
        .with_context(|| format!("opening backend '{}'", config.backend))?;

    let input_info = single.input_info()?;
    let output_info = single.output_info()?;
    if !args.json {
        println!("  Handle #{} ({})", single.id(), config.backend);
        println!("  Timeout: {} ms", single.timeout()?);
        println!("  Input:");
        for line in describe(&input_info) {
            println!("    {line}");
        }
        println!("  Output:");
        for line in describe(&output_info) {
            println!("    {line}");
        }
        println!();
    }

    let input = TensorsData::new(&input_info)?;
    let started = Instant::now();
    for iteration in 0..args.iterations {
        match invoke_when_idle(&single, &input) {
            Ok(output) => {
                if !args.json {
                    let sizes: Vec<String> = (0..output.count())
                        .map(|i| output.tensor_size(i).map(format_bytes))
                        .collect::<Result<_, _>>()?;
                    println!("  [{iteration:>4}] ok      {}", sizes.join(", "));
                }
            }
            Err(SingleError::TimedOut { timeout_ms }) => {
                if !args.json {
                    println!("  [{iteration:>4}] timed out after {timeout_ms} ms");
                }
            }
            Err(e) => return Err(e).context(format!("invocation {iteration}")),
        }
    }
    let elapsed = started.elapsed();

    let metrics = single.metrics();
    single.close()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    } else {
        println!();
        println!("  {}", metrics.summary());
        println!("  Wall time: {:.3} ms", elapsed.as_secs_f64() * 1000.0);
    }
    Ok(())
}

/// Retries while a previous timed-out call still occupies the engine.
fn invoke_when_idle(single: &Single, input: &TensorsData) -> Result<TensorsData, SingleError> {
    loop {
        match single.invoke(input) {
            Err(SingleError::TryAgain) => std::thread::sleep(Duration::from_millis(1)),
            other => return other,
        }
    }
}
