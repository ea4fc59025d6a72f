// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `single contend`: several threads invoke one handle at the same time.
//!
//! Exactly one caller is admitted; the rest are turned away with
//! try-again instead of queueing.

use super::{register_passthrough, PASSTHROUGH};
use single_shot::{Single, SingleConfig, SingleError};
use std::sync::Barrier;
use std::time::{Duration, Instant};
use tensor_core::TensorsData;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub ok: usize,
    pub try_again: usize,
    pub timed_out: usize,
    pub failed: usize,
}

pub fn execute(
    config: SingleConfig,
    threads: usize,
    delay_ms: u64,
    timeout_ms: u64,
) -> anyhow::Result<()> {
    anyhow::ensure!(threads > 0, "--threads must be at least 1");
    if config.backend == PASSTHROUGH {
        register_passthrough(&config, Duration::from_millis(delay_ms), false)?;
    }
    let mut options = config.to_options()?;
    options.timeout_ms = timeout_ms;
    let single = Single::open_with(options)?;
    let input = TensorsData::new(&single.input_info()?)?;

    println!("  {threads} callers, backend delay {delay_ms} ms, timeout {timeout_ms} ms");
    let started = Instant::now();
    let tally = race(&single, &input, threads);
    let elapsed = started.elapsed();

    println!("  ok:        {}", tally.ok);
    println!("  try-again: {}", tally.try_again);
    println!("  timed out: {}", tally.timed_out);
    println!("  failed:    {}", tally.failed);
    println!("  Wall time: {:.3} ms", elapsed.as_secs_f64() * 1000.0);
    tracing::info!(metrics = %single.metrics().summary(), "contention run finished");
    single.close()?;
    Ok(())
}

/// Releases `threads` callers at once and counts their outcomes.
pub fn race(single: &Single, input: &TensorsData, threads: usize) -> Tally {
    let barrier = Barrier::new(threads);
    let results: Vec<Result<TensorsData, SingleError>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    single.invoke(input)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .unwrap_or_else(|_| Err(SingleError::Unknown("caller thread panicked".into())))
            })
            .collect()
    });

    let mut tally = Tally::default();
    for result in results {
        match result {
            Ok(_) => tally.ok += 1,
            Err(SingleError::TryAgain) => tally.try_again += 1,
            Err(SingleError::TimedOut { .. }) => tally.timed_out += 1,
            Err(_) => tally.failed += 1,
        }
    }
    tally
}
