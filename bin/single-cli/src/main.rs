// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # single
//!
//! Command-line interface for the single-shot invocation engine.
//!
//! ## Usage
//! ```bash
//! # Run ten invocations against the built-in passthrough backend
//! single invoke --type float32 --dimension 1000:1 --iterations 10 --timeout-ms 100
//!
//! # Four threads racing for one handle
//! single contend --threads 4 --delay-ms 50
//!
//! # Print descriptor sizes from a config file
//! single --config ./single.toml info
//! ```

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "single",
    about = "Single-shot model invocation with timeouts and busy rejection",
    version,
    author
)]
struct Cli {
    /// Path to a TOML configuration file (overrides tensor flags).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Tensor description used when no config file is given.
#[derive(clap::Args, Debug, Clone)]
pub struct TensorArgs {
    /// Element type of the single input/output tensor.
    #[arg(short = 't', long = "type", default_value = "uint8")]
    pub tensor_type: String,

    /// Colon-separated dimensions, innermost first (e.g. "3:224:224:1").
    #[arg(short, long, default_value = "4")]
    pub dimension: String,

    /// Allow ranks up to 8.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the passthrough backend and run a number of invocations.
    Invoke {
        #[command(flatten)]
        tensor: TensorArgs,

        /// Number of invocations.
        #[arg(short = 'n', long, default_value_t = 1)]
        iterations: usize,

        /// Caller wait in milliseconds; 0 runs on the calling thread.
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Simulated backend latency per call.
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,

        /// Let the backend allocate output memory.
        #[arg(long)]
        backend_alloc: bool,

        /// Print metrics as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Invoke one handle from several threads at once.
    Contend {
        #[command(flatten)]
        tensor: TensorArgs,

        /// Number of concurrent callers.
        #[arg(long, default_value_t = 4)]
        threads: usize,

        /// Simulated backend latency per call.
        #[arg(long, default_value_t = 50)]
        delay_ms: u64,

        /// Caller wait in milliseconds.
        #[arg(long, default_value_t = 1_000)]
        timeout_ms: u64,
    },

    /// Print the input/output descriptors and their byte sizes.
    Info {
        #[command(flatten)]
        tensor: TensorArgs,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Invoke {
            tensor,
            iterations,
            timeout_ms,
            delay_ms,
            backend_alloc,
            json,
        } => {
            let config = commands::load_config(cli.config.as_deref(), &tensor)?;
            commands::invoke::execute(
                config,
                commands::invoke::InvokeArgs {
                    iterations,
                    timeout_ms,
                    delay_ms,
                    backend_alloc,
                    json,
                },
            )
        }
        Commands::Contend {
            tensor,
            threads,
            delay_ms,
            timeout_ms,
        } => {
            let config = commands::load_config(cli.config.as_deref(), &tensor)?;
            commands::contend::execute(config, threads, delay_ms, timeout_ms)
        }
        Commands::Info { tensor } => {
            let config = commands::load_config(cli.config.as_deref(), &tensor)?;
            commands::info::execute(&config)
        }
    }
}
