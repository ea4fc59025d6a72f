// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # single-shot
//!
//! A single-invocation engine: open a model through a pluggable backend,
//! push one set of input tensors, get one set of output tensors back.
//!
//! The crate takes:
//! - A [`Backend`] (or a name in the [`registry`]) that knows how to run
//!   the model.
//! - Optional [`TensorsInfo`](tensor_core::TensorsInfo) descriptors to
//!   negotiate with the backend at open time.
//!
//! And returns a [`Single`] handle whose worker thread runs one
//! invocation at a time, with a caller-side timeout and non-blocking
//! rejection of concurrent callers.
//!
//! # Invocation Paths
//! ```text
//! timeout == 0   caller ──► backend.invoke()            (same thread)
//! timeout  > 0   caller ──► worker ──► backend.invoke()  (condvar hand-off)
//! ```
//!
//! # Concurrency
//! Uses `parking_lot` primitives and one OS thread per handle; there is no
//! async runtime.

mod backend;
mod config;
mod custom;
mod engine;
mod error;
mod metrics;
mod options;
pub mod registry;

pub use backend::Backend;
pub use config::{SingleConfig, TensorSpec};
pub use custom::{CustomBackend, CustomFn, ReshapeFn};
pub use engine::{Phase, Single};
pub use error::{BackendError, SingleError};
pub use metrics::InvocationMetrics;
pub use options::{ModelKind, ModelPath, SingleOptions};
pub use registry::{register_custom, BackendFactory, BackendRegistry};
