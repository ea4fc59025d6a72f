// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Tensor descriptors and thread-safe tensor buffers for single-shot model
//! invocation.
//!
//! This crate provides:
//! - [`TensorsInfo`]: name, element type and dimensions of 1 to 16 tensors,
//!   in legacy (rank 4) or extended (rank 8) mode.
//! - [`TensorType`]: supported element types.
//! - [`TensorsData`]: per-tensor memory bound to a descriptor, with an
//!   [`Ownership`] tag per slot and its own lock.
//! - [`ErrorCode`] and [`TensorError`]: the status taxonomy shared with the
//!   invocation engine, plus the [`diagnostic`] last-error slot.
//!
//! # Design Goals
//! - Release of every buffer goes through one exhaustive ownership match.
//! - Sizes are always `element size × product of dimensions`.
//! - Clean error types via `thiserror`.

mod data;
pub mod diagnostic;
mod dtype;
mod error;
mod info;

pub use data::{Ownership, OwnershipKind, ReleaseFn, TensorsData, TensorsDataGuard};
pub use diagnostic::last_error;
pub use dtype::TensorType;
pub use error::{ErrorCode, TensorError};
pub use info::{TensorInfo, TensorsInfo, LEGACY_RANK, MAX_RANK, MAX_TENSORS};
