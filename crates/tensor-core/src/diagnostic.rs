// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Process-wide "last error" diagnostic slot.
//!
//! Every error reported by this workspace overwrites a single slot with a
//! human-readable message. Reading the slot marks it consumed: a second
//! [`last_error`] before a new error is reported returns `None`.
//!
//! The slot is shared by all threads, so concurrent failures are
//! last-writer-wins. Status codes returned from the failing call are always
//! exact; only the message may belong to another thread.

use crate::ErrorCode;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::fmt::Display;

/// A single-entry message slot with a one-shot read flag.
#[derive(Debug, Default)]
pub struct DiagnosticSlot {
    inner: Mutex<SlotState>,
}

#[derive(Debug, Default)]
struct SlotState {
    message: Option<String>,
    consumed: bool,
}

impl DiagnosticSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stored message and clears the read flag.
    pub fn store(&self, message: String) {
        let mut state = self.inner.lock();
        state.message = Some(message);
        state.consumed = false;
    }

    /// Returns the stored message unless it has already been read.
    pub fn take(&self) -> Option<String> {
        let mut state = self.inner.lock();
        if state.consumed {
            return None;
        }
        state.consumed = true;
        state.message.clone()
    }
}

static LAST_ERROR: Lazy<DiagnosticSlot> = Lazy::new(DiagnosticSlot::new);

/// Records an error in the process-wide slot and logs it.
pub fn report(code: ErrorCode, error: &dyn Display) {
    let message = format!("[{code}] {error}");
    tracing::warn!("{message}");
    LAST_ERROR.store(message);
}

/// Returns the most recent error message, at most once per report.
pub fn last_error() -> Option<String> {
    LAST_ERROR.take()
}
