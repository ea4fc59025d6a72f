// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The capability interface inference runtimes implement to plug into a
//! [`Single`](crate::Single).
//!
//! The engine guarantees a backend is never called from two threads at
//! once and never after [`Backend::stop`]; implementations need not be
//! `Sync`.

use crate::BackendError;
use tensor_core::{TensorsData, TensorsInfo};

/// A pluggable inference runtime.
pub trait Backend: Send + 'static {
    /// Short runtime name used in logs.
    fn name(&self) -> &str;

    /// Loads whatever the runtime needs before the first invocation.
    fn start(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Releases runtime resources. Called once, after the last invocation.
    fn stop(&mut self) {}

    /// Input descriptor the runtime currently expects, if it has one.
    fn input_info(&self) -> Option<TensorsInfo>;

    /// Output descriptor the runtime currently produces, if it has one.
    fn output_info(&self) -> Option<TensorsInfo>;

    fn input_configured(&self) -> bool {
        self.input_info().is_some()
    }

    fn output_configured(&self) -> bool {
        self.output_info().is_some()
    }

    /// Reconfigures the runtime for a new input shape and returns the
    /// output descriptor that results.
    ///
    /// Runtimes that cannot reshape return [`BackendError::NotSupported`].
    fn set_input_info(&mut self, info: &TensorsInfo) -> Result<TensorsInfo, BackendError> {
        let _ = info;
        Err(BackendError::NotSupported("dynamic input reshaping".into()))
    }

    /// Runs one inference.
    ///
    /// When `allocate_output` is set, `output` arrives without memory and
    /// the backend attaches its own, usually tagged
    /// [`Ownership::BackendOwned`](tensor_core::Ownership::BackendOwned).
    /// Otherwise `output` is pre-allocated to the output descriptor.
    fn invoke(
        &mut self,
        input: &TensorsData,
        output: &mut TensorsData,
        allocate_output: bool,
    ) -> Result<(), BackendError>;

    /// Whether the runtime allocates output memory itself.
    fn allocates_output(&self) -> bool {
        false
    }

    /// Takes back an output the runtime allocated. The default releases
    /// each slot through its ownership tag.
    fn release_output(&mut self, output: TensorsData) {
        output.lock().release_all();
    }

    fn get_property(&self, name: &str) -> Result<String, BackendError> {
        Err(BackendError::Property {
            name: name.to_string(),
            detail: "unknown property".into(),
        })
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), BackendError> {
        let _ = value;
        Err(BackendError::Property {
            name: name.to_string(),
            detail: "unknown property".into(),
        })
    }
}
