// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! A backend built from a plain callback.
//!
//! [`CustomBackend`] turns any `Fn(&TensorsData, &mut TensorsData)` into a
//! [`Backend`] with fixed input/output descriptors. It is how application
//! code (and the test suite) plugs its own computation into the engine
//! without writing a runtime.

use crate::{Backend, BackendError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tensor_core::{Ownership, TensorsData, TensorsInfo};

/// The computation a [`CustomBackend`] runs per invocation.
pub type CustomFn =
    Arc<dyn Fn(&TensorsData, &mut TensorsData) -> Result<(), BackendError> + Send + Sync>;

/// Derives a new output descriptor from a requested input descriptor.
pub type ReshapeFn = Arc<dyn Fn(&TensorsInfo) -> Result<TensorsInfo, BackendError> + Send + Sync>;

/// Callback-driven backend with fixed shapes.
///
/// # Example
/// ```
/// use single_shot::CustomBackend;
/// use tensor_core::{TensorType, TensorsInfo};
///
/// let info = TensorsInfo::from_specs(&[(TensorType::Uint8, &[4])]).unwrap();
/// let backend = CustomBackend::new("copy", info.clone(), info, |input, output| {
///     let bytes = input.get_tensor_data(0)?;
///     output.set_tensor_data(0, &bytes)?;
///     Ok(())
/// });
/// ```
pub struct CustomBackend {
    name: String,
    input: TensorsInfo,
    output: TensorsInfo,
    callback: CustomFn,
    reshape: Option<ReshapeFn>,
    allocate_output: bool,
    released: Arc<AtomicUsize>,
    properties: HashMap<String, String>,
}

impl CustomBackend {
    pub fn new<F>(name: &str, input: TensorsInfo, output: TensorsInfo, callback: F) -> Self
    where
        F: Fn(&TensorsData, &mut TensorsData) -> Result<(), BackendError> + Send + Sync + 'static,
    {
        Self::from_shared(name, input, output, Arc::new(callback))
    }

    /// Builds a backend around an already shared callback.
    pub fn from_shared(
        name: &str,
        input: TensorsInfo,
        output: TensorsInfo,
        callback: CustomFn,
    ) -> Self {
        Self {
            name: name.to_string(),
            input,
            output,
            callback,
            reshape: None,
            allocate_output: false,
            released: Arc::new(AtomicUsize::new(0)),
            properties: HashMap::new(),
        }
    }

    /// Accepts new input shapes, deriving the output descriptor with
    /// `reshape`.
    pub fn with_reshape<F>(mut self, reshape: F) -> Self
    where
        F: Fn(&TensorsInfo) -> Result<TensorsInfo, BackendError> + Send + Sync + 'static,
    {
        self.reshape = Some(Arc::new(reshape));
        self
    }

    /// Makes the backend allocate its own output memory, lent to the
    /// engine as [`Ownership::BackendOwned`].
    pub fn with_backend_allocation(mut self) -> Self {
        self.allocate_output = true;
        self
    }

    /// Counter of backend-lent output tensors handed back so far.
    pub fn release_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.released)
    }

    fn lend_output(&self, output: &mut TensorsData) -> Result<(), BackendError> {
        let mut guard = output.lock();
        for index in 0..guard.count() {
            let size = guard.size(index)?;
            let released = Arc::clone(&self.released);
            guard.attach(
                index,
                vec![0; size],
                Ownership::BackendOwned(Box::new(move |_bytes| {
                    released.fetch_add(1, Ordering::SeqCst);
                })),
            )?;
        }
        Ok(())
    }
}

impl Backend for CustomBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_info(&self) -> Option<TensorsInfo> {
        Some(self.input.clone())
    }

    fn output_info(&self) -> Option<TensorsInfo> {
        Some(self.output.clone())
    }

    fn set_input_info(&mut self, info: &TensorsInfo) -> Result<TensorsInfo, BackendError> {
        if info.is_equal(&self.input) {
            return Ok(self.output.clone());
        }
        let reshape = self
            .reshape
            .as_ref()
            .ok_or_else(|| BackendError::NotSupported(format!("reshaping input to {info}")))?;
        let output = reshape(info)?;
        output.validate()?;
        self.input = info.clone();
        self.output = output.clone();
        Ok(output)
    }

    fn invoke(
        &mut self,
        input: &TensorsData,
        output: &mut TensorsData,
        allocate_output: bool,
    ) -> Result<(), BackendError> {
        if allocate_output {
            self.lend_output(output)?;
        }
        (self.callback)(input, output)
    }

    fn allocates_output(&self) -> bool {
        self.allocate_output
    }

    fn get_property(&self, name: &str) -> Result<String, BackendError> {
        match name {
            "input" => Ok(self.input.to_string()),
            "output" => Ok(self.output.to_string()),
            _ => self
                .properties
                .get(name)
                .cloned()
                .ok_or_else(|| BackendError::Property {
                    name: name.to_string(),
                    detail: "not set".into(),
                }),
        }
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), BackendError> {
        if matches!(name, "input" | "output") {
            return Err(BackendError::Property {
                name: name.to_string(),
                detail: "read-only".into(),
            });
        }
        self.properties.insert(name.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::{OwnershipKind, TensorType};

    fn u8_info(n: u32) -> TensorsInfo {
        TensorsInfo::from_specs(&[(TensorType::Uint8, &[n])]).unwrap()
    }

    fn doubler() -> CustomBackend {
        CustomBackend::new("double", u8_info(4), u8_info(4), |input, output| {
            let bytes: Vec<u8> = input.get_tensor_data(0)?.iter().map(|b| b * 2).collect();
            output.set_tensor_data(0, &bytes)?;
            Ok(())
        })
    }

    #[test]
    fn test_invoke_runs_callback() {
        let mut b = doubler();
        let input = TensorsData::from_vecs(&u8_info(4), vec![vec![1, 2, 3, 4]]).unwrap();
        let mut output = TensorsData::new(&u8_info(4)).unwrap();
        b.invoke(&input, &mut output, false).unwrap();
        assert_eq!(output.get_tensor_data(0).unwrap(), vec![2, 4, 6, 8]);
    }

    #[test]
    fn test_reshape_requires_hook() {
        let mut b = doubler();
        assert!(b.set_input_info(&u8_info(4)).is_ok());
        assert!(matches!(
            b.set_input_info(&u8_info(8)),
            Err(BackendError::NotSupported(_))
        ));

        let mut b = doubler().with_reshape(|info| Ok(info.clone()));
        let out = b.set_input_info(&u8_info(8)).unwrap();
        assert_eq!(out, u8_info(8));
        assert_eq!(b.input_info(), Some(u8_info(8)));
    }

    #[test]
    fn test_backend_allocation_is_lent_and_returned() {
        let mut b = doubler().with_backend_allocation();
        let counter = b.release_counter();
        assert!(b.allocates_output());

        let input = TensorsData::new(&u8_info(4)).unwrap();
        let mut output = TensorsData::new_no_alloc(&u8_info(4)).unwrap();
        b.invoke(&input, &mut output, true).unwrap();
        assert_eq!(output.ownership(0).unwrap(), OwnershipKind::Backend);

        b.release_output(output);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_properties() {
        let mut b = doubler();
        assert_eq!(b.get_property("input").unwrap(), "uint8[4]");
        assert!(b.set_property("output", "x").is_err());
        assert!(b.get_property("custom").is_err());
        b.set_property("custom", "scale=2").unwrap();
        assert_eq!(b.get_property("custom").unwrap(), "scale=2");
    }
}
