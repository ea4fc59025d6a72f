// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Process-wide map from backend names to factories.
//!
//! Backends are registered explicitly and removed explicitly; a handle
//! opened from a factory keeps working after the name is unregistered.
//!
//! ```ignore
//! use single_shot::registry;
//!
//! registry::global().register("my-runtime", factory)?;
//! let backend = registry::global().create("my-runtime", &paths)?;
//! registry::global().unregister("my-runtime");
//! ```

use crate::{Backend, BackendError, CustomBackend, CustomFn, ModelPath, SingleError};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tensor_core::{TensorsData, TensorsInfo};

/// Builds a backend for the given model files.
pub type BackendFactory =
    Arc<dyn Fn(&[ModelPath]) -> Result<Box<dyn Backend>, BackendError> + Send + Sync>;

/// A name → factory map behind a single lock.
#[derive(Default)]
pub struct BackendRegistry {
    factories: RwLock<HashMap<String, BackendFactory>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory. Fails if the name is empty or already taken.
    pub fn register(&self, name: &str, factory: BackendFactory) -> Result<(), SingleError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SingleError::InvalidParameter("empty backend name".into()).reported());
        }
        let mut factories = self.factories.write();
        if factories.contains_key(name) {
            return Err(SingleError::InvalidParameter(format!(
                "backend '{name}' is already registered"
            ))
            .reported());
        }
        factories.insert(name.to_string(), factory);
        tracing::debug!(backend = name, "backend registered");
        Ok(())
    }

    /// Removes a factory. Returns `true` if it was present.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.factories.write().remove(name).is_some();
        if removed {
            tracing::debug!(backend = name, "backend unregistered");
        }
        removed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Instantiates the backend registered under `name`.
    ///
    /// The factory runs outside the registry lock.
    pub fn create(&self, name: &str, models: &[ModelPath]) -> Result<Box<dyn Backend>, SingleError> {
        let factory = self.factories.read().get(name).cloned().ok_or_else(|| {
            SingleError::NotSupported(format!("no backend registered as '{name}'")).reported()
        })?;
        factory(models).map_err(|e| SingleError::from(e).reported())
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}

static GLOBAL: Lazy<BackendRegistry> = Lazy::new(BackendRegistry::new);

/// The process-wide registry used by [`Single::open_with`](crate::Single::open_with).
pub fn global() -> &'static BackendRegistry {
    &GLOBAL
}

/// Registers a callback as a [`CustomBackend`] under `name` in the global
/// registry. Every handle opened from it shares the callback.
pub fn register_custom<F>(
    name: &str,
    input: TensorsInfo,
    output: TensorsInfo,
    callback: F,
) -> Result<(), SingleError>
where
    F: Fn(&TensorsData, &mut TensorsData) -> Result<(), BackendError> + Send + Sync + 'static,
{
    input.validate()?;
    output.validate()?;
    let callback: CustomFn = Arc::new(callback);
    let backend_name = name.to_string();
    let factory: BackendFactory = Arc::new(
        move |_models: &[ModelPath]| -> Result<Box<dyn Backend>, BackendError> {
            Ok(Box::new(CustomBackend::from_shared(
                &backend_name,
                input.clone(),
                output.clone(),
                Arc::clone(&callback),
            )))
        },
    );
    global().register(name, factory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::TensorType;

    fn info() -> TensorsInfo {
        TensorsInfo::from_specs(&[(TensorType::Uint8, &[2])]).unwrap()
    }

    fn factory() -> BackendFactory {
        Arc::new(
            |_models: &[ModelPath]| -> Result<Box<dyn Backend>, BackendError> {
                Ok(Box::new(CustomBackend::new("noop", info(), info(), |_, _| Ok(()))))
            },
        )
    }

    #[test]
    fn test_register_and_create() {
        let reg = BackendRegistry::new();
        reg.register("noop", factory()).unwrap();
        assert!(reg.contains("noop"));
        let backend = reg.create("noop", &[]).unwrap();
        assert_eq!(backend.name(), "noop");
    }

    #[test]
    fn test_duplicate_and_empty_names() {
        let reg = BackendRegistry::new();
        reg.register("noop", factory()).unwrap();
        assert!(reg.register("noop", factory()).is_err());
        assert!(reg.register("  ", factory()).is_err());
    }

    #[test]
    fn test_unregister() {
        let reg = BackendRegistry::new();
        reg.register("b", factory()).unwrap();
        reg.register("a", factory()).unwrap();
        assert_eq!(reg.names(), vec!["a".to_string(), "b".to_string()]);
        assert!(reg.unregister("a"));
        assert!(!reg.unregister("a"));
        assert!(matches!(reg.create("a", &[]), Err(SingleError::NotSupported(_))));
    }

    #[test]
    fn test_factory_error_maps_to_code() {
        let reg = BackendRegistry::new();
        let failing: BackendFactory = Arc::new(
            |_models: &[ModelPath]| -> Result<Box<dyn Backend>, BackendError> {
                Err(BackendError::StartFailed("missing".into()))
            },
        );
        reg.register("broken", failing).unwrap();
        assert!(matches!(
            reg.create("broken", &[]),
            Err(SingleError::StreamsPipe(_))
        ));
    }

    #[test]
    fn test_register_custom_in_global() {
        register_custom("registry-test-custom", info(), info(), |_, _| Ok(())).unwrap();
        assert!(global().contains("registry-test-custom"));
        let backend = global().create("registry-test-custom", &[]).unwrap();
        assert_eq!(backend.name(), "registry-test-custom");
        assert!(global().unregister("registry-test-custom"));
    }
}
