//! Registry context: owns every extension point and the inject provider.

use std::any::{Any, TypeId};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;

use crate::capability::{self, Capability};
use crate::error::{ExtensionError, Result};
use crate::point::ExtensionPoint;
use crate::provider::InjectProvider;

/// Root of the extension machinery.
///
/// A registry is an explicit, shareable context rather than process-global
/// state: tests and embedders create as many independent registries as they
/// need. Each capability gets exactly one [`ExtensionPoint`] per registry,
/// created on first access.
pub struct Registry {
    points: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    injector: RwLock<Option<Arc<dyn InjectProvider>>>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            points: DashMap::new(),
            injector: RwLock::new(None),
        })
    }

    pub fn with_injector(provider: Arc<dyn InjectProvider>) -> Arc<Self> {
        let registry = Self::new();
        registry.set_injector(provider);
        registry
    }

    /// Installs the dependency resolver used by the injection pass. Replaces
    /// any previous provider; instances already built keep their injections.
    pub fn set_injector(&self, provider: Arc<dyn InjectProvider>) {
        let mut slot = self
            .injector
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(provider);
    }

    pub(crate) fn injector(&self) -> Option<Arc<dyn InjectProvider>> {
        self.injector
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The extension point for a capability, created on first access.
    ///
    /// Idempotent and thread-safe; every call returns the same point. Fails
    /// when the capability descriptor is malformed (blank identifier,
    /// multi-name default, duplicate method specs).
    pub fn extension_point<C: Capability>(self: &Arc<Self>) -> Result<Arc<ExtensionPoint<C>>> {
        capability::validate::<C>()?;
        let entry = Arc::clone(
            self.points
                .entry(TypeId::of::<C>())
                .or_insert_with(|| ExtensionPoint::<C>::new(self) as Arc<dyn Any + Send + Sync>)
                .value(),
        );
        entry
            .downcast::<ExtensionPoint<C>>()
            .map_err(|_| ExtensionError::InvalidCapability {
                capability: C::IDENT.to_string(),
                reason: "stored extension point has an unexpected type".to_string(),
            })
    }
}
