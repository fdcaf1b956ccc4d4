//! Adaptive dispatch: per-method selection handles synthesized from a
//! capability's static method table.
//!
//! Instead of generating a dispatcher implementation at load time, the
//! registry hands the adaptive constructor a [`DispatcherParts`] built from
//! [`Capability::methods`]. The dispatcher keeps one [`MethodDispatch`] per
//! selector-dependent method and funnels every call through
//! [`MethodDispatch::select`], which turns the call's criteria context into a
//! concrete extension instance.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::capability::Capability;
use crate::criteria::Criteria;
use crate::error::{ExtensionError, Result};
use crate::point::ExtensionPoint;

/// Selection handle for one adaptive method.
pub struct MethodDispatch<C: Capability> {
    point: Weak<ExtensionPoint<C>>,
    method: &'static str,
    keys: Vec<&'static str>,
    default_name: Option<&'static str>,
}

impl<C: Capability> Clone for MethodDispatch<C> {
    fn clone(&self) -> Self {
        Self {
            point: Weak::clone(&self.point),
            method: self.method,
            keys: self.keys.clone(),
            default_name: self.default_name,
        }
    }
}

impl<C: Capability> MethodDispatch<C> {
    /// The candidate selector keys, in the order they are tried.
    pub fn keys(&self) -> &[&'static str] {
        &self.keys
    }

    /// Resolves the target extension for one call.
    ///
    /// The first declared key with a present, non-empty value in the criteria
    /// wins; when no key yields a value the capability's default name is
    /// used. A missing criteria context and an unresolvable selector are both
    /// call-time errors, raised before any instance is touched.
    pub fn select(&self, cx: Option<&Criteria>) -> Result<Arc<C::Instance>> {
        let point = self.point.upgrade().ok_or_else(|| ExtensionError::RegistryGone {
            capability: C::IDENT.to_string(),
        })?;
        let cx = cx.ok_or_else(|| ExtensionError::MissingCriteria {
            capability: C::IDENT.to_string(),
            method: self.method.to_string(),
        })?;

        let mut selected: Option<&str> = None;
        for key in &self.keys {
            if let Some(value) = cx.get(key) {
                if !value.is_empty() {
                    selected = Some(value);
                    break;
                }
            }
        }
        let name = match selected.or(self.default_name) {
            Some(name) => name.to_string(),
            None => {
                return Err(ExtensionError::SelectorMissing {
                    capability: C::IDENT.to_string(),
                    keys: self.keys.iter().map(|k| k.to_string()).collect(),
                });
            }
        };
        point.get(&name)
    }
}

/// Everything an adaptive constructor needs: one dispatch handle per
/// selector-dependent method of the capability.
pub struct DispatcherParts<C: Capability> {
    methods: HashMap<&'static str, MethodDispatch<C>>,
}

impl<C: Capability> DispatcherParts<C> {
    /// Takes the dispatch handle for a declared adaptive method.
    pub fn dispatch(&self, method: &str) -> Result<MethodDispatch<C>> {
        self.methods.get(method).cloned().ok_or_else(|| {
            ExtensionError::adaptive(
                C::IDENT,
                format!("method '{method}' is not in the dispatch table"),
            )
        })
    }

    /// The error an adaptive dispatcher raises from methods that have no way
    /// to carry a selector.
    pub fn unsupported(&self, method: &str) -> ExtensionError {
        ExtensionError::UnsupportedOperation {
            capability: C::IDENT.to_string(),
            method: method.to_string(),
        }
    }
}

/// Builds the dispatch table, validating the capability's method table.
///
/// Fails when no method is marked adaptive, or when an adaptive method
/// declares no criteria parameter. A method that declares no candidate keys
/// gets the capability identifier as its single derived key.
pub(crate) fn build_parts<C: Capability>(
    point: &Arc<ExtensionPoint<C>>,
) -> Result<DispatcherParts<C>> {
    let specs = C::methods();
    if !specs.iter().any(|m| m.adaptive) {
        return Err(ExtensionError::adaptive(
            C::IDENT,
            "no adaptive method declared in the method table",
        ));
    }

    let mut methods = HashMap::new();
    for spec in specs.iter().filter(|m| m.adaptive) {
        if spec.criteria_arg.is_none() {
            return Err(ExtensionError::adaptive(
                C::IDENT,
                format!("adaptive method '{}' has no criteria parameter", spec.name),
            ));
        }
        let keys: Vec<&'static str> = if spec.keys.is_empty() {
            vec![C::IDENT]
        } else {
            spec.keys.to_vec()
        };
        methods.insert(
            spec.name,
            MethodDispatch {
                point: Arc::downgrade(point),
                method: spec.name,
                keys,
                default_name: C::default_name(),
            },
        );
    }
    Ok(DispatcherParts { methods })
}
