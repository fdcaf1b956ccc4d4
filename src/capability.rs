//! Capability descriptors and the instance contract extensions implement.

use std::any::Any;

use crate::error::{BoxError, ExtensionError, Result};

/// Name reserved for "resolve the configured default extension".
pub const DEFAULT_NAME: &str = "default";

/// Prefix that removes a name from activation in a requested-name list.
pub const REMOVE_PREFIX: char = '-';

/// A dependency an implementation wants injected during the build pipeline.
///
/// This is the explicit-registration counterpart of setter scanning: instead
/// of the registry inferring writable properties, an implementation declares
/// the (property name, type name) pairs it accepts and the registry queries
/// the inject provider for each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectPoint {
    /// Property name, e.g. `"transport"`.
    pub name: &'static str,
    /// Declared type of the dependency, e.g. `"dyn Transport"`.
    pub type_name: &'static str,
}

impl InjectPoint {
    pub const fn new(name: &'static str, type_name: &'static str) -> Self {
        Self { name, type_name }
    }
}

/// Raised by [`ExtensionInstance::assign`] when a resolved dependency cannot
/// be accepted. Assignment failures are logged and skipped per property; they
/// never abort a build.
#[derive(Debug, thiserror::Error)]
#[error("cannot assign property '{point}': {reason}")]
pub struct AssignError {
    pub point: String,
    pub reason: String,
}

impl AssignError {
    pub fn new(point: &InjectPoint, reason: impl Into<String>) -> Self {
        Self {
            point: point.name.to_string(),
            reason: reason.into(),
        }
    }

    /// The instance declares no such inject point.
    pub fn unknown(point: &InjectPoint) -> Self {
        Self::new(point, "no such inject point")
    }

    /// The resolved dependency had an unexpected concrete type.
    pub fn type_mismatch(point: &InjectPoint) -> Self {
        Self::new(point, format!("dependency is not a {}", point.type_name))
    }
}

/// Contract every concrete extension implementation fulfills.
///
/// The registry drives a fixed pipeline over this surface: construct, inject
/// each declared [`InjectPoint`], wrap, then [`initialize`](Self::initialize).
/// All methods have do-nothing defaults so stateless implementations need an
/// empty `impl` block only.
pub trait ExtensionInstance: Any + Send + Sync {
    /// Dependencies this instance wants resolved against the inject provider.
    fn inject_points(&self) -> &[InjectPoint] {
        &[]
    }

    /// Accepts a dependency resolved for one of the declared points.
    fn assign(
        &mut self,
        point: &InjectPoint,
        dep: Box<dyn Any + Send + Sync>,
    ) -> std::result::Result<(), AssignError> {
        let _ = dep;
        Err(AssignError::unknown(point))
    }

    /// Lifecycle hook run once, after injection and wrapping. An error here
    /// fails the whole build.
    fn initialize(&mut self) -> std::result::Result<(), BoxError> {
        Ok(())
    }
}

/// Static description of one capability method, consumed by the adaptive
/// dispatcher synthesizer.
///
/// This table replaces signature introspection: for each selector-dependent
/// method it records which parameter supplies the [`Criteria`](crate::Criteria)
/// and which candidate keys to try, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSpec {
    pub name: &'static str,
    /// Whether the method resolves its implementation from call arguments.
    pub adaptive: bool,
    /// Candidate selector keys, tried in declaration order. Empty means the
    /// capability's own identifier is used as the single derived key.
    pub keys: &'static [&'static str],
    /// Index of the parameter carrying the criteria context, if any.
    pub criteria_arg: Option<usize>,
}

impl MethodSpec {
    /// A selector-dependent method.
    pub const fn adaptive(
        name: &'static str,
        keys: &'static [&'static str],
        criteria_arg: usize,
    ) -> Self {
        Self {
            name,
            adaptive: true,
            keys,
            criteria_arg: Some(criteria_arg),
        }
    }

    /// A method with no way to obtain a criteria context. Declaring it
    /// adaptive anyway fails dispatcher synthesis at build time.
    pub const fn adaptive_without_criteria(name: &'static str) -> Self {
        Self {
            name,
            adaptive: true,
            keys: &[],
            criteria_arg: None,
        }
    }

    /// A plain method; the adaptive dispatcher rejects calls to it.
    pub const fn plain(name: &'static str) -> Self {
        Self {
            name,
            adaptive: false,
            keys: &[],
            criteria_arg: None,
        }
    }
}

/// An abstract named capability with zero or more implementations.
///
/// Implementors are zero-sized marker types; the interesting part is the
/// associated `Instance` type, the object-safe trait callers program against
/// (e.g. `dyn Codec`). That trait must have [`ExtensionInstance`] as a
/// supertrait so the registry can run the build pipeline over it.
pub trait Capability: 'static {
    /// The capability trait object, e.g. `dyn Codec`.
    type Instance: ?Sized + ExtensionInstance;

    /// Short identifier; names the discovery file and the derived selector
    /// key, and appears in every diagnostic.
    const IDENT: &'static str;

    /// Documented default extension name, if any.
    fn default_name() -> Option<&'static str> {
        None
    }

    /// Statically authored dispatch table for adaptive synthesis.
    fn methods() -> &'static [MethodSpec] {
        &[]
    }
}

/// Checks the capability descriptor carries the required shape.
pub(crate) fn validate<C: Capability>() -> Result<()> {
    let invalid = |reason: &str| ExtensionError::InvalidCapability {
        capability: C::IDENT.to_string(),
        reason: reason.to_string(),
    };

    if C::IDENT.trim().is_empty() {
        return Err(invalid("empty identifier"));
    }
    if C::IDENT.contains([',', ' ', '\t', '\n']) {
        return Err(invalid("identifier must not contain whitespace or commas"));
    }
    if let Some(default) = C::default_name() {
        if default.trim().is_empty() {
            return Err(invalid("default extension name is blank"));
        }
        if default.contains(',') {
            return Err(invalid("more than one default extension name"));
        }
    }
    let methods = C::methods();
    for (i, spec) in methods.iter().enumerate() {
        if methods[..i].iter().any(|m| m.name == spec.name) {
            return Err(ExtensionError::InvalidCapability {
                capability: C::IDENT.to_string(),
                reason: format!("duplicate method spec '{}'", spec.name),
            });
        }
    }
    Ok(())
}
