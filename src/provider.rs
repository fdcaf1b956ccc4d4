//! External collaborator contracts: discovery and dependency injection.

use std::any::Any;
use std::sync::Arc;

use crate::activation::ActivationSpec;
use crate::adaptive::DispatcherParts;
use crate::capability::Capability;
use crate::error::{BoxError, ExtensionError};

/// Shared constructor for a named extension implementation.
pub type ExtensionCtor<C> = Arc<
    dyn Fn() -> Result<Box<<C as Capability>::Instance>, BoxError> + Send + Sync,
>;

/// Shared constructor for a wrapper; receives the instance it decorates.
pub type WrapperCtor<C> = Arc<
    dyn Fn(Box<<C as Capability>::Instance>) -> Result<Box<<C as Capability>::Instance>, BoxError>
        + Send
        + Sync,
>;

/// Shared constructor for the adaptive dispatcher; receives the per-method
/// dispatch handles derived from the capability's method table.
pub type AdaptiveCtor<C> = Arc<
    dyn Fn(DispatcherParts<C>) -> Result<Box<<C as Capability>::Instance>, ExtensionError>
        + Send
        + Sync,
>;

/// A decorator that wraps any named extension of its capability.
///
/// Wrappers never appear in the name catalog and are invisible to name-based
/// existence checks. An empty `matches` list wraps every extension; otherwise
/// only listed names are wrapped, minus any `mismatches`.
pub struct WrapperSpec<C: Capability> {
    pub(crate) wrap: WrapperCtor<C>,
    pub(crate) order: i32,
    pub(crate) matches: Vec<String>,
    pub(crate) mismatches: Vec<String>,
}

impl<C: Capability> WrapperSpec<C> {
    pub fn new(
        wrap: impl Fn(Box<C::Instance>) -> Result<Box<C::Instance>, BoxError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            wrap: Arc::new(wrap),
            order: 0,
            matches: Vec::new(),
            mismatches: Vec::new(),
        }
    }

    /// Declared order; the lowest order ends up as the outermost decorator.
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Restricts wrapping to the given extension name.
    pub fn matches(mut self, name: impl Into<String>) -> Self {
        self.matches.push(name.into());
        self
    }

    /// Excludes the given extension name from wrapping.
    pub fn mismatches(mut self, name: impl Into<String>) -> Self {
        self.mismatches.push(name.into());
        self
    }

    pub(crate) fn accepts(&self, name: &str) -> bool {
        let matched = self.matches.is_empty() || self.matches.iter().any(|m| m == name);
        matched && !self.mismatches.iter().any(|m| m == name)
    }
}

impl<C: Capability> Clone for WrapperSpec<C> {
    fn clone(&self) -> Self {
        Self {
            wrap: Arc::clone(&self.wrap),
            order: self.order,
            matches: self.matches.clone(),
            mismatches: self.mismatches.clone(),
        }
    }
}

/// One registration yielded by a discovery scan.
pub enum ProvidedEntry<C: Capability> {
    /// A named implementation, optionally carrying activation metadata.
    Named {
        name: String,
        ctor: ExtensionCtor<C>,
        activation: Option<ActivationSpec>,
    },
    /// A decorator applied around named instances.
    Wrapper(WrapperSpec<C>),
    /// The adaptive dispatcher constructor.
    Adaptive(AdaptiveCtor<C>),
    /// A registration the source could not produce; recorded as a load-time
    /// diagnostic and surfaced in later `NotFound` errors.
    Invalid { name: String, message: String },
}

impl<C: Capability> Clone for ProvidedEntry<C> {
    fn clone(&self) -> Self {
        match self {
            Self::Named {
                name,
                ctor,
                activation,
            } => Self::Named {
                name: name.clone(),
                ctor: Arc::clone(ctor),
                activation: activation.clone(),
            },
            Self::Wrapper(spec) => Self::Wrapper(spec.clone()),
            Self::Adaptive(ctor) => Self::Adaptive(Arc::clone(ctor)),
            Self::Invalid { name, message } => Self::Invalid {
                name: name.clone(),
                message: message.clone(),
            },
        }
    }
}

impl<C: Capability> ProvidedEntry<C> {
    pub fn named(
        name: impl Into<String>,
        ctor: impl Fn() -> Result<Box<C::Instance>, BoxError> + Send + Sync + 'static,
    ) -> Self {
        Self::Named {
            name: name.into(),
            ctor: Arc::new(ctor),
            activation: None,
        }
    }

    pub fn activated(
        name: impl Into<String>,
        ctor: impl Fn() -> Result<Box<C::Instance>, BoxError> + Send + Sync + 'static,
        activation: ActivationSpec,
    ) -> Self {
        Self::Named {
            name: name.into(),
            ctor: Arc::new(ctor),
            activation: Some(activation),
        }
    }

    pub fn wrapper(spec: WrapperSpec<C>) -> Self {
        Self::Wrapper(spec)
    }

    pub fn adaptive(
        ctor: impl Fn(DispatcherParts<C>) -> Result<Box<C::Instance>, ExtensionError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self::Adaptive(Arc::new(ctor))
    }

    pub fn invalid(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Discovery collaborator: yields the registrations for one capability.
///
/// Multiple providers may be attached to an extension point; they are scanned
/// exactly once, at first catalog access, in ascending [`priority`](Self::priority)
/// order (ties scan in attachment order). A later source may override an
/// earlier same-name entry only when it is [`overriding`](Self::overriding);
/// otherwise the duplicate is a sticky registration error for that name.
pub trait ExtensionProvider<C: Capability>: Send + Sync {
    /// Label used in duplicate and load diagnostics.
    fn name(&self) -> String {
        "provider".to_string()
    }

    fn entries(&self) -> Vec<ProvidedEntry<C>>;

    fn overriding(&self) -> bool {
        false
    }

    fn priority(&self) -> i32 {
        0
    }
}

/// Injection collaborator: resolves a dependency by declared type and
/// property name. Never errs for "not found"; absence skips the property.
pub trait InjectProvider: Send + Sync {
    fn resolve(&self, type_name: &str, property: &str) -> Option<Box<dyn Any + Send + Sync>>;
}
