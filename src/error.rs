//! Error taxonomy shared by every resolution operation.

use std::sync::Arc;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ExtensionError>;

/// Boxed cause for build and lifecycle failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by capability resolution, construction and adaptive dispatch.
///
/// Every variant names the capability it concerns; resolution errors also name
/// the offending extension or method. The enum is `Clone` so that sticky
/// failures (duplicate registrations, failed dispatcher builds) can be cached
/// and re-raised identically on every later call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtensionError {
    /// The capability descriptor is missing required shape (empty identifier,
    /// malformed default name, duplicate method specs).
    #[error("invalid capability '{capability}': {reason}")]
    InvalidCapability { capability: String, reason: String },

    /// No extension registered under the requested name. Carries load-time
    /// diagnostics for names sharing a prefix, to help spot typos and broken
    /// registrations.
    #[error("no extension '{name}' for capability '{capability}'{diagnostics}")]
    NotFound {
        capability: String,
        name: String,
        diagnostics: String,
    },

    /// Two descriptors claimed the same name without override permission.
    /// Recorded at load time and raised on every future lookup of that name.
    #[error(
        "duplicate extension '{name}' for capability '{capability}': registered by {first} and {second}"
    )]
    DuplicateRegistration {
        capability: String,
        name: String,
        first: String,
        second: String,
    },

    /// Raw construction, wrapping or lifecycle init failed. The instance slot
    /// stays empty, so a fixed registration can succeed on a later call.
    #[error("failed to build extension '{name}' of capability '{capability}': {source}")]
    BuildFailure {
        capability: String,
        name: String,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// Adaptive dispatcher synthesis failed. Sticky: the identical error is
    /// returned on every subsequent request, never recomputed.
    #[error("failed to build adaptive dispatcher for capability '{capability}': {reason}")]
    AdaptiveBuildFailure { capability: String, reason: String },

    /// The designated criteria argument of an adaptive method was absent.
    #[error("missing criteria context for adaptive method '{method}' of capability '{capability}'")]
    MissingCriteria { capability: String, method: String },

    /// No selector string could be extracted from the criteria context.
    #[error("failed to get extension name for capability '{capability}' from criteria by keys {keys:?}")]
    SelectorMissing {
        capability: String,
        keys: Vec<String>,
    },

    /// A non-selector-dependent method was invoked through the adaptive
    /// dispatcher.
    #[error("method '{method}' of capability '{capability}' is not selector-dependent")]
    UnsupportedOperation { capability: String, method: String },

    /// Registration was attempted after the catalog had already loaded.
    #[error("extension catalog for capability '{capability}' is already loaded")]
    CatalogSealed { capability: String },

    /// An adaptive dispatcher outlived the registry it was built from.
    #[error("registry for capability '{capability}' is no longer alive")]
    RegistryGone { capability: String },
}

impl ExtensionError {
    pub(crate) fn build_failure(
        capability: &str,
        name: &str,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::BuildFailure {
            capability: capability.to_string(),
            name: name.to_string(),
            source: Arc::from(source.into()),
        }
    }

    pub(crate) fn adaptive(capability: &str, reason: impl Into<String>) -> Self {
        Self::AdaptiveBuildFailure {
            capability: capability.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns the capability identifier this error concerns.
    pub fn capability(&self) -> &str {
        match self {
            Self::InvalidCapability { capability, .. }
            | Self::NotFound { capability, .. }
            | Self::DuplicateRegistration { capability, .. }
            | Self::BuildFailure { capability, .. }
            | Self::AdaptiveBuildFailure { capability, .. }
            | Self::MissingCriteria { capability, .. }
            | Self::SelectorMissing { capability, .. }
            | Self::UnsupportedOperation { capability, .. }
            | Self::CatalogSealed { capability }
            | Self::RegistryGone { capability } => capability,
        }
    }
}
