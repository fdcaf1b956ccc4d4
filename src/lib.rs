//! # extpoint
//!
//! Pluggable capability registry with criteria-based activation and adaptive
//! dispatch.
//!
//! A *capability* is an object-safe trait with any number of named
//! implementations. The registry resolves implementations by name, builds
//! each one at most once per registry (construction, dependency injection,
//! wrapper decoration, lifecycle init), matches auto-activated extensions
//! against a [`Criteria`] context, and synthesizes *adaptive* dispatchers
//! that pick their concrete implementation from values examined at call time.
//!
//! ## Quick Start
//!
//! ```rust
//! use extpoint::{Capability, ExtensionInstance, Registry};
//!
//! trait Codec: ExtensionInstance {
//!     fn encode(&self, payload: &str) -> String;
//! }
//!
//! struct Upper;
//! impl ExtensionInstance for Upper {}
//! impl Codec for Upper {
//!     fn encode(&self, payload: &str) -> String {
//!         payload.to_uppercase()
//!     }
//! }
//!
//! struct CodecCapability;
//! impl Capability for CodecCapability {
//!     type Instance = dyn Codec;
//!     const IDENT: &'static str = "codec";
//!     fn default_name() -> Option<&'static str> {
//!         Some("upper")
//!     }
//! }
//!
//! fn main() -> Result<(), extpoint::ExtensionError> {
//!     let registry = Registry::new();
//!     let codecs = registry.extension_point::<CodecCapability>()?;
//!     codecs.register("upper", || Ok(Box::new(Upper) as Box<dyn Codec>))?;
//!
//!     let codec = codecs.get("default")?;
//!     assert_eq!(codec.encode("hello"), "HELLO");
//!     Ok(())
//! }
//! ```

#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod activation;
pub mod adaptive;
pub mod capability;
pub mod catalog;
pub mod criteria;
pub mod discovery;
pub mod error;
pub mod point;
pub mod provider;
pub mod registry;

// Re-exports for convenience
pub use activation::ActivationSpec;
pub use adaptive::{DispatcherParts, MethodDispatch};
pub use capability::{
    AssignError, Capability, DEFAULT_NAME, ExtensionInstance, InjectPoint, MethodSpec,
    REMOVE_PREFIX,
};
pub use catalog::{Catalog, ExtensionEntry};
pub use criteria::Criteria;
pub use discovery::{CtorCatalog, DiscoveryDir, FileProvider};
pub use error::{BoxError, ExtensionError, Result};
pub use point::ExtensionPoint;
pub use provider::{
    AdaptiveCtor, ExtensionCtor, ExtensionProvider, InjectProvider, ProvidedEntry, WrapperCtor,
    WrapperSpec,
};
pub use registry::Registry;
