//! File-backed discovery source.
//!
//! A [`FileProvider`] reads `<root>/<capability identifier>` registration
//! files of the form:
//!
//! ```text
//! # comments run to end of line
//! json=serde-json       # name=implementation key
//! fastjson,fst=compact  # several names for one implementation
//! tracing               # bare key: the name equals the key
//! ```
//!
//! The implementation keys on the right-hand side are resolved against a
//! [`CtorCatalog`], the compiled-in table of constructors a crate ships.
//! Unknown keys and unreadable files never abort the scan; they surface as
//! load diagnostics on the owning catalog.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::activation::ActivationSpec;
use crate::capability::Capability;
use crate::error::BoxError;
use crate::provider::{
    AdaptiveCtor, ExtensionCtor, ExtensionProvider, ProvidedEntry, WrapperSpec,
};

/// One directory scanned for registration files, with the scan ordering
/// attributes of a discovery source.
#[derive(Debug, Clone)]
pub struct DiscoveryDir {
    root: PathBuf,
    overriding: bool,
    priority: i32,
}

impl DiscoveryDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            overriding: false,
            priority: 0,
        }
    }

    /// Marks entries from this directory as overriding same-name entries
    /// scanned earlier.
    pub fn overriding(mut self) -> Self {
        self.overriding = true;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// A compiled-in implementation a registration file may reference by key.
enum ImplSpec<C: Capability> {
    Extension {
        ctor: ExtensionCtor<C>,
        activation: Option<ActivationSpec>,
    },
    Wrapper(WrapperSpec<C>),
    Adaptive(AdaptiveCtor<C>),
}

impl<C: Capability> Clone for ImplSpec<C> {
    fn clone(&self) -> Self {
        match self {
            Self::Extension { ctor, activation } => Self::Extension {
                ctor: Arc::clone(ctor),
                activation: activation.clone(),
            },
            Self::Wrapper(spec) => Self::Wrapper(spec.clone()),
            Self::Adaptive(ctor) => Self::Adaptive(Arc::clone(ctor)),
        }
    }
}

/// Key → constructor table backing file discovery for one capability.
pub struct CtorCatalog<C: Capability> {
    by_key: HashMap<String, ImplSpec<C>>,
}

impl<C: Capability> Default for CtorCatalog<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Capability> CtorCatalog<C> {
    pub fn new() -> Self {
        Self {
            by_key: HashMap::new(),
        }
    }

    pub fn extension(
        mut self,
        key: impl Into<String>,
        ctor: impl Fn() -> Result<Box<C::Instance>, BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.by_key.insert(
            key.into(),
            ImplSpec::Extension {
                ctor: Arc::new(ctor),
                activation: None,
            },
        );
        self
    }

    pub fn extension_with(
        mut self,
        key: impl Into<String>,
        ctor: impl Fn() -> Result<Box<C::Instance>, BoxError> + Send + Sync + 'static,
        activation: ActivationSpec,
    ) -> Self {
        self.by_key.insert(
            key.into(),
            ImplSpec::Extension {
                ctor: Arc::new(ctor),
                activation: Some(activation),
            },
        );
        self
    }

    pub fn wrapper(mut self, key: impl Into<String>, spec: WrapperSpec<C>) -> Self {
        self.by_key.insert(key.into(), ImplSpec::Wrapper(spec));
        self
    }

    pub fn adaptive(mut self, key: impl Into<String>, ctor: AdaptiveCtor<C>) -> Self {
        self.by_key.insert(key.into(), ImplSpec::Adaptive(ctor));
        self
    }
}

/// Discovery source that reads one capability's registration file from a
/// [`DiscoveryDir`].
pub struct FileProvider<C: Capability> {
    dir: DiscoveryDir,
    catalog: CtorCatalog<C>,
}

impl<C: Capability> FileProvider<C> {
    pub fn new(dir: DiscoveryDir, catalog: CtorCatalog<C>) -> Self {
        Self { dir, catalog }
    }

    fn parse(&self, contents: &str) -> Vec<ProvidedEntry<C>> {
        let mut entries = Vec::new();
        for raw_line in contents.lines() {
            let line = raw_line
                .split_once('#')
                .map_or(raw_line, |(before, _)| before)
                .trim();
            if line.is_empty() {
                continue;
            }
            let (names, key) = match line.split_once('=') {
                Some((names, key)) => (names.trim(), key.trim()),
                None => (line, line),
            };
            match self.catalog.by_key.get(key) {
                Some(ImplSpec::Extension { ctor, activation }) => {
                    // activation metadata belongs to the first listed name
                    for (i, name) in names.split(',').map(str::trim).enumerate() {
                        entries.push(ProvidedEntry::Named {
                            name: name.to_string(),
                            ctor: Arc::clone(ctor),
                            activation: if i == 0 { activation.clone() } else { None },
                        });
                    }
                }
                Some(ImplSpec::Wrapper(spec)) => {
                    entries.push(ProvidedEntry::Wrapper(spec.clone()));
                }
                Some(ImplSpec::Adaptive(ctor)) => {
                    entries.push(ProvidedEntry::Adaptive(Arc::clone(ctor)));
                }
                None => {
                    let first = names.split(',').next().unwrap_or(key).trim();
                    entries.push(ProvidedEntry::invalid(
                        first,
                        format!("unknown implementation key '{key}'"),
                    ));
                }
            }
        }
        entries
    }
}

impl<C: Capability> ExtensionProvider<C> for FileProvider<C> {
    fn name(&self) -> String {
        format!("file:{}", self.dir.root.join(C::IDENT).display())
    }

    fn entries(&self) -> Vec<ProvidedEntry<C>> {
        let path = self.dir.root.join(C::IDENT);
        match std::fs::read_to_string(&path) {
            Ok(contents) => self.parse(&contents),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!(
                    capability = C::IDENT,
                    path = %path.display(),
                    "No registration file"
                );
                Vec::new()
            }
            Err(err) => {
                tracing::warn!(
                    capability = C::IDENT,
                    path = %path.display(),
                    "Cannot read registration file: {err}"
                );
                vec![ProvidedEntry::invalid(
                    C::IDENT,
                    format!("cannot read {}: {err}", path.display()),
                )]
            }
        }
    }

    fn overriding(&self) -> bool {
        self.dir.overriding
    }

    fn priority(&self) -> i32 {
        self.dir.priority
    }
}
