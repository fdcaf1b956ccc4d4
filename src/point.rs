//! Per-capability extension point: instance cache, build pipeline and
//! activation resolver.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, RwLock, Weak};

use dashmap::DashMap;

use crate::activation::{ActivationSpec, activation_cmp, wrapper_cmp};
use crate::adaptive::{self, DispatcherParts};
use crate::capability::{Capability, DEFAULT_NAME, ExtensionInstance, InjectPoint, REMOVE_PREFIX};
use crate::catalog::Catalog;
use crate::criteria::Criteria;
use crate::error::{BoxError, ExtensionError, Result};
use crate::provider::{ExtensionProvider, ProvidedEntry, WrapperSpec};
use crate::registry::Registry;

/// Per-name instance slot. The cell is the fast path; the build mutex
/// serializes construction so at most one build per name ever runs. A failed
/// build leaves the cell empty, so a later call retries.
struct Slot<C: Capability> {
    cell: OnceLock<Arc<C::Instance>>,
    build: Mutex<()>,
}

impl<C: Capability> Slot<C> {
    fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            build: Mutex::new(()),
        }
    }
}

enum AdaptiveState<C: Capability> {
    Empty,
    Ready(Arc<C::Instance>),
    /// The first adaptive build error, re-returned on every later call.
    Failed(ExtensionError),
}

/// Registrations staged before the catalog loads.
struct Staging<C: Capability> {
    entries: Vec<ProvidedEntry<C>>,
    providers: Vec<Arc<dyn ExtensionProvider<C>>>,
    sealed: bool,
}

/// Discovery source backed by the point's own registration API.
struct DirectProvider<C: Capability> {
    entries: Vec<ProvidedEntry<C>>,
}

impl<C: Capability> ExtensionProvider<C> for DirectProvider<C> {
    fn name(&self) -> String {
        "registered".to_string()
    }

    fn entries(&self) -> Vec<ProvidedEntry<C>> {
        self.entries.clone()
    }
}

/// One capability's view of the registry: holds the lazily loaded
/// [`Catalog`], the per-name instance cache and the adaptive dispatcher slot.
///
/// Obtained from [`Registry::extension_point`]; cheap to clone via `Arc` and
/// safe to share across threads.
pub struct ExtensionPoint<C: Capability> {
    registry: Weak<Registry>,
    staging: Mutex<Staging<C>>,
    catalog: OnceLock<Catalog<C>>,
    slots: DashMap<String, Arc<Slot<C>>>,
    raw_slots: DashMap<String, Arc<Slot<C>>>,
    adaptive: RwLock<AdaptiveState<C>>,
}

fn relock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs one build stage, turning a panic into an ordinary cause so the whole
/// failure surfaces as `BuildFailure` and the slot stays retryable.
fn caught<T>(
    stage: impl FnOnce() -> std::result::Result<T, BoxError>,
) -> std::result::Result<T, BoxError> {
    match catch_unwind(AssertUnwindSafe(stage)) {
        Ok(result) => result,
        Err(payload) => Err(panic_cause(payload)),
    }
}

fn panic_cause(payload: Box<dyn Any + Send>) -> BoxError {
    let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    };
    format!("panicked: {message}").into()
}

impl<C: Capability> ExtensionPoint<C> {
    pub(crate) fn new(registry: &Arc<Registry>) -> Arc<Self> {
        Arc::new(Self {
            registry: Arc::downgrade(registry),
            staging: Mutex::new(Staging {
                entries: Vec::new(),
                providers: Vec::new(),
                sealed: false,
            }),
            catalog: OnceLock::new(),
            slots: DashMap::new(),
            raw_slots: DashMap::new(),
            adaptive: RwLock::new(AdaptiveState::Empty),
        })
    }

    /// The loaded catalog, scanning providers on first access.
    pub fn catalog(&self) -> &Catalog<C> {
        self.catalog.get_or_init(|| {
            let mut staging = relock(&self.staging);
            staging.sealed = true;
            let mut providers: Vec<Arc<dyn ExtensionProvider<C>>> = Vec::new();
            if !staging.entries.is_empty() {
                providers.push(Arc::new(DirectProvider {
                    entries: std::mem::take(&mut staging.entries),
                }));
            }
            providers.extend(staging.providers.iter().map(Arc::clone));
            drop(staging);
            Catalog::load(&providers)
        })
    }

    // --- registration API, usable until the catalog loads ---

    fn stage(&self, entry: ProvidedEntry<C>) -> Result<()> {
        let mut staging = relock(&self.staging);
        if staging.sealed {
            return Err(ExtensionError::CatalogSealed {
                capability: C::IDENT.to_string(),
            });
        }
        staging.entries.push(entry);
        Ok(())
    }

    pub fn register(
        &self,
        name: impl Into<String>,
        ctor: impl Fn() -> std::result::Result<Box<C::Instance>, BoxError> + Send + Sync + 'static,
    ) -> Result<()> {
        self.stage(ProvidedEntry::named(name, ctor))
    }

    pub fn register_with(
        &self,
        name: impl Into<String>,
        ctor: impl Fn() -> std::result::Result<Box<C::Instance>, BoxError> + Send + Sync + 'static,
        activation: ActivationSpec,
    ) -> Result<()> {
        self.stage(ProvidedEntry::activated(name, ctor, activation))
    }

    pub fn register_wrapper(&self, spec: WrapperSpec<C>) -> Result<()> {
        self.stage(ProvidedEntry::wrapper(spec))
    }

    pub fn register_adaptive(
        &self,
        ctor: impl Fn(DispatcherParts<C>) -> Result<Box<C::Instance>> + Send + Sync + 'static,
    ) -> Result<()> {
        self.stage(ProvidedEntry::adaptive(ctor))
    }

    pub fn add_provider(&self, provider: Arc<dyn ExtensionProvider<C>>) -> Result<()> {
        let mut staging = relock(&self.staging);
        if staging.sealed {
            return Err(ExtensionError::CatalogSealed {
                capability: C::IDENT.to_string(),
            });
        }
        staging.providers.push(provider);
        Ok(())
    }

    // --- instance access ---

    /// Resolves the named extension with wrappers applied, building and
    /// caching it on first access. The name `"default"` resolves the
    /// capability's configured default extension.
    pub fn get(&self, name: &str) -> Result<Arc<C::Instance>> {
        self.fetch(name, true)
    }

    /// Like [`get`](Self::get) but without wrapper decoration. Cached
    /// separately from the wrapped form.
    pub fn get_unwrapped(&self, name: &str) -> Result<Arc<C::Instance>> {
        self.fetch(name, false)
    }

    fn fetch(&self, name: &str, wrap: bool) -> Result<Arc<C::Instance>> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ExtensionError::NotFound {
                capability: C::IDENT.to_string(),
                name: String::new(),
                diagnostics: " (empty extension name)".to_string(),
            });
        }
        if name == DEFAULT_NAME {
            return match self.catalog().default_name() {
                Some(default) => self.fetch(default, wrap),
                None => Err(ExtensionError::NotFound {
                    capability: C::IDENT.to_string(),
                    name: name.to_string(),
                    diagnostics: " (no default extension configured)".to_string(),
                }),
            };
        }

        let slots = if wrap { &self.slots } else { &self.raw_slots };
        let slot = Arc::clone(
            slots
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Slot::new()))
                .value(),
        );
        if let Some(instance) = slot.cell.get() {
            return Ok(Arc::clone(instance));
        }
        let _build = relock(&slot.build);
        if let Some(instance) = slot.cell.get() {
            return Ok(Arc::clone(instance));
        }
        let instance = self.build(name, wrap)?;
        let _ = slot.cell.set(Arc::clone(&instance));
        Ok(instance)
    }

    fn build(&self, name: &str, wrap: bool) -> Result<Arc<C::Instance>> {
        let catalog = self.catalog();
        let entry = catalog.resolve(name)?;
        let mut instance = caught(|| (entry.ctor)())
            .map_err(|e| ExtensionError::build_failure(C::IDENT, name, e))?;
        self.inject(instance.as_mut());

        if wrap {
            let wrappers = catalog.wrappers();
            let mut order: Vec<usize> = (0..wrappers.len()).collect();
            order.sort_by(|&a, &b| {
                wrapper_cmp((wrappers[a].order, a), (wrappers[b].order, b))
            });
            // apply highest order first so the lowest order wraps outermost
            for &i in order.iter().rev() {
                let wrapper = &wrappers[i];
                if wrapper.accepts(name) {
                    let current = instance;
                    instance = caught(|| (wrapper.wrap)(current))
                        .map_err(|e| ExtensionError::build_failure(C::IDENT, name, e))?;
                    self.inject(instance.as_mut());
                }
            }
        }

        caught(|| instance.initialize())
            .map_err(|e| ExtensionError::build_failure(C::IDENT, name, e))?;
        Ok(Arc::from(instance))
    }

    /// Injection pass: resolve each declared point against the registry's
    /// inject provider. Absence skips the property; an assignment failure is
    /// logged and skipped, never fatal.
    fn inject(&self, instance: &mut C::Instance) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let Some(provider) = registry.injector() else {
            return;
        };
        let points: Vec<InjectPoint> = instance.inject_points().to_vec();
        for point in points {
            if let Some(dep) = provider.resolve(point.type_name, point.name) {
                if let Err(err) = instance.assign(&point, dep) {
                    tracing::warn!(
                        capability = C::IDENT,
                        property = point.name,
                        "Skipping injection: {err}"
                    );
                }
            }
        }
    }

    /// The default extension, or `None` when the capability declares none.
    pub fn get_default(&self) -> Result<Option<Arc<C::Instance>>> {
        match self.catalog().default_name() {
            Some(name) => self.fetch(name, true).map(Some),
            None => Ok(None),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.catalog().contains(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.catalog().names()
    }

    /// Names whose wrapped instance has been built.
    pub fn loaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .slots
            .iter()
            .filter(|entry| entry.value().cell.get().is_some())
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// An already built instance; never triggers a build.
    pub fn get_loaded(&self, name: &str) -> Option<Arc<C::Instance>> {
        self.slots
            .get(name)
            .and_then(|slot| slot.cell.get().map(Arc::clone))
    }

    // --- activation resolver ---

    /// Resolves the ordered activated extensions for a criteria context.
    ///
    /// `requested` is the caller's explicit name list. `-name` removes a name
    /// from the result, `-default` suppresses the auto-activated block
    /// entirely, and the token `default` splices the auto-activated block into
    /// the explicit list: explicit names written before it run first, names
    /// after it run last. Without the token, explicit names follow the
    /// auto-activated block.
    pub fn activated(
        &self,
        cx: &Criteria,
        requested: &[&str],
        group: Option<&str>,
    ) -> Result<Vec<Arc<C::Instance>>> {
        let names: Vec<&str> = requested
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .collect();
        let removed = |name: &str| {
            names
                .iter()
                .any(|n| n.strip_prefix(REMOVE_PREFIX) == Some(name))
        };
        let suppress_auto = removed(DEFAULT_NAME);

        let mut auto: Vec<Arc<C::Instance>> = Vec::new();
        if !suppress_auto {
            let mut candidates: Vec<(&str, &ActivationSpec)> = Vec::new();
            for (name, spec) in self.catalog().activation_entries() {
                if names.iter().any(|n| *n == name.as_str()) || removed(name) {
                    continue;
                }
                if spec.matches_group(group) && spec.is_active(cx) {
                    candidates.push((name.as_str(), spec));
                }
            }
            candidates.sort_by(|a, b| activation_cmp(*a, *b));
            for (name, _) in candidates {
                auto.push(self.get(name)?);
            }
        }

        let mut explicit: Vec<Arc<C::Instance>> = Vec::new();
        for name in &names {
            if name.starts_with(REMOVE_PREFIX) || removed(name) {
                continue;
            }
            if *name == DEFAULT_NAME {
                // names seen so far move to the front of the auto block
                let mut front = std::mem::take(&mut explicit);
                front.append(&mut auto);
                auto = front;
            } else {
                explicit.push(self.get(name)?);
            }
        }
        auto.append(&mut explicit);
        Ok(auto)
    }

    // --- adaptive dispatcher ---

    /// The capability's adaptive dispatcher, built once. Build failures are
    /// sticky: the first error is cached and every later call reports it.
    pub fn adaptive(self: &Arc<Self>) -> Result<Arc<C::Instance>> {
        {
            let state = self
                .adaptive
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match &*state {
                AdaptiveState::Ready(instance) => return Ok(Arc::clone(instance)),
                AdaptiveState::Failed(err) => return Err(err.clone()),
                AdaptiveState::Empty => {}
            }
        }
        let mut state = self
            .adaptive
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match &*state {
            AdaptiveState::Ready(instance) => return Ok(Arc::clone(instance)),
            AdaptiveState::Failed(err) => return Err(err.clone()),
            AdaptiveState::Empty => {}
        }
        match self.build_adaptive() {
            Ok(instance) => {
                *state = AdaptiveState::Ready(Arc::clone(&instance));
                Ok(instance)
            }
            Err(err) => {
                tracing::warn!(capability = C::IDENT, "Adaptive build failed: {err}");
                *state = AdaptiveState::Failed(err.clone());
                Err(err)
            }
        }
    }

    fn build_adaptive(self: &Arc<Self>) -> Result<Arc<C::Instance>> {
        let ctor = match self.catalog().adaptive() {
            Some(ctor) => Arc::clone(ctor),
            None => {
                return Err(ExtensionError::adaptive(
                    C::IDENT,
                    "no adaptive descriptor registered",
                ));
            }
        };
        let parts = adaptive::build_parts(self)?;
        let mut instance = ctor(parts)?;
        self.inject(instance.as_mut());
        instance
            .initialize()
            .map_err(|e| ExtensionError::adaptive(C::IDENT, format!("initialize failed: {e}")))?;
        Ok(Arc::from(instance))
    }
}
