//! Per-capability descriptor catalog: the load-once name → implementation map.

use std::collections::HashMap;
use std::sync::Arc;

use crate::activation::ActivationSpec;
use crate::capability::Capability;
use crate::error::{ExtensionError, Result};
use crate::provider::{AdaptiveCtor, ExtensionCtor, ExtensionProvider, ProvidedEntry, WrapperSpec};

/// A named implementation registration resolved from the catalog.
///
/// Activation metadata is not carried here; it lives in the catalog's
/// insertion-ordered activation list.
pub struct ExtensionEntry<C: Capability> {
    pub(crate) name: String,
    pub(crate) ctor: ExtensionCtor<C>,
    origin: String,
}

impl<C: Capability> ExtensionEntry<C> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Immutable per-capability registry of names, activation metadata, wrappers
/// and the adaptive descriptor.
///
/// Built exactly once, behind the extension point's load lock, by scanning
/// the attached providers in priority order. Load problems never abort the
/// scan: they are recorded as diagnostics keyed by the offending name and
/// surfaced later through [`resolve`](Self::resolve).
pub struct Catalog<C: Capability> {
    capability: &'static str,
    default_name: Option<&'static str>,
    entries: HashMap<String, ExtensionEntry<C>>,
    activations: Vec<(String, ActivationSpec)>,
    wrappers: Vec<WrapperSpec<C>>,
    adaptive: Option<AdaptiveCtor<C>>,
    /// Names poisoned by a duplicate registration: (first origin, second origin).
    rejected: HashMap<String, (String, String)>,
    /// Load-time problems, keyed by name or source line.
    diagnostics: Vec<(String, String)>,
}

impl<C: Capability> Catalog<C> {
    pub(crate) fn load(providers: &[Arc<dyn ExtensionProvider<C>>]) -> Self {
        let mut catalog = Self {
            capability: C::IDENT,
            default_name: C::default_name(),
            entries: HashMap::new(),
            activations: Vec::new(),
            wrappers: Vec::new(),
            adaptive: None,
            rejected: HashMap::new(),
            diagnostics: Vec::new(),
        };

        let mut ordered: Vec<&Arc<dyn ExtensionProvider<C>>> = providers.iter().collect();
        ordered.sort_by_key(|p| p.priority());

        for provider in ordered {
            let origin = provider.name();
            let overriding = provider.overriding();
            for entry in provider.entries() {
                match entry {
                    ProvidedEntry::Named {
                        name,
                        ctor,
                        activation,
                    } => catalog.accept(name, ctor, activation, &origin, overriding),
                    ProvidedEntry::Wrapper(spec) => catalog.wrappers.push(spec),
                    ProvidedEntry::Adaptive(ctor) => {
                        if catalog.adaptive.is_none() || overriding {
                            catalog.adaptive = Some(ctor);
                        } else {
                            catalog.diagnostics.push((
                                "adaptive".to_string(),
                                format!("more than one adaptive descriptor, second from {origin}"),
                            ));
                        }
                    }
                    ProvidedEntry::Invalid { name, message } => {
                        tracing::warn!(
                            capability = catalog.capability,
                            entry = %name,
                            "Discovery problem: {message}"
                        );
                        catalog.diagnostics.push((name, message));
                    }
                }
            }
        }

        catalog
    }

    fn accept(
        &mut self,
        name: String,
        ctor: ExtensionCtor<C>,
        activation: Option<ActivationSpec>,
        origin: &str,
        overriding: bool,
    ) {
        if name.trim().is_empty() {
            self.diagnostics.push((
                name,
                format!("empty extension name from {origin}"),
            ));
            return;
        }
        if self.rejected.contains_key(&name) {
            // the name is already poisoned; further registrations stay out
            return;
        }
        match self.entries.get(&name) {
            Some(existing) if !overriding => {
                let first = existing.origin.clone();
                tracing::warn!(
                    capability = self.capability,
                    name = %name,
                    first = %first,
                    second = %origin,
                    "Duplicate extension registration"
                );
                self.diagnostics.push((
                    name.clone(),
                    format!("duplicate registration by {first} and {origin}"),
                ));
                self.entries.remove(&name);
                self.activations.retain(|(n, _)| *n != name);
                self.rejected.insert(name, (first, origin.to_string()));
            }
            Some(_) => {
                self.activations.retain(|(n, _)| *n != name);
                if let Some(spec) = activation {
                    self.activations.push((name.clone(), spec));
                }
                self.entries.insert(
                    name.clone(),
                    ExtensionEntry {
                        name,
                        ctor,
                        origin: origin.to_string(),
                    },
                );
            }
            None => {
                if let Some(spec) = activation {
                    self.activations.push((name.clone(), spec));
                }
                self.entries.insert(
                    name.clone(),
                    ExtensionEntry {
                        name,
                        ctor,
                        origin: origin.to_string(),
                    },
                );
            }
        }
    }

    /// Resolves a named registration, raising the sticky duplicate error for
    /// poisoned names and a diagnostic-carrying `NotFound` otherwise.
    pub fn resolve(&self, name: &str) -> Result<&ExtensionEntry<C>> {
        if let Some((first, second)) = self.rejected.get(name) {
            return Err(ExtensionError::DuplicateRegistration {
                capability: self.capability.to_string(),
                name: name.to_string(),
                first: first.clone(),
                second: second.clone(),
            });
        }
        self.entries.get(name).ok_or_else(|| self.not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Activation metadata in first-registration order.
    pub fn activation_entries(&self) -> &[(String, ActivationSpec)] {
        &self.activations
    }

    pub fn wrappers(&self) -> &[WrapperSpec<C>] {
        &self.wrappers
    }

    pub(crate) fn adaptive(&self) -> Option<&AdaptiveCtor<C>> {
        self.adaptive.as_ref()
    }

    pub fn default_name(&self) -> Option<&'static str> {
        self.default_name
    }

    fn not_found(&self, name: &str) -> ExtensionError {
        let needle = name.to_lowercase();
        let mut related = String::new();
        let mut count = 0usize;
        for (key, message) in &self.diagnostics {
            if key.to_lowercase().starts_with(&needle) {
                count += 1;
                if count == 1 {
                    related.push_str(", possible causes: ");
                }
                related.push_str(&format!("({count}) {key}: {message} "));
            }
        }
        ExtensionError::NotFound {
            capability: self.capability.to_string(),
            name: name.to_string(),
            diagnostics: related.trim_end().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ExtensionInstance;

    trait Widget: ExtensionInstance {
        fn tag(&self) -> &'static str;
    }

    struct Fixed(&'static str);
    impl ExtensionInstance for Fixed {}
    impl Widget for Fixed {
        fn tag(&self) -> &'static str {
            self.0
        }
    }

    struct WidgetCapability;
    impl Capability for WidgetCapability {
        type Instance = dyn Widget;
        const IDENT: &'static str = "widget";
    }

    struct ListProvider {
        label: &'static str,
        overriding: bool,
        priority: i32,
        entries: fn() -> Vec<ProvidedEntry<WidgetCapability>>,
    }

    impl ExtensionProvider<WidgetCapability> for ListProvider {
        fn name(&self) -> String {
            self.label.to_string()
        }
        fn entries(&self) -> Vec<ProvidedEntry<WidgetCapability>> {
            (self.entries)()
        }
        fn overriding(&self) -> bool {
            self.overriding
        }
        fn priority(&self) -> i32 {
            self.priority
        }
    }

    fn provider(
        label: &'static str,
        overriding: bool,
        priority: i32,
        entries: fn() -> Vec<ProvidedEntry<WidgetCapability>>,
    ) -> Arc<dyn ExtensionProvider<WidgetCapability>> {
        Arc::new(ListProvider {
            label,
            overriding,
            priority,
            entries,
        })
    }

    #[test]
    fn test_load_and_resolve() {
        let catalog = Catalog::load(&[provider("builtin", false, 0, || {
            vec![ProvidedEntry::named("a", || Ok(Box::new(Fixed("a")) as Box<dyn Widget>))]
        })]);
        assert!(catalog.contains("a"));
        assert_eq!(catalog.resolve("a").unwrap().name(), "a");
        assert_eq!(catalog.names(), vec!["a".to_string()]);
    }

    #[test]
    fn test_duplicate_without_override_is_sticky() {
        let catalog = Catalog::load(&[
            provider("first", false, 0, || {
                vec![ProvidedEntry::named("dup", || Ok(Box::new(Fixed("1")) as Box<dyn Widget>))]
            }),
            provider("second", false, 1, || {
                vec![ProvidedEntry::named("dup", || Ok(Box::new(Fixed("2")) as Box<dyn Widget>))]
            }),
        ]);
        for _ in 0..2 {
            let err = catalog.resolve("dup").err().unwrap();
            match &err {
                ExtensionError::DuplicateRegistration { first, second, .. } => {
                    assert_eq!(first, "first");
                    assert_eq!(second, "second");
                }
                other => panic!("expected duplicate error, got {other}"),
            }
        }
        assert!(!catalog.contains("dup"));
    }

    #[test]
    fn test_overriding_source_replaces() {
        let catalog = Catalog::load(&[
            provider("base", false, 0, || {
                vec![ProvidedEntry::named("w", || Ok(Box::new(Fixed("base")) as Box<dyn Widget>))]
            }),
            provider("override", true, 1, || {
                vec![ProvidedEntry::named("w", || Ok(Box::new(Fixed("override")) as Box<dyn Widget>))]
            }),
        ]);
        let entry = catalog.resolve("w").unwrap();
        let instance = (entry.ctor)().unwrap();
        assert_eq!(instance.tag(), "override");
    }

    #[test]
    fn test_priority_orders_scan() {
        // the low-priority source scans first, so the high-priority
        // overriding source wins even when attached first
        let catalog = Catalog::load(&[
            provider("late", true, 10, || {
                vec![ProvidedEntry::named("w", || Ok(Box::new(Fixed("late")) as Box<dyn Widget>))]
            }),
            provider("early", false, 0, || {
                vec![ProvidedEntry::named("w", || Ok(Box::new(Fixed("early")) as Box<dyn Widget>))]
            }),
        ]);
        let entry = catalog.resolve("w").unwrap();
        assert_eq!((entry.ctor)().unwrap().tag(), "late");
    }

    #[test]
    fn test_not_found_carries_prefix_diagnostics() {
        let catalog = Catalog::load(&[provider("files", false, 0, || {
            vec![ProvidedEntry::invalid(
                "jsonx",
                "unknown implementation key 'jsonx'",
            )]
        })]);
        let err = catalog.resolve("json").err().unwrap();
        let msg = err.to_string();
        assert!(msg.contains("possible causes"));
        assert!(msg.contains("jsonx"));

        // unrelated names get a bare NotFound
        let err = catalog.resolve("yaml").err().unwrap();
        assert!(!err.to_string().contains("possible causes"));
    }

    #[test]
    fn test_second_adaptive_is_diagnosed_first_wins() {
        let catalog = Catalog::load(&[provider("builtin", false, 0, || {
            vec![
                ProvidedEntry::adaptive(|_parts| Ok(Box::new(Fixed("adaptive-1")) as Box<dyn Widget>)),
                ProvidedEntry::adaptive(|_parts| Ok(Box::new(Fixed("adaptive-2")) as Box<dyn Widget>)),
            ]
        })]);
        assert!(catalog.adaptive().is_some());
        assert!(
            catalog
                .diagnostics
                .iter()
                .any(|(k, m)| k == "adaptive" && m.contains("more than one"))
        );
    }

    #[test]
    fn test_empty_name_is_diagnosed() {
        let catalog = Catalog::load(&[provider("builtin", false, 0, || {
            vec![ProvidedEntry::named("", || Ok(Box::new(Fixed("x")) as Box<dyn Widget>))]
        })]);
        assert!(catalog.names().is_empty());
        assert!(!catalog.diagnostics.is_empty());
    }

    #[test]
    fn test_activation_entries_follow_registration_order() {
        let catalog = Catalog::load(&[provider("builtin", false, 0, || {
            vec![
                ProvidedEntry::activated(
                    "b",
                    || Ok(Box::new(Fixed("b")) as Box<dyn Widget>),
                    ActivationSpec::new().order(5),
                ),
                ProvidedEntry::activated(
                    "a",
                    || Ok(Box::new(Fixed("a")) as Box<dyn Widget>),
                    ActivationSpec::new().order(1),
                ),
            ]
        })]);
        let names: Vec<&str> = catalog
            .activation_entries()
            .iter()
            .map(|(n, _)| n.as_str())
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
