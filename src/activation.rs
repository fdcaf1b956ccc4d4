//! Activation metadata: group/key matching and the ordering comparators.

use std::cmp::Ordering;

use crate::criteria::Criteria;

/// Auto-activation metadata attached to an extension registration.
///
/// An extension carrying a spec is picked up by
/// [`ExtensionPoint::activated`](crate::ExtensionPoint::activated) when its
/// group matches and it is *active* for the given criteria: an empty key list
/// means always active, otherwise at least one key must match — a plain `key`
/// requires a present, non-empty value, a `key:value` form requires exact
/// equality.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationSpec {
    pub(crate) groups: Vec<String>,
    pub(crate) keys: Vec<String>,
    pub(crate) order: i32,
    pub(crate) before: Vec<String>,
    pub(crate) after: Vec<String>,
}

impl ActivationSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a group this extension activates for.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    /// Adds an activation key, either `"key"` or `"key:value"`.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.keys.push(key.into());
        self
    }

    /// Absolute ordering; smaller values sort to the front.
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Names this extension must be placed before.
    pub fn before(mut self, name: impl Into<String>) -> Self {
        self.before.push(name.into());
        self
    }

    /// Names this extension must be placed after.
    pub fn after(mut self, name: impl Into<String>) -> Self {
        self.after.push(name.into());
        self
    }

    /// Group filter: an absent requested group matches everything; otherwise
    /// the group must be listed.
    pub(crate) fn matches_group(&self, group: Option<&str>) -> bool {
        match group {
            None | Some("") => true,
            Some(g) => self.groups.iter().any(|candidate| candidate == g),
        }
    }

    /// Key filter against the criteria context.
    pub(crate) fn is_active(&self, cx: &Criteria) -> bool {
        if self.keys.is_empty() {
            return true;
        }
        self.keys.iter().any(|key| match key.split_once(':') {
            Some((k, expected)) => cx.get(k) == Some(expected),
            None => cx.get(key).is_some_and(|v| !v.is_empty()),
        })
    }
}

/// Total order over activated entries: relative `before`/`after` constraints
/// first, then absolute `order` ascending, then the extension name as a
/// stable tie-break. Never returns `Equal` for entries with distinct names,
/// so the comparator is safe to use as a set-like sort key.
///
/// Inconsistent relative constraints (cycles) are not detected; they fall
/// back to the absolute order.
pub(crate) fn activation_cmp(
    (a_name, a): (&str, &ActivationSpec),
    (b_name, b): (&str, &ActivationSpec),
) -> Ordering {
    if a.before.iter().any(|n| n == b_name) || b.after.iter().any(|n| n == a_name) {
        return Ordering::Less;
    }
    if a.after.iter().any(|n| n == b_name) || b.before.iter().any(|n| n == a_name) {
        return Ordering::Greater;
    }
    a.order
        .cmp(&b.order)
        .then_with(|| a_name.cmp(b_name))
}

/// Total order over wrappers by declared `order`, falling back to the
/// registration index so equal orders never collide.
pub(crate) fn wrapper_cmp(a: (i32, usize), b: (i32, usize)) -> Ordering {
    a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1))
}
