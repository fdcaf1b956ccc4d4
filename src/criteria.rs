//! Criteria context: the key/value lookup carried through capability calls.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An insertion-ordered string key/value lookup object.
///
/// A `Criteria` is passed through capability calls and serves two purposes:
/// it is the input to activation matching (group and key criteria) and the
/// source adaptive dispatch extracts its selector string from. It is cheap to
/// clone and never required to be present; operations that must extract a
/// selector fail fast when handed `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criteria {
    params: Vec<(String, String)>,
}

impl Criteria {
    /// Creates an empty criteria context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert; replaces the value if the key already exists.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Inserts or replaces a parameter, preserving first-insertion order.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.params.push((key, value)),
        }
    }

    /// Returns the value for `key` if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the value for `key`, or `default` when absent.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Iterates keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl FromIterator<(String, String)> for Criteria {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut cx = Criteria::new();
        for (k, v) in iter {
            cx.set(k, v);
        }
        cx
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Criteria {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut cx = Criteria::new();
        for (k, v) in iter {
            cx.set(k, v);
        }
        cx
    }
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Criteria[")?;
        for (i, (k, v)) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        write!(f, "]")
    }
}
