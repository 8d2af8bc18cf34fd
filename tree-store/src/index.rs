//! Composite secondary-index keys.

use serde::{Deserialize, Serialize};
use std::fmt;

const SEPARATOR: char = '\u{1f}';

/// An ordered, composite index key.
///
/// Each component is terminated by a unit separator, so a key built from the
/// first `n` components of another key is a string prefix of it and range
/// scans never match across component boundaries ("ab" is not a prefix
/// match for "abc").
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexKey(String);

impl IndexKey {
    /// An empty key (matches everything as a prefix).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a component.
    pub fn push(mut self, component: impl AsRef<str>) -> Self {
        for c in component.as_ref().chars() {
            match c {
                '%' => self.0.push_str("%25"),
                SEPARATOR => self.0.push_str("%1F"),
                other => self.0.push(other),
            }
        }
        self.0.push(SEPARATOR);
        self
    }

    /// Build a key from components.
    pub fn of<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        components.into_iter().fold(Self::new(), Self::push)
    }

    /// Whether `prefix` is a component-wise prefix of this key.
    pub fn starts_with(&self, prefix: &IndexKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Decoded components.
    pub fn components(&self) -> Vec<String> {
        self.0
            .split_terminator(SEPARATOR)
            .map(|c| c.replace("%1F", "\u{1f}").replace("%25", "%"))
            .collect()
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn from_encoded(encoded: &str) -> Self {
        Self(encoded.to_string())
    }
}

impl fmt::Debug for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IndexKey({})", self.components().join("/"))
    }
}

/// One secondary-index entry of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Index name.
    pub index: String,
    /// Key under which the record is reachable.
    pub key: IndexKey,
}

impl IndexEntry {
    /// Create an index entry.
    pub fn new(index: impl Into<String>, key: IndexKey) -> Self {
        Self {
            index: index.into(),
            key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_respects_component_boundaries() {
        let key = IndexKey::of(["alice", "tree", "abc"]);
        assert!(key.starts_with(&IndexKey::of(["alice", "tree"])));
        assert!(!key.starts_with(&IndexKey::of(["alice", "tree", "ab"])));
        assert!(key.starts_with(&IndexKey::new()));
    }

    #[test]
    fn components_survive_separator_and_escape_chars() {
        let key = IndexKey::of(["a\u{1f}b", "50%"]);
        assert_eq!(key.components(), vec!["a\u{1f}b", "50%"]);
        assert!(!key.starts_with(&IndexKey::of(["a"])));
    }

    #[test]
    fn ordering_follows_components() {
        let a = IndexKey::of(["u", "t", "a"]);
        let b = IndexKey::of(["u", "t", "b"]);
        assert!(a < b);
    }
}
