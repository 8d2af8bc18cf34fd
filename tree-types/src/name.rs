//! Sibling-name comparison.
//!
//! Names are unique among siblings under a case-insensitive comparison that
//! also folds Unicode compatibility forms (so "ﬁle" and "FILE" collide, and
//! precomposed/decomposed accents compare equal).

use serde::{Deserialize, Serialize};
use std::fmt;
use unicode_normalization::UnicodeNormalization;

/// A node name in the canonical form used for comparison and indexing.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedName(String);

impl NormalizedName {
    /// Normalize a cleartext name (NFKC, then lowercase).
    pub fn new(name: &str) -> Self {
        let composed: String = name.nfkc().collect();
        Self(composed.to_lowercase())
    }

    /// Borrow the normalized form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for NormalizedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NormalizedName({:?})", self.0)
    }
}

/// Split a name into `(base, extension)`.
///
/// The extension is everything after the last `.`, unless the dot is the
/// first or last character (".profile" and "notes." have no extension).
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}
