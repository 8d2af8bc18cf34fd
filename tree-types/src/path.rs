//! Cleartext treesystem paths.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{TreeError, Trunk};

/// Path of a node, starting at its trunk.
///
/// Displayed as `/{trunk}/{component}/...`; the trunk itself is `/{trunk}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreesystemPath {
    /// The trunk the path starts at.
    pub trunk: Trunk,
    /// Names below the trunk, outermost first.
    pub components: Vec<String>,
}

impl TreesystemPath {
    /// Create a path from its components.
    pub fn new(trunk: Trunk, components: Vec<String>) -> Self {
        Self { trunk, components }
    }

    /// The path of a trunk itself.
    pub fn trunk_root(trunk: Trunk) -> Self {
        Self::new(trunk, Vec::new())
    }

    /// Whether this is the path of a trunk.
    pub fn is_trunk_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Last component, if any.
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    /// Path of the parent (`None` for a trunk root).
    pub fn parent(&self) -> Option<Self> {
        if self.components.is_empty() {
            return None;
        }
        let mut components = self.components.clone();
        components.pop();
        Some(Self::new(self.trunk, components))
    }

    /// Path of a child with the given name.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut components = self.components.clone();
        components.push(name.into());
        Self::new(self.trunk, components)
    }
}

impl fmt::Display for TreesystemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.trunk)?;
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl FromStr for TreesystemPath {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/').filter(|p| !p.is_empty());
        let trunk = parts
            .next()
            .ok_or_else(|| TreeError::InvalidData(format!("empty treesystem path: {:?}", s)))?
            .parse()?;
        Ok(Self::new(trunk, parts.map(str::to_string).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse() {
        let path: TreesystemPath = "/home/Documents/Report.pdf".parse().unwrap();
        assert_eq!(path.trunk, Trunk::Home);
        assert_eq!(path.components, vec!["Documents", "Report.pdf"]);
        assert_eq!(path.to_string(), "/home/Documents/Report.pdf");
        assert_eq!(path.name(), Some("Report.pdf"));
    }

    #[test]
    fn parent_and_child() {
        let root = TreesystemPath::trunk_root(Trunk::Prefs);
        assert!(root.is_trunk_root());
        assert!(root.parent().is_none());

        let child = root.child("settings");
        assert_eq!(child.to_string(), "/prefs/settings");
        assert_eq!(child.parent(), Some(root));
    }

    #[test]
    fn parse_rejects_empty_and_unknown_trunk() {
        assert!("".parse::<TreesystemPath>().is_err());
        assert!("/attic/x".parse::<TreesystemPath>().is_err());
    }
}
