// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use crate::error::{Error, Result};

/// A normalized `/`-delimited node path. The root has no components.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct NodePath(Vec<String>);

impl NodePath {
    pub fn parse(path: &str) -> Result<Self> {
        let mut parts = Vec::new();
        for part in path.split('/').filter(|part| !part.is_empty()) {
            if part == "." || part == ".." {
                return Err(Error::InvalidPath(path.to_string()));
            }
            parts.push(part.to_string());
        }
        Ok(NodePath(parts))
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, key: &str) -> Result<NodePath> {
        if key.is_empty() || key.contains('/') || key == "." || key == ".." {
            return Err(Error::InvalidPath(format!("{self}/{key}")));
        }
        let mut parts = self.0.clone();
        parts.push(key.to_string());
        Ok(NodePath(parts))
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        let path = NodePath::parse("a//b/").unwrap();
        assert_eq!(path.parts(), &["a".to_string(), "b".to_string()]);
        assert_eq!(path.to_string(), "/a/b");
        assert!(NodePath::parse("/").unwrap().is_root());
        assert!(NodePath::parse("/a/../b").is_err());
    }

    #[test]
    fn test_child_rejects_separators() {
        let root = NodePath::parse("/").unwrap();
        assert_eq!(root.child("x").unwrap().to_string(), "/x");
        assert!(root.child("x/y").is_err());
        assert!(root.child("").is_err());
    }
}
