//! Filesystem paths as used by every remote interface.
//!
//! A path is an immutable sequence of components rooted at `/`. The string
//! form is forward-slash delimited; empty components are dropped, and the
//! colon is reserved as a delimiter for application use, so neither `/` nor
//! `:` may appear inside a component.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path {0:?} does not begin with a forward slash")]
    NotAbsolute(String),

    #[error("path {0:?} contains a reserved colon")]
    ReservedColon(String),

    #[error("invalid path component {0:?}")]
    BadComponent(String),
}

/// A canonical hierarchical path. The root is the empty component sequence.
///
/// Paths are totally ordered so that a path precedes every proper descendant
/// and siblings sort by component name. Locking multiple paths in ascending
/// order therefore acquires enclosing directories first, which keeps
/// multi-path lock acquisition deadlock-free.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Path {
    components: Vec<String>,
}

impl Path {
    /// The root directory, `/`.
    pub fn root() -> Self {
        Path { components: Vec::new() }
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// The path with the last component removed, or `None` for the root.
    pub fn parent(&self) -> Option<Path> {
        if self.is_root() {
            return None;
        }
        let mut components = self.components.clone();
        components.pop();
        Some(Path { components })
    }

    /// The last component, or `None` for the root.
    pub fn last(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    /// Appends a single component, validating it.
    pub fn join(&self, component: &str) -> Result<Path, PathError> {
        if component.is_empty() || component.contains('/') {
            return Err(PathError::BadComponent(component.to_string()));
        }
        if component.contains(':') {
            return Err(PathError::ReservedColon(component.to_string()));
        }
        let mut components = self.components.clone();
        components.push(component.to_string());
        Ok(Path { components })
    }

    /// True iff `prefix` is a (not necessarily proper) prefix of this path.
    ///
    /// Every path is a subpath of itself, and every path is a subpath of the
    /// root.
    pub fn is_subpath_of(&self, prefix: &Path) -> bool {
        self.components.len() >= prefix.components.len()
            && self.components[..prefix.components.len()] == prefix.components[..]
    }

    /// Every strict ancestor of this path, from the root down to the parent.
    pub fn ancestors(&self) -> Vec<Path> {
        (0..self.components.len())
            .map(|n| Path { components: self.components[..n].to_vec() })
            .collect()
    }

    /// Resolves this path against a local filesystem root.
    pub fn to_local(&self, root: &std::path::Path) -> PathBuf {
        let mut out = root.to_path_buf();
        for component in &self.components {
            out.push(component);
        }
        out
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.starts_with('/') {
            return Err(PathError::NotAbsolute(s.to_string()));
        }
        if s.contains(':') {
            return Err(PathError::ReservedColon(s.to_string()));
        }
        let components = s
            .split('/')
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Path { components })
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, "/");
        }
        for component in &self.components {
            write!(f, "/{component}")?;
        }
        Ok(())
    }
}
