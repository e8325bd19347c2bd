//! Node addressing
//!
//! A [`NodePath`] is the list of names leading from the tree root (exclusive)
//! to a node. It is independent of the OS path separator so the same value can
//! be rendered as an external id (see [`ID_DELIMITER`]).

use smallvec::SmallVec;
use std::fmt;
use std::path::{Component, Path};
use thiserror::Error;

/// Separator between components of an external node id
pub const ID_DELIMITER: char = ':';

/// Errors produced while turning filesystem paths into node paths
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    /// Path escapes the watched root or is absolute
    #[error("path is not relative to the watched root: {0}")]
    NotRelative(String),

    /// Path contains a `..` component
    #[error("path contains a parent component: {0}")]
    ParentComponent(String),
}

/// Path of a node, relative to the tree root
///
/// Uses SmallVec so typical shallow paths stay inline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodePath(SmallVec<[String; 4]>);

impl NodePath {
    /// The root itself
    pub fn root() -> Self {
        Self(SmallVec::new())
    }

    /// Build from a path relative to the watched root
    ///
    /// `.` components are skipped; absolute paths and `..` are rejected.
    pub fn from_relative(path: &Path) -> Result<Self, PathError> {
        let mut components = SmallVec::new();
        for component in path.components() {
            match component {
                Component::Normal(name) => components.push(name.to_string_lossy().into_owned()),
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(PathError::ParentComponent(path.display().to_string()))
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(PathError::NotRelative(path.display().to_string()))
                }
            }
        }
        Ok(Self(components))
    }

    /// Build from a path under `root`
    pub fn under(root: &Path, path: &Path) -> Result<Self, PathError> {
        let relative = path
            .strip_prefix(root)
            .map_err(|_| PathError::NotRelative(path.display().to_string()))?;
        Self::from_relative(relative)
    }

    /// Build from already split names
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    /// Parse a rendered id (without the root name) back into a path
    pub fn from_id(id: &str) -> Self {
        if id.is_empty() {
            return Self::root();
        }
        Self(id.split(ID_DELIMITER).map(unescape).collect())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Names from the root down
    pub fn components(&self) -> &[String] {
        &self.0
    }

    /// Last component, `None` for the root
    pub fn name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Parent path, `None` for the root
    pub fn parent(&self) -> Option<NodePath> {
        let (_, init) = self.0.split_last()?;
        Some(Self(init.iter().cloned().collect()))
    }

    /// Child path with `name` appended
    pub fn join(&self, name: impl Into<String>) -> NodePath {
        let mut components = self.0.clone();
        components.push(name.into());
        Self(components)
    }

    /// True if `self` equals `ancestor` or lies below it
    pub fn starts_with(&self, ancestor: &NodePath) -> bool {
        self.0.len() >= ancestor.0.len() && self.0[..ancestor.0.len()] == ancestor.0[..]
    }

    /// Render as an id fragment (components escaped and joined)
    pub fn to_id(&self) -> String {
        let mut id = String::new();
        for (i, component) in self.0.iter().enumerate() {
            if i > 0 {
                id.push(ID_DELIMITER);
            }
            escape_into(component, &mut id);
        }
        id
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_id())
    }
}

/// Escape one name so it can never contain the delimiter
pub(crate) fn escape_into(name: &str, out: &mut String) {
    for c in name.chars() {
        match c {
            '%' => out.push_str("%25"),
            ID_DELIMITER => out.push_str("%3A"),
            c => out.push(c),
        }
    }
}

fn unescape(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    let mut rest = part;
    while let Some(i) = rest.find('%') {
        out.push_str(&rest[..i]);
        let tail = &rest[i..];
        if tail.starts_with("%25") {
            out.push('%');
            rest = &tail[3..];
        } else if tail.starts_with("%3A") || tail.starts_with("%3a") {
            out.push(ID_DELIMITER);
            rest = &tail[3..];
        } else {
            out.push('%');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_from_relative() {
        let path = NodePath::from_relative(Path::new("src/./lib/mod.rs")).unwrap();
        assert_eq!(path.components(), &["src", "lib", "mod.rs"]);
        assert_eq!(path.name(), Some("mod.rs"));
        assert_eq!(path.parent().unwrap().components(), &["src", "lib"]);
    }

    #[test]
    fn test_rejects_escaping_paths() {
        assert!(matches!(
            NodePath::from_relative(Path::new("../etc")),
            Err(PathError::ParentComponent(_))
        ));
        assert!(matches!(
            NodePath::from_relative(Path::new("/etc/passwd")),
            Err(PathError::NotRelative(_))
        ));
    }

    #[test]
    fn test_under_root() {
        let root = PathBuf::from("/proj");
        assert!(NodePath::under(&root, &root).unwrap().is_root());
        let path = NodePath::under(&root, Path::new("/proj/a/b.txt")).unwrap();
        assert_eq!(path.to_id(), "a:b.txt");
        assert!(NodePath::under(&root, Path::new("/other/x")).is_err());
    }

    #[test]
    fn test_id_escaping_is_reversible() {
        let path = NodePath::from_names(["odd:name", "100%", "plain"]);
        let id = path.to_id();
        assert_eq!(id, "odd%3Aname:100%25:plain");
        assert_eq!(NodePath::from_id(&id), path);
        assert!(NodePath::from_id("").is_root());
    }

    #[test]
    fn test_starts_with() {
        let dir = NodePath::from_names(["a", "b"]);
        assert!(NodePath::from_names(["a", "b", "c"]).starts_with(&dir));
        assert!(dir.starts_with(&dir));
        assert!(dir.starts_with(&NodePath::root()));
        assert!(!NodePath::from_names(["a", "bc"]).starts_with(&dir));
    }
}
