//! Mirrored directory tree
//!
//! The tree is a single root [`Directory`] whose children are shared behind
//! `Arc`. Mutations go through `Arc::make_mut`, so only the spine from the
//! root to the touched node is copied and every [`Snapshot`] taken before the
//! mutation keeps seeing the old state.

use crate::path::{escape_into, NodePath, ID_DELIMITER};
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised when a mutation cannot be placed in the tree
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    /// Parent directory of the target is not in the tree
    #[error("parent directory not found for {0}")]
    ParentNotFound(NodePath),

    /// An ancestor of the target is a file
    #[error("ancestor of {0} is not a directory")]
    NotADirectory(NodePath),

    /// The operation is not allowed on the root
    #[error("operation not permitted on the tree root")]
    Root,
}

/// Entry in the mirrored tree
///
/// Serializes untagged: a directory as `{ name, children }`, a file as
/// `{ name, content, updatedAt? }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Directory(Directory),
    File(File),
}

/// Directory node; children are sorted by name and unique
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    pub name: String,
    pub children: Vec<Arc<Node>>,
}

/// File node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub name: String,
    pub content: String,
    /// Modification time in Unix milliseconds, set by change events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
}

impl Node {
    pub fn directory(name: impl Into<String>) -> Self {
        Node::Directory(Directory {
            name: name.into(),
            children: Vec::new(),
        })
    }

    pub fn file(name: impl Into<String>, content: impl Into<String>) -> Self {
        Node::File(File {
            name: name.into(),
            content: content.into(),
            updated_at: None,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Node::Directory(dir) => &dir.name,
            Node::File(file) => &file.name,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Directory(_))
    }

    pub fn as_dir(&self) -> Option<&Directory> {
        match self {
            Node::Directory(dir) => Some(dir),
            Node::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&File> {
        match self {
            Node::File(file) => Some(file),
            Node::Directory(_) => None,
        }
    }

    /// Count (directories, files) below this node, excluding itself
    pub fn count(&self) -> (usize, usize) {
        match self {
            Node::File(_) => (0, 0),
            Node::Directory(dir) => dir.children.iter().fold((0, 0), |(d, f), child| {
                let (cd, cf) = child.count();
                match child.as_ref() {
                    Node::Directory(_) => (d + cd + 1, f + cf),
                    Node::File(_) => (d + cd, f + cf + 1),
                }
            }),
        }
    }
}

impl Directory {
    /// Binary search for a child by name
    fn position(&self, name: &str) -> Result<usize, usize> {
        self.children
            .binary_search_by(|child| child.name().cmp(name))
    }

    /// Look up a direct child
    pub fn child(&self, name: &str) -> Option<&Arc<Node>> {
        self.position(name).ok().map(|idx| &self.children[idx])
    }

    /// Insert or replace the child with the same name
    fn put(&mut self, node: Node) {
        match self.position(node.name()) {
            Ok(idx) => self.children[idx] = Arc::new(node),
            Err(idx) => self.children.insert(idx, Arc::new(node)),
        }
    }

    fn take(&mut self, name: &str) -> Option<Arc<Node>> {
        let idx = self.position(name).ok()?;
        Some(self.children.remove(idx))
    }
}

/// The mirrored tree
#[derive(Debug, Clone)]
pub struct Tree {
    root: Arc<Node>,
}

impl Tree {
    /// Create an empty tree whose root carries `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            root: Arc::new(Node::directory(name)),
        }
    }

    /// Name of the root; fixed for the lifetime of the tree
    pub fn name(&self) -> &str {
        self.root.name()
    }

    pub fn root(&self) -> &Arc<Node> {
        &self.root
    }

    /// Resolve a node by path
    pub fn get(&self, path: &NodePath) -> Option<&Node> {
        let mut node = self.root.as_ref();
        for name in path.components() {
            node = node.as_dir()?.child(name)?.as_ref();
        }
        Some(node)
    }

    pub fn contains(&self, path: &NodePath) -> bool {
        self.get(path).is_some()
    }

    /// Children of the directory at `dir`
    pub fn children_of(&self, dir: &NodePath) -> Result<&[Arc<Node>], TreeError> {
        self.resolve_dir(dir).map(|d| d.children.as_slice())
    }

    /// External id of the node at `path`: root name then components
    pub fn node_id(&self, path: &NodePath) -> String {
        let mut id = String::new();
        escape_into(self.name(), &mut id);
        if !path.is_root() {
            id.push(ID_DELIMITER);
            id.push_str(&path.to_id());
        }
        id
    }

    /// Insert an empty directory at `path`
    ///
    /// Returns `Ok(false)` when a directory of that name already exists; its
    /// contents are left untouched. A file of the same name is replaced.
    pub fn insert_dir(&mut self, path: &NodePath) -> Result<bool, TreeError> {
        let (parent, name) = split(path)?;
        let existing = self.resolve_dir(&parent)?.child(name);
        if existing.map_or(false, |node| node.is_dir()) {
            return Ok(false);
        }

        self.dir_mut(&parent)?.put(Node::directory(name));
        Ok(true)
    }

    /// Insert a file at `path`, replacing any node of the same name
    ///
    /// Returns `Ok(false)` if an identical file is already present.
    pub fn upsert_file(
        &mut self,
        path: &NodePath,
        content: String,
        updated_at: Option<u64>,
    ) -> Result<bool, TreeError> {
        let (parent, name) = split(path)?;
        let node = Node::File(File {
            name: name.to_string(),
            content,
            updated_at,
        });
        if self.resolve_dir(&parent)?.child(name).map(|n| n.as_ref()) == Some(&node) {
            return Ok(false);
        }

        self.dir_mut(&parent)?.put(node);
        Ok(true)
    }

    /// Replace the content of an existing file
    ///
    /// Returns `Ok(None)` if no file exists at `path`, `Ok(Some(changed))`
    /// otherwise.
    pub fn update_file(
        &mut self,
        path: &NodePath,
        content: String,
        updated_at: Option<u64>,
    ) -> Result<Option<bool>, TreeError> {
        match self.get(path) {
            Some(Node::File(file)) => {
                if file.content == content && file.updated_at == updated_at {
                    return Ok(Some(false));
                }
            }
            _ => return Ok(None),
        }

        let (parent, name) = split(path)?;
        self.dir_mut(&parent)?.put(Node::File(File {
            name: name.to_string(),
            content,
            updated_at,
        }));
        Ok(Some(true))
    }

    /// Remove the node at `path` (with its subtree)
    ///
    /// Removing something that is not there is a no-op and returns `None`.
    pub fn remove(&mut self, path: &NodePath) -> Option<Arc<Node>> {
        let (parent, name) = split(path).ok()?;
        self.resolve_dir(&parent).ok()?.child(name)?;
        self.dir_mut(&parent).ok()?.take(name)
    }

    /// Freeze the current state under sequence number `seq`
    pub fn snapshot(&self, seq: u64) -> Snapshot {
        Snapshot::new(seq, Arc::clone(&self.root))
    }

    fn resolve_dir(&self, path: &NodePath) -> Result<&Directory, TreeError> {
        match self.get(path) {
            Some(Node::Directory(dir)) => Ok(dir),
            Some(Node::File(_)) => Err(TreeError::NotADirectory(path.clone())),
            None => Err(TreeError::ParentNotFound(path.clone())),
        }
    }

    /// Mutable access to a directory, copying shared nodes on the way down
    fn dir_mut(&mut self, path: &NodePath) -> Result<&mut Directory, TreeError> {
        dir_mut(&mut self.root, path.components())
            .ok_or_else(|| TreeError::ParentNotFound(path.clone()))
    }
}

fn split(path: &NodePath) -> Result<(NodePath, &str), TreeError> {
    match (path.parent(), path.name()) {
        (Some(parent), Some(name)) => Ok((parent, name)),
        _ => Err(TreeError::Root),
    }
}

fn dir_mut<'a>(node: &'a mut Arc<Node>, components: &[String]) -> Option<&'a mut Directory> {
    let Node::Directory(dir) = Arc::make_mut(node) else {
        return None;
    };
    match components.split_first() {
        None => Some(dir),
        Some((head, rest)) => {
            let idx = dir.position(head).ok()?;
            dir_mut(&mut dir.children[idx], rest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(names: &[&str]) -> NodePath {
        NodePath::from_names(names.iter().copied())
    }

    fn names(tree: &Tree, dir: &[&str]) -> Vec<String> {
        tree.children_of(&path(dir))
            .unwrap()
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    #[test]
    fn test_insert_requires_parent() {
        let mut tree = Tree::new("proj");
        assert_eq!(
            tree.insert_dir(&path(&["a", "b"])),
            Err(TreeError::ParentNotFound(path(&["a"])))
        );
        assert!(tree.insert_dir(&path(&["a"])).unwrap());
        assert!(tree.insert_dir(&path(&["a", "b"])).unwrap());
        assert!(tree.get(&path(&["a", "b"])).unwrap().is_dir());
    }

    #[test]
    fn test_insert_below_file_fails() {
        let mut tree = Tree::new("proj");
        tree.upsert_file(&path(&["f"]), "x".into(), None).unwrap();
        assert_eq!(
            tree.insert_dir(&path(&["f", "sub"])),
            Err(TreeError::NotADirectory(path(&["f"])))
        );
    }

    #[test]
    fn test_siblings_stay_unique_and_sorted() {
        let mut tree = Tree::new("proj");
        tree.upsert_file(&path(&["b.txt"]), "1".into(), None).unwrap();
        tree.upsert_file(&path(&["a.txt"]), "1".into(), None).unwrap();
        tree.upsert_file(&path(&["b.txt"]), "2".into(), None).unwrap();
        assert!(tree.insert_dir(&path(&["c"])).unwrap());
        assert!(!tree.insert_dir(&path(&["c"])).unwrap());

        assert_eq!(names(&tree, &[]), vec!["a.txt", "b.txt", "c"]);
        let b = tree.get(&path(&["b.txt"])).unwrap().as_file().unwrap();
        assert_eq!(b.content, "2");
    }

    #[test]
    fn test_existing_directory_keeps_children() {
        let mut tree = Tree::new("proj");
        tree.insert_dir(&path(&["src"])).unwrap();
        tree.upsert_file(&path(&["src", "main.rs"]), "fn main() {}".into(), None)
            .unwrap();
        assert!(!tree.insert_dir(&path(&["src"])).unwrap());
        assert_eq!(names(&tree, &["src"]), vec!["main.rs"]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut tree = Tree::new("proj");
        tree.insert_dir(&path(&["src"])).unwrap();
        tree.upsert_file(&path(&["src", "lib.rs"]), String::new(), None)
            .unwrap();

        assert!(tree.remove(&path(&["src"])).is_some());
        let before = tree.snapshot(1);
        assert!(tree.remove(&path(&["src"])).is_none());
        assert!(tree.remove(&path(&["src", "lib.rs"])).is_none());
        assert!(tree.remove(&NodePath::root()).is_none());
        assert_eq!(tree.snapshot(2).root(), before.root());
    }

    #[test]
    fn test_update_file() {
        let mut tree = Tree::new("proj");
        assert_eq!(tree.update_file(&path(&["a"]), "x".into(), Some(1)), Ok(None));

        tree.upsert_file(&path(&["a"]), "x".into(), None).unwrap();
        assert_eq!(tree.update_file(&path(&["a"]), "y".into(), Some(5)), Ok(Some(true)));
        assert_eq!(tree.update_file(&path(&["a"]), "y".into(), Some(5)), Ok(Some(false)));

        let file = tree.get(&path(&["a"])).unwrap().as_file().unwrap();
        assert_eq!(file.content, "y");
        assert_eq!(file.updated_at, Some(5));

        tree.insert_dir(&path(&["d"])).unwrap();
        assert_eq!(tree.update_file(&path(&["d"]), "z".into(), None), Ok(None));
    }

    #[test]
    fn test_snapshots_are_frozen() {
        let mut tree = Tree::new("proj");
        tree.upsert_file(&path(&["a"]), "old".into(), None).unwrap();
        let snapshot = tree.snapshot(1);

        tree.update_file(&path(&["a"]), "new".into(), None).unwrap();
        tree.insert_dir(&path(&["d"])).unwrap();

        let frozen = snapshot.root().as_dir().unwrap();
        assert_eq!(frozen.children.len(), 1);
        assert_eq!(frozen.children[0].as_file().unwrap().content, "old");
    }

    #[test]
    fn test_node_ids() {
        let tree = Tree::new("proj");
        assert_eq!(tree.node_id(&NodePath::root()), "proj");
        assert_eq!(tree.node_id(&path(&["src", "a:b.rs"])), "proj:src:a%3Ab.rs");
    }

    #[test]
    fn test_count() {
        let mut tree = Tree::new("proj");
        tree.insert_dir(&path(&["a"])).unwrap();
        tree.insert_dir(&path(&["a", "b"])).unwrap();
        tree.upsert_file(&path(&["a", "b", "c"]), String::new(), None).unwrap();
        tree.upsert_file(&path(&["d"]), String::new(), None).unwrap();
        assert_eq!(tree.root().count(), (2, 2));
    }

    #[test]
    fn test_wire_shape() {
        let mut tree = Tree::new("proj");
        tree.upsert_file(&path(&["a.txt"]), "hi".into(), None).unwrap();
        tree.insert_dir(&path(&["d"])).unwrap();
        tree.upsert_file(&path(&["d", "e"]), "x".into(), Some(42)).unwrap();

        let json = serde_json::to_value(tree.root()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "proj",
                "children": [
                    { "name": "a.txt", "content": "hi" },
                    { "name": "d", "children": [
                        { "name": "e", "content": "x", "updatedAt": 42 }
                    ]}
                ]
            })
        );

        let back: Node = serde_json::from_value(json).unwrap();
        assert_eq!(&back, tree.root().as_ref());
    }
}
