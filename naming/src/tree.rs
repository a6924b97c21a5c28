//! The naming server's directory tree.
//!
//! The tree is a plain recursive structure: directories own their children
//! by name, files carry replication bookkeeping. Structural operations are
//! synchronous and run under the server's short state mutex; the per-node
//! lock state is shared out as `Arc<NodeLock>` so lock waits happen outside
//! that mutex.

use crate::lock::{LockChain, NodeLock};
use common::{CommandStub, Path, StorageStub};
use std::collections::HashMap;
use std::sync::Arc;

/// One registered storage server, identified by its pair of stubs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRef {
    pub storage: StorageStub,
    pub command: CommandStub,
}

/// Replication bookkeeping for one file.
#[derive(Debug, Clone)]
pub struct FileMeta {
    /// Servers holding a readable copy. Never empty.
    pub replicas: Vec<StorageRef>,
    /// Replication targets whose copy is still in flight; they count toward
    /// the replica bound but are not yet selectable.
    pub pending: Vec<StorageRef>,
    /// Server handed out by the most recent `getStorage`; the survivor of
    /// write invalidation. Starts as the creation/registration replica.
    pub primary: StorageRef,
    /// Monotonic read-request counter.
    pub requests: u64,
    /// `requests` sampled at the last granularity boundary.
    pub coarse: u64,
}

impl FileMeta {
    pub fn new(origin: StorageRef) -> Self {
        FileMeta {
            replicas: vec![origin.clone()],
            pending: Vec::new(),
            primary: origin,
            requests: 0,
            coarse: 0,
        }
    }
}

pub enum NodeKind {
    Directory { children: HashMap<String, Node> },
    File { meta: FileMeta },
}

pub struct Node {
    pub lock: Arc<NodeLock>,
    pub kind: NodeKind,
}

impl Node {
    pub fn directory() -> Node {
        Node {
            lock: Arc::new(NodeLock::new()),
            kind: NodeKind::Directory { children: HashMap::new() },
        }
    }

    pub fn file(meta: FileMeta) -> Node {
        Node { lock: Arc::new(NodeLock::new()), kind: NodeKind::File { meta } }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }
}

/// The directory tree. The root directory exists from construction on.
pub struct Tree {
    root: Node,
}

impl Tree {
    pub fn new() -> Self {
        Tree { root: Node::directory() }
    }

    pub fn resolve(&self, path: &Path) -> Option<&Node> {
        let mut node = &self.root;
        for component in path.components() {
            match &node.kind {
                NodeKind::Directory { children } => node = children.get(component)?,
                NodeKind::File { .. } => return None,
            }
        }
        Some(node)
    }

    fn resolve_mut(&mut self, path: &Path) -> Option<&mut Node> {
        let mut node = &mut self.root;
        for component in path.components() {
            match &mut node.kind {
                NodeKind::Directory { children } => node = children.get_mut(component)?,
                NodeKind::File { .. } => return None,
            }
        }
        Some(node)
    }

    pub fn file_meta(&self, path: &Path) -> Option<&FileMeta> {
        match &self.resolve(path)?.kind {
            NodeKind::File { meta } => Some(meta),
            NodeKind::Directory { .. } => None,
        }
    }

    pub fn file_meta_mut(&mut self, path: &Path) -> Option<&mut FileMeta> {
        match &mut self.resolve_mut(path)?.kind {
            NodeKind::File { meta } => Some(meta),
            NodeKind::Directory { .. } => None,
        }
    }

    /// Child names of an existing directory.
    pub fn list(&self, path: &Path) -> Option<Vec<String>> {
        match &self.resolve(path)?.kind {
            NodeKind::Directory { children } => Some(children.keys().cloned().collect()),
            NodeKind::File { .. } => None,
        }
    }

    /// The lock of every node along `path`, ancestors first, for an existing
    /// path.
    pub fn lock_chain(&self, path: &Path) -> Option<LockChain> {
        let mut ancestors = Vec::new();
        let mut node = &self.root;
        for component in path.components() {
            ancestors.push(node.lock.clone());
            match &node.kind {
                NodeKind::Directory { children } => node = children.get(component)?,
                NodeKind::File { .. } => return None,
            }
        }
        Some(LockChain { ancestors, target: node.lock.clone() })
    }

    /// Inserts a node under an existing parent directory. False if the
    /// parent is missing, is a file, or already has a child of that name.
    pub fn insert(&mut self, path: &Path, node: Node) -> bool {
        let Some(parent_path) = path.parent() else {
            return false;
        };
        let Some(name) = path.last().map(str::to_string) else {
            return false;
        };
        let Some(parent) = self.resolve_mut(&parent_path) else {
            return false;
        };
        match &mut parent.kind {
            NodeKind::Directory { children } => {
                if children.contains_key(&name) {
                    return false;
                }
                children.insert(name, node);
                true
            }
            NodeKind::File { .. } => false,
        }
    }

    /// Inserts a file absorbed from a storage server's inventory, creating
    /// missing ancestor directories on the way down. False if the path (or
    /// an ancestor that turns out to be a file) conflicts.
    pub fn insert_absorbed_file(&mut self, path: &Path, origin: StorageRef) -> bool {
        let Some(name) = path.last().map(str::to_string) else {
            return false;
        };
        let components = path.components();

        let mut node = &mut self.root;
        for component in &components[..components.len() - 1] {
            let NodeKind::Directory { children } = &mut node.kind else {
                return false;
            };
            node = children.entry(component.clone()).or_insert_with(Node::directory);
        }
        let NodeKind::Directory { children } = &mut node.kind else {
            return false;
        };
        if children.contains_key(&name) {
            return false;
        }
        children.insert(name, Node::file(FileMeta::new(origin)));
        true
    }

    /// Detaches a non-root node from its parent.
    pub fn remove(&mut self, path: &Path) -> Option<Node> {
        let name = path.last()?.to_string();
        let parent = self.resolve_mut(&path.parent()?)?;
        match &mut parent.kind {
            NodeKind::Directory { children } => children.remove(&name),
            NodeKind::File { .. } => None,
        }
    }
}

impl Default for Tree {
    fn default() -> Self {
        Tree::new()
    }
}
