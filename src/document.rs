//! Live document abstraction.
//!
//! The tour engine never mutates the document; it only asks whether an
//! element matching a selector currently exists. Hosts implement
//! [`Document`] over whatever element tree they own. [`MemoryDocument`] is a
//! shared in-memory tree used by the CLI and by tests, where elements are
//! mounted and unmounted at arbitrary times.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::selector::Selector;

/// Identifier of a mounted element
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Handle to an element that matched a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHandle {
    pub node: NodeId,
    /// Selector that produced this handle
    pub selector: String,
}

/// Trait abstracting element-existence queries for testability
pub trait Document: Send + Sync {
    /// Return the first element matching `selector`, if one is mounted
    fn query_selector(&self, selector: &str) -> Option<ElementHandle>;
}

/// An element as the in-memory document stores it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            id: None,
            classes: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }
}

#[derive(Default)]
struct Tree {
    // BTreeMap keeps insertion order since ids are monotonic
    nodes: BTreeMap<NodeId, Element>,
}

/// Shared in-memory document. Clones share the same tree.
#[derive(Clone, Default)]
pub struct MemoryDocument {
    tree: Arc<RwLock<Tree>>,
    next_id: Arc<AtomicU64>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount an element immediately
    pub fn insert(&self, element: Element) -> NodeId {
        let id = NodeId(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::trace!(node = id.0, tag = %element.tag, "element mounted");
        self.write().nodes.insert(id, element);
        id
    }

    /// Unmount an element. Returns false if it was not mounted.
    pub fn remove(&self, node: NodeId) -> bool {
        let removed = self.write().nodes.remove(&node).is_some();
        if removed {
            tracing::trace!(node = node.0, "element unmounted");
        }
        removed
    }

    /// Mount `element` after `delay` on a background task
    pub fn mount_after(&self, delay: Duration, element: Element) -> tokio::task::JoinHandle<NodeId> {
        let doc = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            doc.insert(element)
        })
    }

    /// Unmount `node` after `delay` on a background task
    pub fn unmount_after(&self, delay: Duration, node: NodeId) -> tokio::task::JoinHandle<bool> {
        let doc = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            doc.remove(node)
        })
    }

    pub fn len(&self) -> usize {
        self.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tree> {
        // A poisoned tree is still structurally valid
        self.tree.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tree> {
        self.tree.write().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Document for MemoryDocument {
    fn query_selector(&self, selector: &str) -> Option<ElementHandle> {
        let parsed = match Selector::parse(selector) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(error = %e, "query with invalid selector never matches");
                return None;
            }
        };

        self.read()
            .nodes
            .iter()
            .find(|(_, el)| parsed.matches(el))
            .map(|(id, _)| ElementHandle {
                node: *id,
                selector: selector.to_string(),
            })
    }
}
