//! Host Backend
//!
//! The reconciler never touches a concrete tree. It drives a [`Host`], which
//! owns the materialized nodes and hands out opaque [`HostNode`] handles.

use std::fmt;

use crate::reactive::Value;

/// Opaque handle to a node materialized by a [`Host`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostNode(u64);

impl HostNode {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw handle value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HostNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// The tree-mutation capabilities the reconciler needs.
pub trait Host {
    /// Create a detached element node.
    fn create_element(&self, tag: &str) -> HostNode;

    /// Create a detached text node.
    fn create_text(&self, text: &str) -> HostNode;

    /// Create a detached comment node.
    fn create_comment(&self, text: &str) -> HostNode;

    /// Insert `node` into `parent` before `anchor`, or at the end. A node
    /// that already has a parent is moved.
    fn insert(&self, node: HostNode, parent: HostNode, anchor: Option<HostNode>);

    /// Detach `node` from its parent.
    fn remove(&self, node: HostNode);

    /// Replace the content of a text or comment node.
    fn set_text(&self, node: HostNode, text: &str);

    /// Replace every child of an element with a single text.
    fn set_element_text(&self, node: HostNode, text: &str);

    fn parent_node(&self, node: HostNode) -> Option<HostNode>;

    fn next_sibling(&self, node: HostNode) -> Option<HostNode>;

    /// Resolve a mount container.
    fn query_selector(&self, selector: &str) -> Option<HostNode>;

    /// Apply one attribute change. `next == None` removes the attribute.
    fn patch_prop(&self, node: HostNode, key: &str, prev: Option<&Value>, next: Option<&Value>);
}
