//! In-memory host.
//!
//! [`MemoryHost`] keeps its tree in an arena and records every mutation in
//! an operation log, so callers can assert on exactly what the reconciler
//! did.

use std::cell::RefCell;
use std::fmt::Write as _;

use indexmap::IndexMap;

use super::host::{Host, HostNode};
use crate::reactive::Value;

/// One recorded host mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    CreateElement { node: HostNode, tag: String },
    CreateText { node: HostNode, text: String },
    CreateComment { node: HostNode, text: String },
    /// `moved` is set when the node already had a parent.
    Insert {
        node: HostNode,
        parent: HostNode,
        anchor: Option<HostNode>,
        moved: bool,
    },
    Remove { node: HostNode },
    SetText { node: HostNode, text: String },
    SetElementText { node: HostNode, text: String },
    PatchProp {
        node: HostNode,
        key: String,
        value: Option<Value>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Element,
    Text,
    Comment,
}

#[derive(Debug)]
struct MemNode {
    kind: NodeKind,
    /// Tag for elements, content otherwise.
    text: String,
    props: IndexMap<String, Value>,
    parent: Option<HostNode>,
    children: Vec<HostNode>,
}

#[derive(Debug, Default)]
struct State {
    nodes: Vec<MemNode>,
    ops: Vec<HostOp>,
}

impl State {
    fn alloc(&mut self, kind: NodeKind, text: &str) -> HostNode {
        let node = HostNode::from_raw(self.nodes.len() as u64);
        self.nodes.push(MemNode {
            kind,
            text: text.to_string(),
            props: IndexMap::new(),
            parent: None,
            children: Vec::new(),
        });
        node
    }

    fn node(&self, node: HostNode) -> Option<&MemNode> {
        self.nodes.get(node.raw() as usize)
    }

    fn node_mut(&mut self, node: HostNode) -> Option<&mut MemNode> {
        self.nodes.get_mut(node.raw() as usize)
    }

    fn detach(&mut self, node: HostNode) -> bool {
        let Some(parent) = self.node_mut(node).and_then(|n| n.parent.take()) else {
            return false;
        };
        if let Some(parent) = self.node_mut(parent) {
            parent.children.retain(|&child| child != node);
        }
        true
    }
}

/// A [`Host`] backed by an in-memory tree.
#[derive(Debug, Default)]
pub struct MemoryHost {
    state: RefCell<State>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached container element. Not recorded in the log.
    pub fn root(&self) -> HostNode {
        self.state.borrow_mut().alloc(NodeKind::Element, "root")
    }

    /// Every mutation recorded since the last [`clear_ops`](Self::clear_ops).
    pub fn ops(&self) -> Vec<HostOp> {
        self.state.borrow().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.borrow_mut().ops.clear();
    }

    /// Number of logged operations matching `pred`.
    pub fn count(&self, pred: impl Fn(&HostOp) -> bool) -> usize {
        self.state.borrow().ops.iter().filter(|op| pred(op)).count()
    }

    /// Nodes created (elements, texts and comments).
    pub fn created(&self) -> usize {
        self.count(|op| {
            matches!(
                op,
                HostOp::CreateElement { .. } | HostOp::CreateText { .. } | HostOp::CreateComment { .. }
            )
        })
    }

    /// Nodes relocated within the tree, in the order they moved.
    pub fn moved(&self) -> Vec<HostNode> {
        self.state
            .borrow()
            .ops
            .iter()
            .filter_map(|op| match op {
                HostOp::Insert { node, moved: true, .. } => Some(*node),
                _ => None,
            })
            .collect()
    }

    /// Nodes detached with `remove`.
    pub fn removed(&self) -> Vec<HostNode> {
        self.state
            .borrow()
            .ops
            .iter()
            .filter_map(|op| match op {
                HostOp::Remove { node } => Some(*node),
                _ => None,
            })
            .collect()
    }

    pub fn children(&self, node: HostNode) -> Vec<HostNode> {
        self.state
            .borrow()
            .node(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Tag of an element node.
    pub fn tag(&self, node: HostNode) -> Option<String> {
        let state = self.state.borrow();
        let n = state.node(node)?;
        (n.kind == NodeKind::Element).then(|| n.text.clone())
    }

    pub fn prop(&self, node: HostNode, key: &str) -> Option<Value> {
        self.state.borrow().node(node)?.props.get(key).cloned()
    }

    /// Concatenated text of `node` and its descendants.
    pub fn text_content(&self, node: HostNode) -> String {
        let state = self.state.borrow();
        let mut out = String::new();
        collect_text(&state, node, &mut out);
        out
    }

    /// Markup-like rendering of the children of `node`.
    pub fn inner_html(&self, node: HostNode) -> String {
        let state = self.state.borrow();
        let mut out = String::new();
        if let Some(n) = state.node(node) {
            for &child in &n.children {
                serialize(&state, child, &mut out);
            }
        }
        out
    }
}

fn collect_text(state: &State, node: HostNode, out: &mut String) {
    let Some(n) = state.node(node) else {
        return;
    };
    match n.kind {
        NodeKind::Text => out.push_str(&n.text),
        NodeKind::Comment => {}
        NodeKind::Element => {
            for &child in &n.children {
                collect_text(state, child, out);
            }
        }
    }
}

fn serialize(state: &State, node: HostNode, out: &mut String) {
    let Some(n) = state.node(node) else {
        return;
    };
    match n.kind {
        NodeKind::Text => out.push_str(&n.text),
        NodeKind::Comment => {
            let _ = write!(out, "<!--{}-->", n.text);
        }
        NodeKind::Element => {
            let _ = write!(out, "<{}", n.text);
            for (key, value) in &n.props {
                let _ = write!(out, " {key}=\"{value}\"");
            }
            out.push('>');
            for &child in &n.children {
                serialize(state, child, out);
            }
            let _ = write!(out, "</{}>", n.text);
        }
    }
}

impl Host for MemoryHost {
    fn create_element(&self, tag: &str) -> HostNode {
        let mut state = self.state.borrow_mut();
        let node = state.alloc(NodeKind::Element, tag);
        state.ops.push(HostOp::CreateElement {
            node,
            tag: tag.to_string(),
        });
        node
    }

    fn create_text(&self, text: &str) -> HostNode {
        let mut state = self.state.borrow_mut();
        let node = state.alloc(NodeKind::Text, text);
        state.ops.push(HostOp::CreateText {
            node,
            text: text.to_string(),
        });
        node
    }

    fn create_comment(&self, text: &str) -> HostNode {
        let mut state = self.state.borrow_mut();
        let node = state.alloc(NodeKind::Comment, text);
        state.ops.push(HostOp::CreateComment {
            node,
            text: text.to_string(),
        });
        node
    }

    fn insert(&self, node: HostNode, parent: HostNode, anchor: Option<HostNode>) {
        let mut state = self.state.borrow_mut();
        let moved = state.detach(node);
        let Some(parent_node) = state.node_mut(parent) else {
            tracing::warn!(%parent, "insert into unknown node");
            return;
        };
        let position = anchor
            .and_then(|anchor| parent_node.children.iter().position(|&c| c == anchor))
            .unwrap_or(parent_node.children.len());
        parent_node.children.insert(position, node);
        if let Some(n) = state.node_mut(node) {
            n.parent = Some(parent);
        }
        state.ops.push(HostOp::Insert {
            node,
            parent,
            anchor,
            moved,
        });
    }

    fn remove(&self, node: HostNode) {
        let mut state = self.state.borrow_mut();
        state.detach(node);
        state.ops.push(HostOp::Remove { node });
    }

    fn set_text(&self, node: HostNode, text: &str) {
        let mut state = self.state.borrow_mut();
        if let Some(n) = state.node_mut(node) {
            n.text = text.to_string();
        }
        state.ops.push(HostOp::SetText {
            node,
            text: text.to_string(),
        });
    }

    fn set_element_text(&self, node: HostNode, text: &str) {
        let mut state = self.state.borrow_mut();
        let children = state
            .node_mut(node)
            .map(|n| std::mem::take(&mut n.children))
            .unwrap_or_default();
        for child in children {
            if let Some(c) = state.node_mut(child) {
                c.parent = None;
            }
        }
        if !text.is_empty() {
            let child = state.alloc(NodeKind::Text, text);
            if let Some(c) = state.node_mut(child) {
                c.parent = Some(node);
            }
            if let Some(n) = state.node_mut(node) {
                n.children.push(child);
            }
        }
        state.ops.push(HostOp::SetElementText {
            node,
            text: text.to_string(),
        });
    }

    fn parent_node(&self, node: HostNode) -> Option<HostNode> {
        self.state.borrow().node(node)?.parent
    }

    fn next_sibling(&self, node: HostNode) -> Option<HostNode> {
        let state = self.state.borrow();
        let parent = state.node(state.node(node)?.parent?)?;
        let position = parent.children.iter().position(|&c| c == node)?;
        parent.children.get(position + 1).copied()
    }

    /// Supports `#id` (matching an `id` prop) and bare tag names.
    fn query_selector(&self, selector: &str) -> Option<HostNode> {
        let state = self.state.borrow();
        let matches = |n: &MemNode| {
            if n.kind != NodeKind::Element {
                return false;
            }
            match selector.strip_prefix('#') {
                Some(id) => n.props.get("id").and_then(Value::as_str) == Some(id),
                None => n.text == selector,
            }
        };
        state
            .nodes
            .iter()
            .position(matches)
            .map(|index| HostNode::from_raw(index as u64))
    }

    fn patch_prop(&self, node: HostNode, key: &str, _prev: Option<&Value>, next: Option<&Value>) {
        let mut state = self.state.borrow_mut();
        if let Some(n) = state.node_mut(node) {
            match next {
                Some(value) => {
                    n.props.insert(key.to_string(), value.clone());
                }
                None => {
                    n.props.shift_remove(key);
                }
            }
        }
        state.ops.push(HostOp::PatchProp {
            node,
            key: key.to_string(),
            value: next.cloned(),
        });
    }
}
