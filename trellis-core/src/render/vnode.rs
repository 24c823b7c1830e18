//! Virtual Nodes
//!
//! A [`VNode`] describes one node of the tree for one render. It is built
//! fresh every render and never changes afterwards, except for the slots
//! that attach it to what the host materialized (`el`, `anchor` and the
//! component instance), which the patcher fills in.
//!
//! Nodes are created through [`VNodeBuilder`]. Building a node with patch
//! flags (or a component) while a block is open registers it as a dynamic
//! descendant of that block; see [`open_block`](super::open_block).

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::block;
use super::component::{Component, ComponentInstance};
use super::flags::PatchFlags;
use super::host::HostNode;
use crate::reactive::Value;

/// Attributes of a node, in declaration order.
pub type Props = IndexMap<Rc<str>, Value>;

/// Identity of a child among its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Str(Rc<str>),
    Int(i64),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(s) => f.write_str(s),
            Key::Int(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.into())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s.into())
    }
}

impl From<Rc<str>> for Key {
    fn from(s: Rc<str>) -> Self {
        Key::Str(s)
    }
}

macro_rules! key_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Key {
            fn from(n: $t) -> Self {
                Key::Int(n as i64)
            }
        })*
    };
}

key_from_int!(i32, i64, u32, u64, usize);

/// What a node is.
#[derive(Clone)]
pub enum VNodeKind {
    Element(Rc<str>),
    Text,
    Comment,
    Fragment,
    Component(Component),
}

impl VNodeKind {
    /// Same tag, same component definition, or same primitive kind.
    pub fn same(&self, other: &VNodeKind) -> bool {
        match (self, other) {
            (VNodeKind::Element(a), VNodeKind::Element(b)) => a == b,
            (VNodeKind::Component(a), VNodeKind::Component(b)) => a.ptr_eq(b),
            (VNodeKind::Text, VNodeKind::Text)
            | (VNodeKind::Comment, VNodeKind::Comment)
            | (VNodeKind::Fragment, VNodeKind::Fragment) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for VNodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VNodeKind::Element(tag) => write!(f, "<{tag}>"),
            VNodeKind::Text => f.write_str("Text"),
            VNodeKind::Comment => f.write_str("Comment"),
            VNodeKind::Fragment => f.write_str("Fragment"),
            VNodeKind::Component(component) => write!(f, "<{}/>", component.name()),
        }
    }
}

/// Render function for one named slot.
pub type SlotFn = Rc<dyn Fn() -> Vec<Rc<VNode>>>;

/// Slot content passed to a component.
#[derive(Clone, Default)]
pub struct Slots {
    slots: IndexMap<Rc<str>, SlotFn>,
    stable: bool,
}

impl Slots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named slot.
    pub fn with<F>(mut self, name: impl Into<Rc<str>>, render: F) -> Self
    where
        F: Fn() -> Vec<Rc<VNode>> + 'static,
    {
        self.slots.insert(name.into(), Rc::new(render));
        self
    }

    /// Mark the slot content as depending only on the child's own state, so
    /// a parent re-render does not force the child to update.
    pub fn stable(mut self) -> Self {
        self.stable = true;
        self
    }

    pub fn is_stable(&self) -> bool {
        self.stable
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<SlotFn> {
        self.slots.get(name).cloned()
    }

    /// Render a slot, or nothing if it was not passed.
    pub fn render(&self, name: &str) -> Vec<Rc<VNode>> {
        self.get(name).map(|slot| slot()).unwrap_or_default()
    }
}

impl fmt::Debug for Slots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slots")
            .field("names", &self.slots.keys().collect::<Vec<_>>())
            .field("stable", &self.stable)
            .finish()
    }
}

/// Children of a node.
#[derive(Debug, Clone, Default)]
pub enum Children {
    #[default]
    None,
    /// Single text content of an element, or the content of a text or
    /// comment node.
    Text(Rc<str>),
    Nodes(Vec<Rc<VNode>>),
    /// Slot content of a component node.
    Slots(Slots),
}

impl Children {
    pub fn nodes(&self) -> &[Rc<VNode>] {
        match self {
            Children::Nodes(nodes) => nodes,
            _ => &[],
        }
    }

    pub fn text(&self) -> Option<&Rc<str>> {
        match self {
            Children::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn slots(&self) -> Option<&Slots> {
        match self {
            Children::Slots(slots) => Some(slots),
            _ => None,
        }
    }
}

/// Description of one tree node for one render.
pub struct VNode {
    kind: VNodeKind,
    key: Option<Key>,
    props: Props,
    children: Children,
    patch_flag: PatchFlags,
    /// Prop names covered by [`PatchFlags::PROPS`].
    dynamic_props: Vec<Rc<str>>,
    /// Set on blocks: the flagged descendants collected while building.
    dynamic_children: Option<Vec<Rc<VNode>>>,
    pub(crate) el: Cell<Option<HostNode>>,
    /// Fragment end marker.
    pub(crate) anchor: Cell<Option<HostNode>>,
    pub(crate) component: RefCell<Option<Rc<ComponentInstance>>>,
}

impl VNode {
    /// Start an element node.
    pub fn element(tag: impl Into<Rc<str>>) -> VNodeBuilder {
        VNodeBuilder::new(VNodeKind::Element(tag.into()))
    }

    /// Start a fragment: children without a wrapping element.
    pub fn fragment() -> VNodeBuilder {
        VNodeBuilder::new(VNodeKind::Fragment)
    }

    /// Start a component node.
    pub fn component(component: &Component) -> VNodeBuilder {
        VNodeBuilder::new(VNodeKind::Component(component.clone()))
    }

    /// A static text node.
    pub fn text(text: impl Into<Rc<str>>) -> Rc<VNode> {
        VNodeBuilder::new(VNodeKind::Text).text(text).build()
    }

    /// A text node whose content changes between renders.
    pub fn dynamic_text(text: impl Into<Rc<str>>) -> Rc<VNode> {
        VNodeBuilder::new(VNodeKind::Text)
            .text(text)
            .patch_flag(PatchFlags::TEXT)
            .build()
    }

    pub fn comment(text: impl Into<Rc<str>>) -> Rc<VNode> {
        VNodeBuilder::new(VNodeKind::Comment).text(text).build()
    }

    pub fn kind(&self) -> &VNodeKind {
        &self.kind
    }

    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn prop(&self, key: &str) -> Option<&Value> {
        self.props.get(key)
    }

    pub fn children(&self) -> &Children {
        &self.children
    }

    pub fn patch_flag(&self) -> PatchFlags {
        self.patch_flag
    }

    pub fn dynamic_props(&self) -> &[Rc<str>] {
        &self.dynamic_props
    }

    pub fn dynamic_children(&self) -> Option<&[Rc<VNode>]> {
        self.dynamic_children.as_deref()
    }

    pub fn is_block(&self) -> bool {
        self.dynamic_children.is_some()
    }

    /// The host node this vnode is attached to, once mounted.
    pub fn el(&self) -> Option<HostNode> {
        self.el.get()
    }

    /// The fragment end marker, once mounted.
    pub fn anchor(&self) -> Option<HostNode> {
        self.anchor.get()
    }

    /// The instance behind a mounted component node.
    pub fn component_instance(&self) -> Option<Rc<ComponentInstance>> {
        self.component.borrow().clone()
    }

    /// Whether two nodes can be patched into each other rather than
    /// replaced.
    pub fn is_same_type(&self, other: &VNode) -> bool {
        self.kind.same(&other.kind) && self.key == other.key
    }

    /// Copy of this node with `extra` merged over its props. Class strings
    /// are concatenated and the copy diffs its props in full.
    pub(crate) fn with_merged_props(&self, extra: &Props) -> Rc<VNode> {
        let mut props = self.props.clone();
        for (key, value) in extra {
            let merged = match (&**key, props.get(key)) {
                ("class", Some(existing)) => join_class(existing, value),
                ("style", Some(existing)) => join_style(existing, value),
                _ => value.clone(),
            };
            props.insert(key.clone(), merged);
        }
        Rc::new(VNode {
            kind: self.kind.clone(),
            key: self.key.clone(),
            props,
            children: self.children.clone(),
            patch_flag: self.patch_flag | PatchFlags::FULL_PROPS,
            dynamic_props: self.dynamic_props.clone(),
            dynamic_children: self.dynamic_children.clone(),
            el: Cell::new(self.el.get()),
            anchor: Cell::new(self.anchor.get()),
            component: RefCell::new(self.component.borrow().clone()),
        })
    }
}

fn join_class(a: &Value, b: &Value) -> Value {
    let parts: Vec<String> = [a, b]
        .into_iter()
        .map(|v| v.to_string())
        .filter(|s| !s.is_empty() && s != "null")
        .collect();
    Value::from(parts.join(" "))
}

fn join_style(a: &Value, b: &Value) -> Value {
    let parts: Vec<String> = [a, b]
        .into_iter()
        .map(|v| v.to_string().trim().trim_end_matches(';').to_string())
        .filter(|s| !s.is_empty() && s != "null")
        .collect();
    Value::from(parts.join("; "))
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VNode")
            .field("kind", &self.kind)
            .field("key", &self.key)
            .field("props", &self.props)
            .field("children", &self.children)
            .field("patch_flag", &self.patch_flag)
            .field("el", &self.el.get())
            .finish()
    }
}

/// Builder for [`VNode`]s.
#[must_use]
pub struct VNodeBuilder {
    kind: VNodeKind,
    key: Option<Key>,
    props: Props,
    children: Children,
    patch_flag: PatchFlags,
    dynamic_props: Vec<Rc<str>>,
}

impl VNodeBuilder {
    fn new(kind: VNodeKind) -> Self {
        Self {
            kind,
            key: None,
            props: Props::new(),
            children: Children::None,
            patch_flag: PatchFlags::empty(),
            dynamic_props: Vec::new(),
        }
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn prop(mut self, key: impl Into<Rc<str>>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    pub fn props<I, K, V>(mut self, props: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Rc<str>>,
        V: Into<Value>,
    {
        self.props
            .extend(props.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn class(self, class: impl Into<Value>) -> Self {
        self.prop("class", class)
    }

    /// Set a single text child.
    pub fn text(mut self, text: impl Into<Rc<str>>) -> Self {
        self.children = Children::Text(text.into());
        self
    }

    pub fn child(mut self, child: Rc<VNode>) -> Self {
        match &mut self.children {
            Children::Nodes(nodes) => nodes.push(child),
            other => *other = Children::Nodes(vec![child]),
        }
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Rc<VNode>>) -> Self {
        self.children = Children::Nodes(children.into_iter().collect());
        self
    }

    pub fn slots(mut self, slots: Slots) -> Self {
        self.children = Children::Slots(slots);
        self
    }

    pub fn patch_flag(mut self, flag: PatchFlags) -> Self {
        self.patch_flag |= flag;
        self
    }

    /// Name the props covered by [`PatchFlags::PROPS`] (and set that flag).
    pub fn dynamic_props<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Rc<str>>,
    {
        self.dynamic_props.extend(keys.into_iter().map(Into::into));
        self.patch_flag |= PatchFlags::PROPS;
        self
    }

    fn finish(self, dynamic_children: Option<Vec<Rc<VNode>>>) -> Rc<VNode> {
        Rc::new(VNode {
            kind: self.kind,
            key: self.key,
            props: self.props,
            children: self.children,
            patch_flag: self.patch_flag,
            dynamic_props: self.dynamic_props,
            dynamic_children,
            el: Cell::new(None),
            anchor: Cell::new(None),
            component: RefCell::new(None),
        })
    }

    /// Finish the node. A flagged node or a component registers with the
    /// enclosing block.
    pub fn build(self) -> Rc<VNode> {
        let dynamic = self.patch_flag.is_optimizable() || matches!(self.kind, VNodeKind::Component(_));
        let node = self.finish(None);
        if dynamic {
            block::track_dynamic(&node);
        }
        node
    }

    /// Finish the node as the root of the block opened last, taking its
    /// collected dynamic descendants. The block itself registers with the
    /// next enclosing block.
    pub fn block(self) -> Rc<VNode> {
        let dynamic = block::take_block();
        let node = self.finish(dynamic);
        block::track_dynamic(&node);
        node
    }
}

/// Shorthand for [`VNode::element`].
pub fn h(tag: impl Into<Rc<str>>) -> VNodeBuilder {
    VNode::element(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_type_needs_kind_and_key() {
        let a = h("li").key("a").build();
        let a2 = h("li").key("a").text("changed").build();
        let b = h("li").key("b").build();
        let div = h("div").key("a").build();
        assert!(a.is_same_type(&a2));
        assert!(!a.is_same_type(&b));
        assert!(!a.is_same_type(&div));
        assert!(VNode::text("x").is_same_type(&VNode::text("y")));
    }

    #[test]
    fn merged_props_join_class_and_force_full_diff() {
        let node = h("div").class("a").prop("id", "x").build();
        let mut extra = Props::new();
        extra.insert("class".into(), Value::from("b"));
        extra.insert("title".into(), Value::from("t"));
        let merged = node.with_merged_props(&extra);
        assert_eq!(merged.prop("class"), Some(&Value::from("a b")));
        assert_eq!(merged.prop("title"), Some(&Value::from("t")));
        assert_eq!(merged.prop("id"), Some(&Value::from("x")));
        assert!(merged.patch_flag().contains(PatchFlags::FULL_PROPS));
    }

    #[test]
    fn slots_render_by_name() {
        let slots = Slots::new().with("default", || vec![VNode::text("hi")]);
        assert_eq!(slots.render("default").len(), 1);
        assert!(slots.render("footer").is_empty());
        assert!(!slots.is_stable());
    }
}
