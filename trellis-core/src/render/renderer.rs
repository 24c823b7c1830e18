//! The patcher.
//!
//! [`Renderer::patch`] takes the previous vnode (or nothing) and the next
//! one, and drives the [`Host`] until the materialized tree matches:
//!
//! 1. no previous node: mount;
//! 2. different kind or key: unmount the old node (remembering the host
//!    node after it as the anchor) and mount the new one in its place;
//! 3. otherwise patch in place, by kind.
//!
//! Elements honor their patch flags. Blocks with dynamic-descendant lists
//! of equal length are patched pairwise over those lists only; anything
//! else falls back to a full diff, so every pair of trees is handled.
//!
//! Keyed children are diffed by trimming the common prefix and suffix, then
//! mapping the middle by key. Children on a longest increasing subsequence
//! of old positions stay put; the rest are moved, back to front, so every
//! anchor is already in its final place.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use super::component::{should_update_component, Component, ComponentInstance, LifecycleHook};
use super::flags::PatchFlags;
use super::host::{Host, HostNode};
use super::lis::longest_increasing_subsequence;
use super::vnode::{Children, Key, Props, VNode, VNodeKind};
use crate::config;
use crate::error::{report, RuntimeError};
use crate::reactive::{Effect, Value};
use crate::scheduler::{flush_post_flush_cbs, flush_pre_flush_cbs, invalidate_job, queue_job, Job};

struct RendererInner {
    host: Rc<dyn Host>,
    /// Last vnode rendered into each container.
    roots: RefCell<HashMap<HostNode, Rc<VNode>>>,
}

/// Renders vnode trees into a [`Host`]. Cheap to clone.
#[derive(Clone)]
pub struct Renderer {
    inner: Rc<RendererInner>,
}

/// Dynamic descendants, unless the node bailed out of optimized mode.
fn dynamic_children(node: &VNode) -> Option<&[Rc<VNode>]> {
    if node.patch_flag().contains(PatchFlags::BAIL) {
        return None;
    }
    node.dynamic_children()
}

fn text_of(node: &VNode) -> &str {
    node.children().text().map_or("", |text| &**text)
}

impl Renderer {
    pub fn new(host: Rc<dyn Host>) -> Self {
        Self {
            inner: Rc::new(RendererInner {
                host,
                roots: Default::default(),
            }),
        }
    }

    pub fn host(&self) -> &Rc<dyn Host> {
        &self.inner.host
    }

    fn downgrade(&self) -> Weak<RendererInner> {
        Rc::downgrade(&self.inner)
    }

    /// Render `vnode` into `container`, patching against what was rendered
    /// there before. `None` unmounts. Pending pre and post callbacks run
    /// before returning.
    pub fn render(&self, vnode: Option<Rc<VNode>>, container: HostNode) {
        let previous = self.inner.roots.borrow().get(&container).cloned();
        match (vnode, previous) {
            (Some(vnode), previous) => {
                self.patch(previous.as_ref(), &vnode, container, None, false);
                self.inner.roots.borrow_mut().insert(container, vnode);
            }
            (None, Some(previous)) => {
                self.unmount(&previous, true);
                self.inner.roots.borrow_mut().remove(&container);
            }
            (None, None) => {}
        }
        flush_pre_flush_cbs();
        flush_post_flush_cbs();
    }

    /// Resolve `selector` through the host and render into it.
    pub fn mount_selector(&self, vnode: Rc<VNode>, selector: &str) -> Option<HostNode> {
        let Some(container) = self.inner.host.query_selector(selector) else {
            tracing::warn!(selector, "mount target not found");
            return None;
        };
        self.render(Some(vnode), container);
        Some(container)
    }

    /// The vnode last rendered into `container`.
    pub fn root(&self, container: HostNode) -> Option<Rc<VNode>> {
        self.inner.roots.borrow().get(&container).cloned()
    }

    /// Patch `n1` into `n2` inside `container`, inserting new nodes before
    /// `anchor`.
    pub fn patch(
        &self,
        n1: Option<&Rc<VNode>>,
        n2: &Rc<VNode>,
        container: HostNode,
        anchor: Option<HostNode>,
        optimized: bool,
    ) {
        let mut n1 = n1;
        let mut anchor = anchor;
        if let Some(old) = n1 {
            if Rc::ptr_eq(old, n2) {
                return;
            }
            if !old.is_same_type(n2) {
                anchor = self.next_host_node(old);
                self.unmount(old, true);
                n1 = None;
            }
        }
        let optimized = optimized && !n2.patch_flag().contains(PatchFlags::BAIL);

        match n2.kind() {
            VNodeKind::Text => self.process_text(n1, n2, container, anchor),
            VNodeKind::Comment => self.process_comment(n1, n2, container, anchor),
            VNodeKind::Element(tag) => match n1 {
                None => self.mount_element(n2, tag, container, anchor, optimized),
                Some(old) => self.patch_element(old, n2, optimized),
            },
            VNodeKind::Fragment => self.process_fragment(n1, n2, container, anchor, optimized),
            VNodeKind::Component(component) => match n1 {
                None => self.mount_component(n2, component, container, anchor),
                Some(old) => self.update_component(old, n2, optimized),
            },
        }
    }

    fn process_text(&self, n1: Option<&Rc<VNode>>, n2: &VNode, container: HostNode, anchor: Option<HostNode>) {
        let host = &self.inner.host;
        match n1 {
            None => {
                let el = host.create_text(text_of(n2));
                n2.el.set(Some(el));
                host.insert(el, container, anchor);
            }
            Some(old) => {
                let el = old.el.get();
                n2.el.set(el);
                if let Some(el) = el {
                    if text_of(old) != text_of(n2) {
                        host.set_text(el, text_of(n2));
                    }
                }
            }
        }
    }

    /// Comments are not dynamic: an existing one is only re-attached.
    fn process_comment(&self, n1: Option<&Rc<VNode>>, n2: &VNode, container: HostNode, anchor: Option<HostNode>) {
        match n1 {
            None => {
                let el = self.inner.host.create_comment(text_of(n2));
                n2.el.set(Some(el));
                self.inner.host.insert(el, container, anchor);
            }
            Some(old) => n2.el.set(old.el.get()),
        }
    }

    fn mount_element(&self, vnode: &VNode, tag: &str, container: HostNode, anchor: Option<HostNode>, optimized: bool) {
        let host = &self.inner.host;
        let el = host.create_element(tag);
        vnode.el.set(Some(el));
        tracing::trace!(tag, %el, "mount element");

        match vnode.children() {
            Children::Text(text) => host.set_element_text(el, text),
            Children::Nodes(children) => self.mount_children(children, el, None, optimized),
            Children::None | Children::Slots(_) => {}
        }
        for (key, value) in vnode.props() {
            host.patch_prop(el, key, None, Some(value));
        }
        host.insert(el, container, anchor);
    }

    fn mount_children(&self, children: &[Rc<VNode>], container: HostNode, anchor: Option<HostNode>, optimized: bool) {
        for child in children {
            if child.el.get().is_some() {
                tracing::warn!(kind = ?child.kind(), "mounting a vnode that is already mounted");
            }
            self.patch(None, child, container, anchor, optimized);
        }
    }

    fn patch_element(&self, n1: &Rc<VNode>, n2: &Rc<VNode>, optimized: bool) {
        let host = &self.inner.host;
        let el = n1.el.get();
        n2.el.set(el);
        let Some(el) = el else {
            tracing::warn!(kind = ?n2.kind(), "patching an element that was never mounted");
            return;
        };
        // An old full-props node may have set props the new flags do not name.
        let flag = n2.patch_flag() | (n1.patch_flag() & PatchFlags::FULL_PROPS);
        let dynamic = dynamic_children(n2);

        let mut children_diffed = false;
        match (dynamic, dynamic_children(n1)) {
            (Some(next), Some(prev)) if next.len() == prev.len() => {
                self.patch_block_children(prev, next, el);
                self.traverse_static_children(n1, n2);
            }
            (Some(next), prev) => {
                tracing::debug!(
                    next = next.len(),
                    prev = ?prev.map(<[_]>::len),
                    "block shape changed, falling back to full diff"
                );
                self.patch_children(n1, n2, el, None, false);
                children_diffed = true;
            }
            (None, _) if !optimized => {
                self.patch_children(n1, n2, el, None, false);
                children_diffed = true;
            }
            (None, _) => {}
        }

        if flag.is_optimizable() {
            if flag.contains(PatchFlags::FULL_PROPS) {
                self.patch_props(el, n1.props(), n2.props());
            } else {
                if flag.contains(PatchFlags::CLASS) {
                    self.patch_prop_if_changed(el, "class", n1.prop("class"), n2.prop("class"));
                }
                if flag.contains(PatchFlags::STYLE) {
                    self.patch_prop_if_changed(el, "style", n1.prop("style"), n2.prop("style"));
                }
                if flag.contains(PatchFlags::PROPS) {
                    for key in n2.dynamic_props() {
                        self.patch_prop_if_changed(el, key, n1.prop(key), n2.prop(key));
                    }
                }
            }
            if flag.contains(PatchFlags::TEXT) && !children_diffed && text_of(n1) != text_of(n2) {
                host.set_element_text(el, text_of(n2));
            }
        } else if !optimized && dynamic.is_none() {
            self.patch_props(el, n1.props(), n2.props());
        }
    }

    fn patch_prop_if_changed(&self, el: HostNode, key: &str, prev: Option<&Value>, next: Option<&Value>) {
        if prev != next {
            self.inner.host.patch_prop(el, key, prev, next);
        }
    }

    /// Full attribute diff.
    fn patch_props(&self, el: HostNode, old: &Props, new: &Props) {
        let host = &self.inner.host;
        for (key, next) in new {
            let prev = old.get(key);
            if prev != Some(next) {
                host.patch_prop(el, key, prev, Some(next));
            }
        }
        for (key, prev) in old {
            if !new.contains_key(key) {
                host.patch_prop(el, key, Some(prev), None);
            }
        }
    }

    /// Pairwise patch of two dynamic-descendant lists.
    fn patch_block_children(&self, old: &[Rc<VNode>], new: &[Rc<VNode>], fallback: HostNode) {
        for (prev, next) in old.iter().zip(new) {
            // Only nodes that may be replaced or hold several host nodes need
            // their real parent; the rest are patched in place.
            let needs_parent = matches!(prev.kind(), VNodeKind::Fragment | VNodeKind::Component(_))
                || !prev.is_same_type(next);
            let container = match prev.el.get() {
                Some(el) if needs_parent => self.inner.host.parent_node(el).unwrap_or(fallback),
                _ => fallback,
            };
            self.patch(Some(prev), next, container, None, true);
        }
    }

    /// Carry host nodes over to static children the block walk skipped.
    fn traverse_static_children(&self, n1: &VNode, n2: &VNode) {
        let (Children::Nodes(old), Children::Nodes(new)) = (n1.children(), n2.children()) else {
            return;
        };
        for (prev, next) in old.iter().zip(new) {
            if Rc::ptr_eq(prev, next) {
                continue;
            }
            if next.el.get().is_none() {
                next.el.set(prev.el.get());
                next.anchor.set(prev.anchor.get());
            }
            if !next.patch_flag().contains(PatchFlags::BAIL) {
                self.traverse_static_children(prev, next);
            }
        }
    }

    fn process_fragment(
        &self,
        n1: Option<&Rc<VNode>>,
        n2: &Rc<VNode>,
        container: HostNode,
        anchor: Option<HostNode>,
        optimized: bool,
    ) {
        let host = &self.inner.host;
        let start = n1.and_then(|old| old.el.get());
        let end = n1.and_then(|old| old.anchor.get());
        let (Some(old), Some(start), Some(end)) = (n1, start, end) else {
            let start = host.create_text("");
            let end = host.create_text("");
            n2.el.set(Some(start));
            n2.anchor.set(Some(end));
            host.insert(start, container, anchor);
            host.insert(end, container, anchor);
            self.mount_children(n2.children().nodes(), container, Some(end), optimized);
            return;
        };
        n2.el.set(Some(start));
        n2.anchor.set(Some(end));

        let flag = n2.patch_flag();
        match (dynamic_children(n2), dynamic_children(old)) {
            (Some(next), Some(prev))
                if flag.is_optimizable() && flag.contains(PatchFlags::STABLE_FRAGMENT) && next.len() == prev.len() =>
            {
                self.patch_block_children(prev, next, container);
                self.traverse_static_children(old, n2);
            }
            _ => self.patch_children(old, n2, container, Some(end), optimized),
        }
    }

    /// Generic child-list diff.
    fn patch_children(&self, n1: &VNode, n2: &VNode, container: HostNode, anchor: Option<HostNode>, optimized: bool) {
        let host = &self.inner.host;
        let flag = n2.patch_flag();
        if flag.is_optimizable() {
            if flag.contains(PatchFlags::KEYED_FRAGMENT) {
                self.patch_keyed_children(n1.children().nodes(), n2.children().nodes(), container, anchor, optimized);
                return;
            }
            if flag.contains(PatchFlags::UNKEYED_FRAGMENT) {
                self.patch_unkeyed_children(n1.children().nodes(), n2.children().nodes(), container, anchor, optimized);
                return;
            }
        }

        match (n1.children(), n2.children()) {
            (old, Children::Text(text)) => {
                if let Children::Nodes(nodes) = old {
                    self.unmount_children(nodes);
                }
                if old.text() != Some(text) {
                    host.set_element_text(container, text);
                }
            }
            (Children::Nodes(old), Children::Nodes(new)) => {
                self.patch_keyed_children(old, new, container, anchor, optimized);
            }
            (old, Children::Nodes(new)) => {
                if old.text().is_some() {
                    host.set_element_text(container, "");
                }
                self.mount_children(new, container, anchor, optimized);
            }
            (Children::Nodes(old), _) => self.unmount_children(old),
            (Children::Text(_), _) => host.set_element_text(container, ""),
            _ => {}
        }
    }

    /// Patch by position.
    fn patch_unkeyed_children(
        &self,
        old: &[Rc<VNode>],
        new: &[Rc<VNode>],
        container: HostNode,
        anchor: Option<HostNode>,
        optimized: bool,
    ) {
        let common = old.len().min(new.len());
        for (prev, next) in old.iter().zip(new) {
            self.patch(Some(prev), next, container, None, optimized);
        }
        if old.len() > new.len() {
            self.unmount_children(&old[common..]);
        } else {
            self.mount_children(&new[common..], container, anchor, optimized);
        }
    }

    /// Keyed diff. Children without a key match the first unclaimed new
    /// child of the same kind, which is quadratic; keys avoid it.
    fn patch_keyed_children(
        &self,
        old: &[Rc<VNode>],
        new: &[Rc<VNode>],
        container: HostNode,
        parent_anchor: Option<HostNode>,
        optimized: bool,
    ) {
        let mut start = 0;
        let mut old_end = old.len();
        let mut new_end = new.len();

        // Common prefix.
        while start < old_end && start < new_end && old[start].is_same_type(&new[start]) {
            self.patch(Some(&old[start]), &new[start], container, None, optimized);
            start += 1;
        }

        // Common suffix.
        while start < old_end && start < new_end && old[old_end - 1].is_same_type(&new[new_end - 1]) {
            self.patch(Some(&old[old_end - 1]), &new[new_end - 1], container, None, optimized);
            old_end -= 1;
            new_end -= 1;
        }

        if start >= old_end {
            if start < new_end {
                let anchor = match new.get(new_end) {
                    Some(next) => self.host_anchor(next),
                    None => parent_anchor,
                };
                for node in &new[start..new_end] {
                    self.patch(None, node, container, anchor, optimized);
                }
            }
            return;
        }

        if start >= new_end {
            for node in &old[start..old_end] {
                self.unmount(node, true);
            }
            return;
        }

        // Unknown middle: old[start..old_end] against new[start..new_end].
        let mut key_to_new_index: HashMap<&Key, usize> = HashMap::new();
        for (index, node) in new.iter().enumerate().take(new_end).skip(start) {
            let Some(key) = node.key() else {
                continue;
            };
            if key_to_new_index.insert(key, index).is_some() && config::config().warn_duplicate_keys {
                report(RuntimeError::DuplicateKey { key: key.to_string() });
            }
        }

        let to_be_patched = new_end - start;
        let mut patched = 0;
        let mut moved = false;
        let mut max_new_index_so_far = 0;
        // Old index of each new child in the middle, `None` for new nodes.
        let mut new_to_old: Vec<Option<usize>> = vec![None; to_be_patched];

        for (old_index, prev) in old.iter().enumerate().take(old_end).skip(start) {
            if patched >= to_be_patched {
                self.unmount(prev, true);
                continue;
            }
            let new_index = match prev.key() {
                Some(key) => key_to_new_index.get(key).copied(),
                None => (start..new_end)
                    .find(|&index| new_to_old[index - start].is_none() && prev.is_same_type(&new[index])),
            };
            let Some(new_index) = new_index.filter(|&index| new_to_old[index - start].is_none()) else {
                self.unmount(prev, true);
                continue;
            };
            new_to_old[new_index - start] = Some(old_index);
            if new_index >= max_new_index_so_far {
                max_new_index_so_far = new_index;
            } else {
                moved = true;
            }
            self.patch(Some(prev), &new[new_index], container, None, optimized);
            patched += 1;
        }

        let stable = if moved {
            longest_increasing_subsequence(&new_to_old)
        } else {
            Vec::new()
        };
        tracing::debug!(
            old = old_end - start,
            new = to_be_patched,
            moved,
            stable = stable.len(),
            "keyed diff"
        );

        let mut stable = stable.iter().rev().peekable();
        for offset in (0..to_be_patched).rev() {
            let index = start + offset;
            let node = &new[index];
            let anchor = match new.get(index + 1) {
                Some(next) => self.host_anchor(next),
                None => parent_anchor,
            };
            match new_to_old[offset] {
                None => self.patch(None, node, container, anchor, optimized),
                Some(_) if moved => {
                    if stable.peek() == Some(&&offset) {
                        stable.next();
                    } else {
                        self.move_node(node, container, anchor);
                    }
                }
                Some(_) => {}
            }
        }
    }

    /// First host node of a vnode, looking through components.
    fn host_anchor(&self, vnode: &VNode) -> Option<HostNode> {
        if let VNodeKind::Component(_) = vnode.kind() {
            if let Some(sub_tree) = vnode.component_instance().and_then(|instance| instance.sub_tree()) {
                return self.host_anchor(&sub_tree);
            }
        }
        vnode.el.get()
    }

    /// The host node right after everything `vnode` materialized.
    fn next_host_node(&self, vnode: &VNode) -> Option<HostNode> {
        if let VNodeKind::Component(_) = vnode.kind() {
            let sub_tree = vnode.component_instance().and_then(|instance| instance.sub_tree());
            return sub_tree.and_then(|sub_tree| self.next_host_node(&sub_tree));
        }
        let last = vnode.anchor.get().or(vnode.el.get())?;
        self.inner.host.next_sibling(last)
    }

    /// Re-insert everything `vnode` materialized before `anchor`.
    fn move_node(&self, vnode: &VNode, container: HostNode, anchor: Option<HostNode>) {
        let host = &self.inner.host;
        match vnode.kind() {
            VNodeKind::Component(_) => {
                if let Some(sub_tree) = vnode.component_instance().and_then(|instance| instance.sub_tree()) {
                    self.move_node(&sub_tree, container, anchor);
                }
            }
            VNodeKind::Fragment => {
                if let Some(start) = vnode.el.get() {
                    host.insert(start, container, anchor);
                }
                for child in vnode.children().nodes() {
                    self.move_node(child, container, anchor);
                }
                if let Some(end) = vnode.anchor.get() {
                    host.insert(end, container, anchor);
                }
            }
            _ => {
                if let Some(el) = vnode.el.get() {
                    host.insert(el, container, anchor);
                }
            }
        }
    }

    /// Tear `vnode` down. Host nodes are only detached at the top of the
    /// unmounted subtree (`do_remove`); descendants go with it.
    fn unmount(&self, vnode: &VNode, do_remove: bool) {
        if let VNodeKind::Component(_) = vnode.kind() {
            if let Some(instance) = vnode.component_instance() {
                self.unmount_component(&instance, do_remove);
            }
            return;
        }
        for child in vnode.children().nodes() {
            self.unmount(child, false);
        }
        if do_remove {
            self.remove(vnode);
        }
    }

    fn unmount_children(&self, children: &[Rc<VNode>]) {
        for child in children {
            self.unmount(child, true);
        }
    }

    fn remove(&self, vnode: &VNode) {
        let host = &self.inner.host;
        match (vnode.kind(), vnode.el.get(), vnode.anchor.get()) {
            (VNodeKind::Fragment, Some(start), Some(end)) => {
                let mut current = start;
                loop {
                    let next = host.next_sibling(current);
                    host.remove(current);
                    if current == end {
                        break;
                    }
                    match next {
                        Some(next) => current = next,
                        None => break,
                    }
                }
            }
            (_, Some(el), _) => host.remove(el),
            _ => {}
        }
    }

    fn mount_component(&self, vnode: &Rc<VNode>, component: &Component, container: HostNode, anchor: Option<HostNode>) {
        tracing::debug!(component = component.name(), "mount component");
        let instance = ComponentInstance::new(vnode, component);
        *vnode.component.borrow_mut() = Some(instance.clone());
        instance.setup();
        self.setup_render_effect(&instance, container, anchor);
    }

    fn setup_render_effect(&self, instance: &Rc<ComponentInstance>, container: HostNode, anchor: Option<HostNode>) {
        let renderer = self.downgrade();
        let weak_instance = Rc::downgrade(instance);
        let update = move || {
            let (Some(inner), Some(instance)) = (renderer.upgrade(), weak_instance.upgrade()) else {
                return;
            };
            Renderer { inner }.update_component_tree(&instance, container, anchor);
        };
        let Some(effect) = instance.scope.run(|| Effect::new_lazy(update)) else {
            return;
        };
        let job = {
            let effect = effect.downgrade();
            Job::new(move || {
                if let Some(effect) = effect.upgrade().filter(Effect::is_active) {
                    effect.run();
                }
            })
        };
        effect.set_scheduler({
            let job = job.clone();
            move || queue_job(job.clone())
        });
        *instance.effect.borrow_mut() = Some(effect);
        *instance.job.borrow_mut() = Some(job.clone());
        instance.toggle_recurse(true);
        job.run();
    }

    /// Body of a component's render effect: first mount, or re-render.
    fn update_component_tree(&self, instance: &Rc<ComponentInstance>, container: HostNode, anchor: Option<HostNode>) {
        if !instance.is_mounted() {
            instance.toggle_recurse(false);
            instance.call_hooks(LifecycleHook::BeforeMount);
            instance.toggle_recurse(true);

            let tree = instance.render_root();
            self.patch(None, &tree, container, anchor, false);
            if let Some(vnode) = instance.vnode.borrow().upgrade() {
                vnode.el.set(tree.el.get());
            }
            *instance.sub_tree.borrow_mut() = Some(tree);
            instance.is_mounted.set(true);
            instance.queue_hooks(LifecycleHook::Mounted);
            return;
        }

        let next = instance.next.borrow_mut().take();
        let vnode = match next {
            Some(next) => {
                instance.toggle_recurse(false);
                if let Some(current) = instance.vnode.borrow().upgrade() {
                    next.el.set(current.el.get());
                }
                self.update_component_pre_render(instance, &next);
                instance.toggle_recurse(true);
                Some(next)
            }
            None => instance.vnode.borrow().upgrade(),
        };

        instance.toggle_recurse(false);
        instance.call_hooks(LifecycleHook::BeforeUpdate);
        instance.toggle_recurse(true);

        let next_tree = instance.render_root();
        let prev_tree = instance.sub_tree.replace(Some(next_tree.clone()));
        tracing::debug!(component = instance.name(), uid = instance.uid(), "update component");
        match prev_tree {
            Some(prev_tree) => {
                let parent = prev_tree
                    .el
                    .get()
                    .and_then(|el| self.inner.host.parent_node(el))
                    .unwrap_or(container);
                let anchor = self.next_host_node(&prev_tree);
                self.patch(Some(&prev_tree), &next_tree, parent, anchor, false);
            }
            None => self.patch(None, &next_tree, container, anchor, false),
        }
        if let Some(vnode) = vnode {
            vnode.el.set(next_tree.el.get());
        }
        instance.queue_hooks(LifecycleHook::Updated);
    }

    fn update_component_pre_render(&self, instance: &ComponentInstance, next: &Rc<VNode>) {
        *instance.vnode.borrow_mut() = Rc::downgrade(next);
        instance.update_props(next.props());
        instance.update_slots(next.children());
        // Watchers triggered by the new props run before the re-render.
        flush_pre_flush_cbs();
    }

    fn update_component(&self, n1: &Rc<VNode>, n2: &Rc<VNode>, optimized: bool) {
        let Some(instance) = n1.component_instance() else {
            tracing::warn!(kind = ?n2.kind(), "updating a component that was never mounted");
            return;
        };
        *n2.component.borrow_mut() = Some(instance.clone());
        if should_update_component(n1, n2, optimized) {
            *instance.next.borrow_mut() = Some(n2.clone());
            let job = instance.job.borrow().clone();
            if let Some(job) = job {
                // The child may already be queued for its own state; this
                // synchronous run covers it.
                invalidate_job(&job);
                job.run();
            }
        } else {
            n2.el.set(n1.el.get());
            *instance.vnode.borrow_mut() = Rc::downgrade(n2);
        }
    }

    fn unmount_component(&self, instance: &Rc<ComponentInstance>, do_remove: bool) {
        tracing::debug!(component = instance.name(), uid = instance.uid(), "unmount component");
        instance.call_hooks(LifecycleHook::BeforeUnmount);
        instance.scope.stop();
        let job = instance.job.borrow().clone();
        if let Some(job) = job {
            job.deactivate();
        }
        if let Some(sub_tree) = instance.sub_tree() {
            self.unmount(&sub_tree, do_remove);
        }
        instance.queue_hooks(LifecycleHook::Unmounted);
        instance.is_unmounted.set(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{h, open_block, MemoryHost};

    fn setup() -> (Rc<MemoryHost>, Renderer, HostNode) {
        let host = Rc::new(MemoryHost::new());
        let renderer = Renderer::new(host.clone());
        let root = host.root();
        (host, renderer, root)
    }

    fn list(keys: &[&str]) -> Rc<VNode> {
        h("ul")
            .children(keys.iter().map(|&k| h("li").key(k).text(k).build()))
            .build()
    }

    #[test]
    fn mounts_and_patches_text() {
        let (host, renderer, root) = setup();
        renderer.render(Some(h("p").text("a").build()), root);
        assert_eq!(host.inner_html(root), "<p>a</p>");

        host.clear_ops();
        renderer.render(Some(h("p").text("b").build()), root);
        assert_eq!(host.inner_html(root), "<p>b</p>");
        assert_eq!(host.created(), 0);
    }

    #[test]
    fn replaces_node_of_different_kind_in_place() {
        let (host, renderer, root) = setup();
        let tree = |inner: Rc<VNode>| h("div").children([inner, h("i").build()]).build();
        renderer.render(Some(tree(h("span").text("x").build())), root);
        renderer.render(Some(tree(h("b").text("y").build())), root);
        assert_eq!(host.inner_html(root), "<div><b>y</b><i></i></div>");
    }

    #[test]
    fn full_prop_diff_sets_and_clears() {
        let (host, renderer, root) = setup();
        renderer.render(Some(h("a").prop("href", "/x").prop("title", "t").build()), root);
        host.clear_ops();
        renderer.render(Some(h("a").prop("href", "/y").build()), root);
        assert_eq!(host.inner_html(root), "<a href=\"/y\"></a>");
        assert_eq!(host.count(|op| matches!(op, crate::render::HostOp::PatchProp { .. })), 2);
    }

    #[test]
    fn flagged_props_only_touch_named_keys() {
        let (host, renderer, root) = setup();
        let node = |id: &str, title: &str| {
            open_block(false);
            h("div")
                .prop("id", id)
                .prop("title", title)
                .dynamic_props(["title"])
                .block()
        };
        renderer.render(Some(node("a", "one")), root);
        host.clear_ops();
        renderer.render(Some(node("b", "two")), root);
        // `id` is not declared dynamic, so it is left alone.
        assert_eq!(host.inner_html(root), "<div id=\"a\" title=\"two\"></div>");
    }

    #[test]
    fn keyed_prefix_and_suffix_are_patched_in_place() {
        let (host, renderer, root) = setup();
        renderer.render(Some(list(&["a", "b", "c"])), root);
        host.clear_ops();
        renderer.render(Some(list(&["a", "x", "c"])), root);
        assert_eq!(host.text_content(root), "axc");
        assert_eq!(host.removed().len(), 1);
        assert!(host.moved().is_empty());
    }

    #[test]
    fn unmount_removes_only_the_top_node() {
        let (host, renderer, root) = setup();
        renderer.render(Some(list(&["a", "b"])), root);
        host.clear_ops();
        renderer.render(None, root);
        assert_eq!(host.removed().len(), 1);
        assert_eq!(host.inner_html(root), "");
    }

    #[test]
    fn fragment_children_stay_between_anchors() {
        let (host, renderer, root) = setup();
        let frag = |keys: &[&str]| {
            h("div")
                .child(
                    VNode::fragment()
                        .children(keys.iter().map(|&k| h("i").key(k).text(k).build()))
                        .patch_flag(PatchFlags::KEYED_FRAGMENT)
                        .build(),
                )
                .child(h("b").text("end").build())
                .build()
        };
        renderer.render(Some(frag(&["a"])), root);
        renderer.render(Some(frag(&["b", "a"])), root);
        assert_eq!(host.text_content(root), "baend");
        renderer.render(Some(h("div").child(h("b").text("end").build()).build()), root);
        assert_eq!(host.inner_html(root), "<div><b>end</b></div>");
    }

    #[test]
    fn mount_selector_resolves_container() {
        let (host, renderer, root) = setup();
        let app = host.create_element("main");
        host.patch_prop(app, "id", None, Some(&"app".into()));
        host.insert(app, root, None);
        assert_eq!(renderer.mount_selector(h("p").text("hi").build(), "#app"), Some(app));
        assert_eq!(host.inner_html(app), "<p>hi</p>");
        assert_eq!(renderer.mount_selector(h("p").build(), "#nope"), None);
    }
}
