//! Components
//!
//! A [`Component`] is a definition: a props schema, an optional `setup`
//! function and an optional render function. Mounting a component vnode
//! creates a [`ComponentInstance`], which owns
//!
//! - the resolved props and the fallthrough attrs (shallow reactive, so the
//!   render re-runs when a prop it read changes),
//! - an [`EffectScope`] holding the render effect and everything `setup`
//!   created,
//! - the lifecycle hooks registered during `setup`,
//! - the rendered subtree.
//!
//! `setup` runs exactly once per instance, synchronously, with the instance
//! installed as the current instance. Lifecycle hooks can only be registered
//! while it runs.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use super::block::BlockScope;
use super::flags::PatchFlags;
use super::props::{resolve_props, PropDef};
use super::vnode::{Children, Props, Slots, VNode, VNodeKind};
use crate::error::{report, RuntimeError};
use crate::reactive::{untracked, Effect, EffectScope, Reactive, Value};
use crate::scheduler::{queue_job, queue_post_flush_cbs, Job};

/// Produces the subtree of a component.
pub type RenderFn = Rc<dyn Fn(&RenderContext<'_>) -> Rc<VNode>>;

type SetupFn = Rc<dyn Fn(&SetupContext<'_>) -> SetupResult>;

type HookFn = Rc<dyn Fn()>;

/// What `setup` hands back.
pub enum SetupResult {
    /// State exposed to the component's render function.
    State(Value),
    /// A render function, used instead of the component's own.
    Render(RenderFn),
}

impl SetupResult {
    pub fn state(state: impl Into<Value>) -> Self {
        SetupResult::State(state.into())
    }

    pub fn render<F>(render: F) -> Self
    where
        F: Fn(&RenderContext<'_>) -> Rc<VNode> + 'static,
    {
        SetupResult::Render(Rc::new(render))
    }
}

struct ComponentDef {
    name: Rc<str>,
    props: Vec<PropDef>,
    setup: Option<SetupFn>,
    render: Option<RenderFn>,
    inherit_attrs: bool,
}

/// A component definition. Cheap to clone; clones are the same component.
#[derive(Clone)]
pub struct Component {
    def: Rc<ComponentDef>,
}

impl Component {
    pub fn builder(name: impl Into<Rc<str>>) -> ComponentBuilder {
        ComponentBuilder {
            def: ComponentDef {
                name: name.into(),
                props: Vec::new(),
                setup: None,
                render: None,
                inherit_attrs: true,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn prop_defs(&self) -> &[PropDef] {
        &self.def.props
    }

    pub fn ptr_eq(&self, other: &Component) -> bool {
        Rc::ptr_eq(&self.def, &other.def)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.def.name)
            .field("props", &self.def.props)
            .finish()
    }
}

/// Builder for [`Component`].
#[must_use]
pub struct ComponentBuilder {
    def: ComponentDef,
}

impl ComponentBuilder {
    /// Declare a prop. A name declared twice is reported and the second
    /// declaration ignored.
    pub fn prop(mut self, prop: PropDef) -> Self {
        if self.def.props.iter().any(|p| p.name() == prop.name()) {
            report(RuntimeError::DuplicateProp {
                component: self.def.name.to_string(),
                prop: prop.name().to_string(),
            });
            return self;
        }
        self.def.props.push(prop);
        self
    }

    pub fn setup<F>(mut self, setup: F) -> Self
    where
        F: Fn(&SetupContext<'_>) -> SetupResult + 'static,
    {
        self.def.setup = Some(Rc::new(setup));
        self
    }

    pub fn render<F>(mut self, render: F) -> Self
    where
        F: Fn(&RenderContext<'_>) -> Rc<VNode> + 'static,
    {
        self.def.render = Some(Rc::new(render));
        self
    }

    /// Whether undeclared props fall through onto the root node. On by
    /// default.
    pub fn inherit_attrs(mut self, inherit: bool) -> Self {
        self.def.inherit_attrs = inherit;
        self
    }

    pub fn build(self) -> Component {
        Component {
            def: Rc::new(self.def),
        }
    }
}

/// Lifecycle points a hook can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleHook {
    BeforeMount,
    Mounted,
    BeforeUpdate,
    Updated,
    BeforeUnmount,
    Unmounted,
}

impl LifecycleHook {
    const COUNT: usize = 6;

    fn index(self) -> usize {
        self as usize
    }

    fn register_fn(self) -> &'static str {
        match self {
            LifecycleHook::BeforeMount => "on_before_mount",
            LifecycleHook::Mounted => "on_mounted",
            LifecycleHook::BeforeUpdate => "on_before_update",
            LifecycleHook::Updated => "on_updated",
            LifecycleHook::BeforeUnmount => "on_before_unmount",
            LifecycleHook::Unmounted => "on_unmounted",
        }
    }
}

static NEXT_UID: AtomicU64 = AtomicU64::new(0);

/// A mounted component.
pub struct ComponentInstance {
    uid: u64,
    component: Component,
    /// The vnode currently representing this instance in its parent tree.
    pub(crate) vnode: RefCell<Weak<VNode>>,
    /// Set by a parent update before the render job runs.
    pub(crate) next: RefCell<Option<Rc<VNode>>>,
    pub(crate) sub_tree: RefCell<Option<Rc<VNode>>>,
    props: Reactive,
    props_view: Reactive,
    attrs: Reactive,
    attrs_view: Reactive,
    slots: RefCell<Slots>,
    state: RefCell<Value>,
    render: RefCell<Option<RenderFn>>,
    pub(crate) scope: EffectScope,
    pub(crate) effect: RefCell<Option<Effect>>,
    pub(crate) job: RefCell<Option<Job>>,
    hooks: RefCell<[Vec<HookFn>; LifecycleHook::COUNT]>,
    pub(crate) is_mounted: Cell<bool>,
    pub(crate) is_unmounted: Cell<bool>,
}

thread_local! {
    static CURRENT_INSTANCE: RefCell<Option<Rc<ComponentInstance>>> = const { RefCell::new(None) };
}

/// The instance whose `setup` is running, if any.
pub fn current_instance() -> Option<Rc<ComponentInstance>> {
    CURRENT_INSTANCE.with(|current| current.borrow().clone())
}

struct CurrentInstanceReset(Option<Rc<ComponentInstance>>);

impl Drop for CurrentInstanceReset {
    fn drop(&mut self) {
        let previous = self.0.take();
        CURRENT_INSTANCE.with(|current| *current.borrow_mut() = previous);
    }
}

fn set_current_instance(instance: &Rc<ComponentInstance>) -> CurrentInstanceReset {
    let previous = CURRENT_INSTANCE.with(|current| current.borrow_mut().replace(instance.clone()));
    CurrentInstanceReset(previous)
}

impl ComponentInstance {
    /// Create the instance for a component vnode and resolve its props.
    pub(crate) fn new(vnode: &Rc<VNode>, component: &Component) -> Rc<Self> {
        let resolved = resolve_props(component.name(), component.prop_defs(), vnode.props());
        let props = Reactive::new_shallow_object(resolved.props);
        let attrs = Reactive::new_shallow_object(resolved.attrs);
        let slots = vnode.children().slots().cloned().unwrap_or_default();
        Rc::new(Self {
            uid: NEXT_UID.fetch_add(1, Ordering::Relaxed),
            component: component.clone(),
            vnode: RefCell::new(Rc::downgrade(vnode)),
            next: RefCell::new(None),
            sub_tree: RefCell::new(None),
            props_view: props.as_readonly(),
            props,
            attrs_view: attrs.as_readonly(),
            attrs,
            slots: RefCell::new(slots),
            state: RefCell::new(Value::Null),
            render: RefCell::new(None),
            scope: EffectScope::detached(),
            effect: RefCell::new(None),
            job: RefCell::new(None),
            hooks: RefCell::new(Default::default()),
            is_mounted: Cell::new(false),
            is_unmounted: Cell::new(false),
        })
    }

    /// Run `setup` once and settle on a render function.
    pub(crate) fn setup(self: &Rc<Self>) {
        let def = &self.component.def;
        if let Some(setup) = def.setup.clone() {
            let _current = set_current_instance(self);
            let result = self.scope.run(|| untracked(|| setup(&SetupContext { instance: self })));
            match result {
                Some(SetupResult::State(state)) => *self.state.borrow_mut() = state,
                Some(SetupResult::Render(render)) => *self.render.borrow_mut() = Some(render),
                None => {}
            }
        }
        if self.render.borrow().is_none() {
            match def.render.clone() {
                Some(render) => *self.render.borrow_mut() = Some(render),
                None => report(RuntimeError::MissingRender {
                    component: def.name.to_string(),
                }),
            }
        }
    }

    /// Render the subtree, with fallthrough attrs merged onto its root.
    pub(crate) fn render_root(&self) -> Rc<VNode> {
        let render = self.render.borrow().clone();
        let tree = match render {
            Some(render) => {
                let _blocks = BlockScope::enter();
                render(&RenderContext { instance: self })
            }
            None => VNode::comment(""),
        };
        if !self.component.def.inherit_attrs {
            return tree;
        }
        let attrs: Props = self
            .attrs
            .entries()
            .into_iter()
            .filter_map(|(key, value)| Some((key.as_str()?.into(), value)))
            .collect();
        if attrs.is_empty() {
            return tree;
        }
        match tree.kind() {
            VNodeKind::Element(_) | VNodeKind::Component(_) => tree.with_merged_props(&attrs),
            _ => {
                tracing::warn!(
                    component = self.name(),
                    "extraneous attrs could not fall through: root is not a single element"
                );
                tree
            }
        }
    }

    /// Apply the props of a new vnode. Only changed values trigger.
    pub(crate) fn update_props(&self, raw: &Props) {
        let resolved = resolve_props(self.name(), self.component.prop_defs(), raw);
        untracked(|| {
            for (key, value) in resolved.props {
                self.props.set(key, value);
            }
            for key in self.attrs.keys() {
                let declared = key.as_str().is_some_and(|k| resolved.attrs.contains_key(k));
                if !declared {
                    self.attrs.delete(key);
                }
            }
            for (key, value) in resolved.attrs {
                self.attrs.set(key, value);
            }
        });
    }

    pub(crate) fn update_slots(&self, children: &Children) {
        *self.slots.borrow_mut() = children.slots().cloned().unwrap_or_default();
    }

    /// Let the render effect and its job re-trigger themselves.
    pub(crate) fn toggle_recurse(&self, allow: bool) {
        if let Some(effect) = self.effect.borrow().as_ref() {
            effect.set_allow_recurse(allow);
        }
        if let Some(job) = self.job.borrow().as_ref() {
            job.set_allow_recurse(allow);
        }
    }

    fn hooks(&self, hook: LifecycleHook) -> Vec<HookFn> {
        self.hooks.borrow()[hook.index()].clone()
    }

    /// Run hooks now, untracked.
    pub(crate) fn call_hooks(&self, hook: LifecycleHook) {
        for f in self.hooks(hook) {
            untracked(|| f());
        }
    }

    /// Run hooks in the post phase.
    pub(crate) fn queue_hooks(&self, hook: LifecycleHook) {
        let hooks = self.hooks(hook);
        if hooks.is_empty() {
            return;
        }
        queue_post_flush_cbs(
            hooks
                .into_iter()
                .map(|f| Job::new(move || untracked(|| f()))),
        );
    }

    fn inject_hook(&self, hook: LifecycleHook, f: HookFn) {
        self.hooks.borrow_mut()[hook.index()].push(f);
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn name(&self) -> &str {
        self.component.name()
    }

    pub fn component(&self) -> &Component {
        &self.component
    }

    /// Resolved props, read-only. Reads inside a computation track.
    pub fn props(&self) -> &Reactive {
        &self.props_view
    }

    /// Passed props that were not declared, read-only.
    pub fn attrs(&self) -> &Reactive {
        &self.attrs_view
    }

    pub fn state(&self) -> Value {
        self.state.borrow().clone()
    }

    pub fn sub_tree(&self) -> Option<Rc<VNode>> {
        self.sub_tree.borrow().clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.is_mounted.get()
    }

    pub fn is_unmounted(&self) -> bool {
        self.is_unmounted.get()
    }

    /// How many times the component has rendered.
    pub fn render_count(&self) -> usize {
        self.effect.borrow().as_ref().map_or(0, Effect::run_count)
    }

    /// Queue a re-render regardless of what changed.
    pub fn force_update(&self) {
        let job = self.job.borrow().clone();
        if let Some(job) = job {
            queue_job(job);
        }
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("uid", &self.uid)
            .field("name", &self.name())
            .field("is_mounted", &self.is_mounted.get())
            .field("is_unmounted", &self.is_unmounted.get())
            .finish()
    }
}

/// What `setup` can see.
pub struct SetupContext<'a> {
    instance: &'a ComponentInstance,
}

impl SetupContext<'_> {
    pub fn props(&self) -> &Reactive {
        self.instance.props()
    }

    pub fn prop(&self, name: &str) -> Value {
        self.instance.props().get(name)
    }

    pub fn attrs(&self) -> &Reactive {
        self.instance.attrs()
    }

    pub fn slots(&self) -> Slots {
        self.instance.slots.borrow().clone()
    }
}

/// What a render function can see.
pub struct RenderContext<'a> {
    instance: &'a ComponentInstance,
}

impl RenderContext<'_> {
    pub fn props(&self) -> &Reactive {
        self.instance.props()
    }

    /// Read one prop, tracked.
    pub fn prop(&self, name: &str) -> Value {
        self.instance.props().get(name)
    }

    pub fn attrs(&self) -> &Reactive {
        self.instance.attrs()
    }

    /// State returned by `setup`.
    pub fn state(&self) -> Value {
        self.instance.state()
    }

    /// Render a slot passed by the parent.
    pub fn slot(&self, name: &str) -> Vec<Rc<VNode>> {
        let slot = self.instance.slots.borrow().get(name);
        slot.map(|slot| slot()).unwrap_or_default()
    }
}

/// Whether a parent re-render must re-render the child.
///
/// In optimized mode the patch flags are trusted: a node without prop or
/// slot flags is static. Otherwise non-stable slots always update, and
/// props are compared shallowly.
pub(crate) fn should_update_component(prev: &VNode, next: &VNode, optimized: bool) -> bool {
    let flag = next.patch_flag();
    if optimized && !flag.contains(PatchFlags::BAIL) {
        if flag.contains(PatchFlags::DYNAMIC_SLOTS) {
            return true;
        }
        if flag.contains(PatchFlags::FULL_PROPS) {
            return has_props_changed(prev.props(), next.props());
        }
        if flag.contains(PatchFlags::PROPS) {
            return next
                .dynamic_props()
                .iter()
                .any(|key| next.prop(key) != prev.prop(key));
        }
        return false;
    }

    let prev_slots = prev.children().slots();
    let next_slots = next.children().slots();
    if (prev_slots.is_some() || next_slots.is_some()) && !next_slots.is_some_and(Slots::is_stable) {
        return true;
    }
    has_props_changed(prev.props(), next.props())
}

/// Shallow prop comparison: a different count, or any new key whose value
/// differs from the old one.
pub(crate) fn has_props_changed(prev: &Props, next: &Props) -> bool {
    if next.len() != prev.len() {
        return true;
    }
    next.iter().any(|(key, value)| prev.get(key) != Some(value))
}

fn inject(hook: LifecycleHook, f: HookFn) {
    match current_instance() {
        Some(instance) => instance.inject_hook(hook, f),
        None => report(RuntimeError::HookOutsideSetup {
            hook: hook.register_fn(),
        }),
    }
}

/// Run `f` right before the first render.
pub fn on_before_mount(f: impl Fn() + 'static) {
    inject(LifecycleHook::BeforeMount, Rc::new(f));
}

/// Run `f` after the first render is in the tree, in the post phase.
pub fn on_mounted(f: impl Fn() + 'static) {
    inject(LifecycleHook::Mounted, Rc::new(f));
}

/// Run `f` right before each re-render.
pub fn on_before_update(f: impl Fn() + 'static) {
    inject(LifecycleHook::BeforeUpdate, Rc::new(f));
}

/// Run `f` after each re-render, in the post phase.
pub fn on_updated(f: impl Fn() + 'static) {
    inject(LifecycleHook::Updated, Rc::new(f));
}

/// Run `f` right before the component is torn down.
pub fn on_before_unmount(f: impl Fn() + 'static) {
    inject(LifecycleHook::BeforeUnmount, Rc::new(f));
}

/// Run `f` after the component is gone, in the post phase.
pub fn on_unmounted(f: impl Fn() + 'static) {
    inject(LifecycleHook::Unmounted, Rc::new(f));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{clear_report_handler, set_report_handler};
    use crate::render::{h, PropType};

    #[test]
    fn duplicate_prop_declaration_is_reported() {
        let reports = Rc::new(Cell::new(0));
        let sink = reports.clone();
        set_report_handler(move |err| {
            if matches!(err, RuntimeError::DuplicateProp { .. }) {
                sink.set(sink.get() + 1);
            }
        });
        let component = Component::builder("Dup")
            .prop(PropDef::new("a").of(PropType::String))
            .prop(PropDef::new("a").of(PropType::Number))
            .build();
        clear_report_handler();
        assert_eq!(reports.get(), 1);
        assert_eq!(component.prop_defs().len(), 1);
    }

    #[test]
    fn hooks_outside_setup_are_reported() {
        let reported = Rc::new(RefCell::new(None));
        let sink = reported.clone();
        set_report_handler(move |err| {
            if let RuntimeError::HookOutsideSetup { hook } = err {
                *sink.borrow_mut() = Some(*hook);
            }
        });
        on_mounted(|| {});
        clear_report_handler();
        assert_eq!(*reported.borrow(), Some("on_mounted"));
    }

    #[test]
    fn setup_registers_hooks_and_sees_props() {
        let seen = Rc::new(RefCell::new(Value::Null));
        let sink = seen.clone();
        let component = Component::builder("Greeting")
            .prop(PropDef::new("name").of(PropType::String))
            .setup(move |ctx| {
                *sink.borrow_mut() = ctx.prop("name");
                assert!(current_instance().is_some());
                on_mounted(|| {});
                SetupResult::render(|ctx| h("p").text(ctx.prop("name").to_string()).build())
            })
            .build();
        let vnode = VNode::component(&component).prop("name", "Ada").build();
        let instance = ComponentInstance::new(&vnode, &component);
        instance.setup();

        assert!(current_instance().is_none());
        assert_eq!(*seen.borrow(), Value::from("Ada"));
        assert_eq!(instance.hooks(LifecycleHook::Mounted).len(), 1);
        let tree = instance.render_root();
        assert_eq!(tree.children().text().map(|t| t.to_string()), Some("Ada".to_string()));
    }

    #[test]
    fn props_change_compares_old_count_with_new_count() {
        let one: Props = [(Rc::from("a"), Value::from(1))].into_iter().collect();
        let two: Props = [(Rc::from("a"), Value::from(1)), (Rc::from("b"), Value::from(2))]
            .into_iter()
            .collect();
        assert!(has_props_changed(&one, &two));
        assert!(has_props_changed(&two, &one));
        assert!(!has_props_changed(&one, &one.clone()));
        let nan: Props = [(Rc::from("a"), Value::from(f64::NAN))].into_iter().collect();
        assert!(!has_props_changed(&nan, &nan.clone()));
    }

    #[test]
    fn should_update_honors_flags_and_slots() {
        let component = Component::builder("Leaf").render(|_| h("i").build()).build();
        let node = |n: i32| VNode::component(&component).prop("n", n).build();
        assert!(should_update_component(&node(1), &node(2), false));
        assert!(!should_update_component(&node(1), &node(1), false));
        // Optimized without prop flags: static.
        assert!(!should_update_component(&node(1), &node(2), true));

        let flagged = |n: i32| {
            VNode::component(&component)
                .prop("n", n)
                .dynamic_props(["n"])
                .build()
        };
        assert!(should_update_component(&flagged(1), &flagged(2), true));
        assert!(!should_update_component(&flagged(1), &flagged(1), true));

        let slotted = |stable: bool| {
            let slots = Slots::new().with("default", Vec::new);
            let slots = if stable { slots.stable() } else { slots };
            VNode::component(&component).slots(slots).build()
        };
        assert!(should_update_component(&slotted(false), &slotted(false), false));
        assert!(!should_update_component(&slotted(true), &slotted(true), false));
    }

    #[test]
    fn attrs_fall_through_to_root_element() {
        let component = Component::builder("Button")
            .render(|_| h("button").class("btn").build())
            .build();
        let vnode = VNode::component(&component)
            .prop("class", "primary")
            .prop("id", "ok")
            .build();
        let instance = ComponentInstance::new(&vnode, &component);
        instance.setup();
        let tree = instance.render_root();
        assert_eq!(tree.prop("class"), Some(&Value::from("btn primary")));
        assert_eq!(tree.prop("id"), Some(&Value::from("ok")));
    }
}
