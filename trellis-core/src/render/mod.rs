//! Rendering
//!
//! This module turns vnode trees into host trees and keeps them in sync.
//!
//! # Concepts
//!
//! ## VNodes and Blocks
//!
//! A [`VNode`] describes one node for one render. A block is a vnode that
//! also lists its dynamic descendants (those built with [`PatchFlags`]), so
//! a re-render patches only those. See [`open_block`].
//!
//! ## Host
//!
//! The [`Host`] trait is the only way the renderer touches the materialized
//! tree. [`MemoryHost`] implements it in memory with an operation log.
//!
//! ## Components
//!
//! A [`Component`] renders a subtree inside its own render effect. When
//! state the render read changes, the effect queues a render job on the
//! scheduler; the job re-renders and patches the subtree.
//!
//! # Example
//!
//! ```rust,ignore
//! let host = Rc::new(MemoryHost::new());
//! let renderer = Renderer::new(host.clone());
//! let root = host.root();
//!
//! renderer.render(Some(h("ul").children(items).build()), root);
//! ```

mod block;
mod component;
mod flags;
mod host;
mod lis;
mod memory;
mod props;
mod renderer;
mod vnode;

pub use block::{is_block_tracking, open_block, set_block_tracking};
pub use component::{
    current_instance, on_before_mount, on_before_unmount, on_before_update, on_mounted, on_unmounted,
    on_updated, Component, ComponentBuilder, ComponentInstance, LifecycleHook, RenderContext, RenderFn,
    SetupContext, SetupResult,
};
pub use flags::PatchFlags;
pub use host::{Host, HostNode};
pub use lis::longest_increasing_subsequence;
pub use memory::{HostOp, MemoryHost};
pub use props::{PropDef, PropDefault, PropType};
pub use renderer::Renderer;
pub use vnode::{h, Children, Key, Props, SlotFn, Slots, VNode, VNodeBuilder, VNodeKind};
