//! Block tracking.
//!
//! A block is a vnode that carries, next to its children, a flat list of
//! the descendants built with patch flags. While a block is open, every
//! flagged vnode (and every component vnode) that is built registers with
//! it, unless a nested block swallows it first. Patching a block then walks
//! that list pairwise instead of diffing the whole subtree.
//!
//! The pairwise walk is only valid when the region's structure cannot change
//! between renders. Conditional and list regions must open their own block:
//!
//! ```rust,ignore
//! open_block(false);
//! let title = h("h1").text(title).patch_flag(PatchFlags::TEXT).build();
//! let root = h("div").child(title).block();
//! ```

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::vnode::VNode;

thread_local! {
    static BLOCK_STACK: RefCell<Vec<Option<Vec<Rc<VNode>>>>> = const { RefCell::new(Vec::new()) };
    static BLOCK_TRACKING: Cell<i32> = const { Cell::new(1) };
}

/// Open a block. The next [`VNodeBuilder::block`](super::VNodeBuilder::block)
/// closes it.
///
/// With `disable_tracking`, descendants are not collected. This is what a
/// list fragment does, since its children are diffed by key instead.
pub fn open_block(disable_tracking: bool) {
    BLOCK_STACK.with(|stack| {
        stack
            .borrow_mut()
            .push(if disable_tracking { None } else { Some(Vec::new()) });
    });
}

/// Adjust the block tracking counter. Tracking is on while it is positive;
/// pass `-1` around content that must not be collected and `1` after.
pub fn set_block_tracking(delta: i32) {
    BLOCK_TRACKING.with(|tracking| tracking.set(tracking.get() + delta));
}

pub fn is_block_tracking() -> bool {
    BLOCK_TRACKING.with(Cell::get) > 0
}

/// Register a node with the innermost open block.
pub(crate) fn track_dynamic(node: &Rc<VNode>) {
    if !is_block_tracking() {
        return;
    }
    BLOCK_STACK.with(|stack| {
        if let Some(Some(current)) = stack.borrow_mut().last_mut() {
            current.push(node.clone());
        }
    });
}

/// Close the innermost block and return what it collected.
///
/// `None` when tracking is off. A block opened with tracking disabled
/// yields an empty list.
pub(crate) fn take_block() -> Option<Vec<Rc<VNode>>> {
    let collected = BLOCK_STACK.with(|stack| stack.borrow_mut().pop());
    let collected = match collected {
        Some(collected) => collected,
        None => {
            tracing::warn!("block built without a matching open_block");
            None
        }
    };
    is_block_tracking().then(|| collected.unwrap_or_default())
}

/// Restores the block stack and the tracking counter on drop.
///
/// Held across a render so a render that unwinds between `open_block` and
/// `block()` does not leave its block open for whatever is built next.
pub(crate) struct BlockScope {
    depth: usize,
    tracking: i32,
}

impl BlockScope {
    pub(crate) fn enter() -> Self {
        Self {
            depth: BLOCK_STACK.with(|stack| stack.borrow().len()),
            tracking: BLOCK_TRACKING.with(Cell::get),
        }
    }
}

impl Drop for BlockScope {
    fn drop(&mut self) {
        let dropped = BLOCK_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let open = stack.len().saturating_sub(self.depth);
            stack.truncate(self.depth);
            open
        });
        if dropped > 0 {
            tracing::warn!(blocks = dropped, "closing blocks left open by a render");
        }
        BLOCK_TRACKING.with(|tracking| tracking.set(self.tracking));
    }
}
