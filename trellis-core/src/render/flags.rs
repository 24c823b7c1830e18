//! Compiler hints carried on vnodes.

use bitflags::bitflags;

bitflags! {
    /// What may differ between two renders of a node.
    ///
    /// A non-empty flag set (without [`BAIL`](Self::BAIL)) lets the patcher
    /// touch only the listed parts. An empty set means "no hints": the node
    /// is diffed in full unless it sits in a block that skips it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PatchFlags: u32 {
        /// Text children are dynamic.
        const TEXT = 1 << 0;
        /// The `class` prop is dynamic.
        const CLASS = 1 << 1;
        /// The `style` prop is dynamic.
        const STYLE = 1 << 2;
        /// The props named in `dynamic_props` are dynamic.
        const PROPS = 1 << 3;
        /// Prop keys themselves are dynamic: diff every prop.
        const FULL_PROPS = 1 << 4;
        /// A fragment whose children never change order.
        const STABLE_FRAGMENT = 1 << 6;
        /// A fragment with keyed children.
        const KEYED_FRAGMENT = 1 << 7;
        /// A fragment with unkeyed children.
        const UNKEYED_FRAGMENT = 1 << 8;
        /// Needs patching for reasons other than props or text.
        const NEED_PATCH = 1 << 9;
        /// A component whose slots are dynamic.
        const DYNAMIC_SLOTS = 1 << 10;
        /// Ignore every hint and do a full diff.
        const BAIL = 1 << 31;
    }
}

impl PatchFlags {
    /// Whether the hints may be trusted for a targeted patch.
    pub fn is_optimizable(self) -> bool {
        !self.is_empty() && !self.contains(Self::BAIL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bail_disables_hints() {
        assert!(PatchFlags::TEXT.is_optimizable());
        assert!(!PatchFlags::empty().is_optimizable());
        assert!(!(PatchFlags::TEXT | PatchFlags::BAIL).is_optimizable());
    }
}
