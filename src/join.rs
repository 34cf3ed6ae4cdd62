//! The join stage: folds a finished node into its parent and continues with
//! the parent once its last child has joined.

use std::sync::Arc;

use crate::{
    latch::Latch,
    node::NodePtr,
    run::{RunContext, Stage},
};

/// Propagates the value of a finished node towards the root.
///
/// The node is released before its value is added to the parent. If that
/// addition is the parent's last pending join, the parent's own join stage is
/// offered to the governor; when it is refused, the loop simply moves up to
/// the parent instead of recursing, so a long chain of inline joins runs in
/// constant stack space.
///
/// When the root is reached the run's completion latch is opened. The root
/// itself is released by the driver.
pub(crate) fn join(cx: &Arc<RunContext>, mut node: NodePtr) {
    loop {
        // SAFETY: The node's value is final and nobody else accesses it: its
        // children (if any) have all joined and it has not joined yet.
        let this = unsafe { node.as_ref() };
        let Some(parent) = this.parent() else {
            // SAFETY: `cx` keeps the latch alive for the duration of the call.
            unsafe { Latch::set(&cx.completed) };
            return;
        };
        let value = this.result();

        // SAFETY: Non-root nodes are allocated by the fork stage and
        // released exactly once, here.
        drop(unsafe { node.release() });

        // SAFETY: The parent stays alive until its pending count reaches
        // zero, which cannot happen before this call.
        let parent_ready = unsafe { parent.as_ref() }.absorb(value);
        if !parent_ready || cx.offload(Stage::Join, parent) {
            return;
        }
        node = parent;
    }
}
