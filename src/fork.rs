//! The fork stage: turns a node into either a base-case value or two
//! children.

use std::sync::Arc;

use crate::{
    join::join,
    node::{NodePtr, TaskNode},
    run::{RunContext, Stage},
};

/// Computes fibonacci(n) iteratively, with fibonacci(0) = 0 and
/// fibonacci(1) = 1.
///
/// Overflows for `n > 93`.
pub fn fib_serial(n: u32) -> u64 {
    if n < 2 {
        return u64::from(n);
    }
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 2..=n {
        (a, b) = (b, a + b);
    }
    b
}

/// Decomposes `node`.
///
/// A node at or below the cutoff is computed serially and joined right away.
/// Otherwise the node gets children `n - 1` and `n - 2`: the first is offered
/// to the governor, the second runs here.
///
/// `node` must be alive and not yet forked. It is not touched again once its
/// children have been submitted, since the last child to join may release it
/// on another thread at any point after that.
pub(crate) fn fork(cx: &Arc<RunContext>, node: NodePtr) {
    // SAFETY: The node cannot be released before its join stage, which cannot
    // start before we either join it ourselves or submit its children.
    let this = unsafe { node.as_ref() };
    let n = this.n();

    if n <= cx.serial_cutoff {
        this.set_result(fib_serial(n));
        join(cx, node);
        return;
    }

    let left = NodePtr::allocate(TaskNode::child(n - 1, node));
    let right = NodePtr::allocate(TaskNode::child(n - 2, node));
    cx.record_children(2);

    // The counter has to be in place before either child can finish.
    this.expect_children(2);

    if !cx.offload(Stage::Fork, left) {
        fork(cx, left);
    }
    fork(cx, right);
}
