//! Nodes of the decomposition tree.
//!
//! A [`TaskNode`] is created for the root by the driver and for every child
//! by the fork stage. Children refer to their parent through a [`NodePtr`],
//! a non-owning handle: a parent never points at its children, and a child
//! never keeps its parent alive. What keeps a parent alive is its pending
//! counter. A parent is only released by its own join stage, which cannot
//! run until every child has made its final access through
//! [`TaskNode::absorb`].
//!
//! # Lifecycle
//!
//! ```text
//! CREATED ─┬─ expect_children(2) ─ WAITING_CHILDREN ─ absorb × 2 ─ JOINED ─┬─ FINISHED
//!          └─ set_result ───────── BASE_COMPUTED ──────────────────────────┘
//! ```

use std::ptr::NonNull;

use crate::sync::{AtomicU64, AtomicUsize, Ordering};

/// One node of the decomposition tree.
pub struct TaskNode {
    /// The problem size for this node.
    n: u32,
    /// Accumulates the node's value. Written once by a base case, otherwise
    /// only by atomic addition from the children.
    result: AtomicU64,
    /// Number of children that have not joined yet. Stored once when the node
    /// forks and only decremented afterwards.
    pending: AtomicUsize,
    /// The node that forked this one, or `None` for the root.
    parent: Option<NodePtr>,
}

impl TaskNode {
    /// Creates the root of a tree.
    pub fn root(n: u32) -> TaskNode {
        TaskNode {
            n,
            result: AtomicU64::new(0),
            pending: AtomicUsize::new(0),
            parent: None,
        }
    }

    /// Creates a child of `parent`.
    pub fn child(n: u32, parent: NodePtr) -> TaskNode {
        TaskNode {
            parent: Some(parent),
            ..TaskNode::root(n)
        }
    }

    #[inline]
    pub fn n(&self) -> u32 {
        self.n
    }

    #[inline]
    pub fn parent(&self) -> Option<NodePtr> {
        self.parent
    }

    /// The node's value. Only final once the node's join stage has started.
    #[inline]
    pub fn result(&self) -> u64 {
        self.result.load(Ordering::Acquire)
    }

    /// Stores the value of a base case.
    #[inline]
    pub fn set_result(&self, value: u64) {
        self.result.store(value, Ordering::Release);
    }

    /// The number of children that have not joined yet.
    #[inline]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Records how many children this node is about to fork.
    ///
    /// This must happen before any of the children is submitted, otherwise a
    /// fast child could decrement the counter before it is set.
    #[inline]
    pub fn expect_children(&self, count: usize) {
        debug_assert_eq!(self.pending(), 0, "a node can only fork once");
        self.pending.store(count, Ordering::Release);
    }

    /// Folds a finished child's value into this node and marks the child as
    /// joined.
    ///
    /// Returns `true` for exactly one caller: the one whose decrement takes
    /// the pending count to zero. That caller has observed every sibling's
    /// addition and is responsible for continuing with this node's join
    /// stage. A child must not touch this node after the call returns.
    #[inline]
    pub fn absorb(&self, value: u64) -> bool {
        self.result.fetch_add(value, Ordering::AcqRel);
        let remaining = self.pending.fetch_sub(1, Ordering::AcqRel);
        debug_assert_ne!(remaining, 0, "more children joined than were forked");
        remaining == 1
    }
}

// -----------------------------------------------------------------------------
// Node pointer

/// A non-owning handle to a heap-allocated [`TaskNode`].
///
/// Copying the handle does not copy or retain the node. Whoever allocates a
/// node must release it exactly once, after which every copy of the handle
/// dangles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodePtr(NonNull<TaskNode>);

// SAFETY: `TaskNode` is `Sync` (its mutable state is atomic) and the handle is
// only dereferenced while the node is alive, per the contract of `as_ref`.
unsafe impl Send for NodePtr {}

// SAFETY: See above.
unsafe impl Sync for NodePtr {}

impl NodePtr {
    /// Moves a node to the heap and returns a handle to it.
    pub fn allocate(node: TaskNode) -> NodePtr {
        NodePtr(NonNull::from(Box::leak(Box::new(node))))
    }

    /// Borrows the node.
    ///
    /// # Safety
    ///
    /// The node must not have been released, and must not be released while
    /// the returned reference is in use.
    #[inline]
    pub unsafe fn as_ref<'a>(self) -> &'a TaskNode {
        unsafe { self.0.as_ref() }
    }

    /// Frees the node and returns it by value.
    ///
    /// # Safety
    ///
    /// The handle must have come from [`NodePtr::allocate`], must not have
    /// been released already, and no other thread may access the node
    /// during or after this call.
    #[inline]
    pub unsafe fn release(self) -> TaskNode {
        unsafe { *Box::from_raw(self.0.as_ptr()) }
    }
}
