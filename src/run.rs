use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crossbeam_utils::CachePadded;

use crate::{fork::fork, governor::Governor, join::join, latch::LockLatch, node::NodePtr};

/// State shared by every stage of a single run.
pub(crate) struct RunContext {
    pub(crate) governor: Arc<Governor>,
    /// Problem sizes at or below this are base cases.
    pub(crate) serial_cutoff: u32,
    /// Opened by the root's join stage.
    pub(crate) completed: LockLatch,
    /// Number of child nodes created by the fork stage.
    nodes: CachePadded<AtomicUsize>,
}

/// The two stages a node can be submitted for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Stage {
    Fork,
    Join,
}

impl RunContext {
    pub(crate) fn new(governor: Arc<Governor>, serial_cutoff: u32) -> RunContext {
        RunContext {
            governor,
            serial_cutoff,
            completed: LockLatch::new(),
            nodes: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Runs `stage` for `node` on a new execution context if the governor
    /// admits one. Returns `false` when the caller has to run it inline.
    ///
    /// The context is only cloned when a new execution context is actually
    /// started.
    #[inline]
    pub(crate) fn offload(self: &Arc<Self>, stage: Stage, node: NodePtr) -> bool {
        self.governor.try_submit(|| {
            let cx = Arc::clone(self);
            Some(move || match stage {
                Stage::Fork => fork(&cx, node),
                Stage::Join => join(&cx, node),
            })
        })
    }

    #[inline]
    pub(crate) fn record_children(&self, count: usize) {
        self.nodes.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn nodes_created(&self) -> usize {
        self.nodes.load(Ordering::Relaxed)
    }
}
