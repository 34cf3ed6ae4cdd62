// Atomics used by task nodes. Under the `loom` feature these are swapped for
// loom's model-checked versions so the join protocol can be explored
// exhaustively.

#[cfg(feature = "loom")]
pub(crate) use loom::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[cfg(not(feature = "loom"))]
pub(crate) use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
