//! Synchronization primitives.

mod spinlock;

pub use spinlock::{SpinLock, SpinLockGuard};
