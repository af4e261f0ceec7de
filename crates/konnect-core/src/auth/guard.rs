//! Shared in-memory flags coordinating sync and logout.
//!
//! One `SessionGuard` is shared by the cache manager, the sync manager and
//! the logout manager. It is never persisted; a fresh instance is
//! constructed per client core, which keeps the guard behavior testable
//! with independent instances on independent timelines.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct SessionGuard {
    logout_in_progress: AtomicBool,
    sync_in_progress: AtomicBool,
    /// Monotonic counter bumped when a logout begins. A cache write
    /// snapshots it before the store I/O and re-checks after: if the
    /// counter moved, a purge ran underneath the write and the write must
    /// be rolled back. Never reset, so a write that spans an entire
    /// logout still detects it.
    purge_generation: AtomicU64,
}

impl SessionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// First synchronous action of every logout: from this instant cache
    /// writes and sync starts refuse to proceed.
    pub fn begin_logout(&self) -> u64 {
        self.logout_in_progress.store(true, Ordering::SeqCst);
        self.purge_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Logout finished; a fresh login may begin.
    pub fn end_logout(&self) {
        self.logout_in_progress.store(false, Ordering::SeqCst);
    }

    pub fn is_logout_in_progress(&self) -> bool {
        self.logout_in_progress.load(Ordering::SeqCst)
    }

    pub fn purge_generation(&self) -> u64 {
        self.purge_generation.load(Ordering::SeqCst)
    }

    /// Claim the single sync slot. Returns false if a sync is already
    /// running (mutual exclusion, not a queue).
    pub fn try_begin_sync(&self) -> bool {
        self.sync_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn end_sync(&self) {
        self.sync_in_progress.store(false, Ordering::SeqCst);
    }

    pub fn is_sync_in_progress(&self) -> bool {
        self.sync_in_progress.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_slot_is_mutually_exclusive() {
        let guard = SessionGuard::new();
        assert!(guard.try_begin_sync());
        assert!(!guard.try_begin_sync());
        guard.end_sync();
        assert!(guard.try_begin_sync());
    }

    #[test]
    fn test_purge_generation_is_monotonic_across_logouts() {
        let guard = SessionGuard::new();
        let g1 = guard.begin_logout();
        guard.end_logout();
        let g2 = guard.begin_logout();
        assert!(g2 > g1);
        // end_logout clears the flag but never rewinds the generation
        guard.end_logout();
        assert_eq!(guard.purge_generation(), g2);
        assert!(!guard.is_logout_in_progress());
    }
}
