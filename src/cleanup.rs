//! Cleanup coordinator for the confirm phase.
//!
//! Every workspace a confirm call touches is recorded in a [`CleanupGuard`]
//! before any work starts on it. [`CleanupGuard::finish`] destroys them all;
//! if the confirm future is dropped or a task panics first, `Drop` does the
//! same. Ids that never resolved are destroyed too, which the store treats as
//! a no-op.

use crate::workspace::{WorkspaceId, WorkspaceStore};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Destroys every recorded workspace exactly once.
#[derive(Debug)]
pub struct CleanupGuard {
    store: Arc<WorkspaceStore>,
    touched: HashSet<WorkspaceId>,
    done: bool,
}

impl CleanupGuard {
    pub fn new(store: Arc<WorkspaceStore>) -> Self {
        Self {
            store,
            touched: HashSet::new(),
            done: false,
        }
    }

    /// Record `id` for destruction. Recording twice is harmless.
    pub fn track(&mut self, id: WorkspaceId) {
        self.touched.insert(id);
    }

    /// Number of distinct ids recorded.
    pub fn len(&self) -> usize {
        self.touched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.touched.is_empty()
    }

    /// Destroy every recorded workspace. Returns how many were still live.
    pub fn finish(mut self) -> usize {
        self.run()
    }

    fn run(&mut self) -> usize {
        if self.done {
            return 0;
        }
        self.done = true;

        let removed = self
            .touched
            .iter()
            .filter(|id| self.store.destroy(id))
            .count();
        debug!(
            "Cleanup: {} workspace(s) touched, {} destroyed",
            self.touched.len(),
            removed
        );
        removed
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.done {
            warn!(
                "Cleanup guard dropped before finish; destroying {} workspace(s)",
                self.touched.len()
            );
            self.run();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, Arc<WorkspaceStore>) {
        let base = tempfile::tempdir().unwrap();
        let store = Arc::new(WorkspaceStore::new(Some(base.path())).unwrap());
        (base, store)
    }

    #[test]
    fn finish_destroys_every_tracked_workspace() {
        let (_base, store) = store();
        let a = store.allocate(150).unwrap();
        let b = store.allocate(150).unwrap();
        let untouched = store.allocate(150).unwrap();

        let mut guard = CleanupGuard::new(Arc::clone(&store));
        guard.track(a.id());
        guard.track(b.id());
        guard.track(a.id());
        assert_eq!(guard.len(), 2);

        assert_eq!(guard.finish(), 2);
        assert!(store.resolve(&a.id()).is_none());
        assert!(store.resolve(&b.id()).is_none());
        assert!(store.resolve(&untouched.id()).is_some());
    }

    #[test]
    fn drop_without_finish_still_cleans_up() {
        let (_base, store) = store();
        let ws = store.allocate(150).unwrap();
        let root = ws.root().to_path_buf();
        {
            let mut guard = CleanupGuard::new(Arc::clone(&store));
            guard.track(ws.id());
        }
        assert!(store.resolve(&ws.id()).is_none());
        assert!(!root.exists());
    }

    #[test]
    fn already_destroyed_ids_are_harmless() {
        let (_base, store) = store();
        let ws = store.allocate(150).unwrap();
        store.destroy(&ws.id());

        let mut guard = CleanupGuard::new(Arc::clone(&store));
        guard.track(ws.id());
        assert_eq!(guard.finish(), 0);
    }
}
