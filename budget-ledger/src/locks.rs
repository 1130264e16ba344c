//! Per-scope write serialisation.
//!
//! A scope is the set of children of one node (or of the tree root) together
//! with the progress entries of that node. Every read-check-write sequence
//! holds the lock of the scope it validates against. Locks are always taken
//! from ancestor to descendant, never the other way.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// Identifies a lock scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    /// Level-1 nodes, which have no parent
    Root,
    /// Children and entries of one node
    Node(String),
}

impl ScopeKey {
    /// Scope a node with this parent is validated in.
    pub fn parent_of(parent_id: Option<&str>) -> Self {
        match parent_id {
            Some(id) => Self::Node(id.to_string()),
            None => Self::Root,
        }
    }

    pub fn node(id: impl Into<String>) -> Self {
        Self::Node(id.into())
    }
}

/// Table of scope mutexes, created on first use.
#[derive(Default)]
pub struct ScopeLocks {
    locks: DashMap<ScopeKey, Arc<Mutex<()>>>,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a scope.
    ///
    /// The scope's mutex is evicted from the table when the returned guard
    /// is dropped and nobody else is holding or waiting on it.
    pub async fn acquire(&self, key: ScopeKey) -> ScopeGuard<'_> {
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        trace!(scope = ?key, "Acquiring scope lock");
        let guard = lock.lock_owned().await;
        ScopeGuard {
            locks: self,
            key,
            guard: Some(guard),
        }
    }

    /// Drop the mutex of a scope nobody is holding or waiting on.
    pub fn retire(&self, key: &ScopeKey) {
        self.locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Number of scopes with a mutex allocated.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive access to one scope, released on drop.
pub struct ScopeGuard<'a> {
    locks: &'a ScopeLocks,
    key: ScopeKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ScopeGuard<'_> {
    pub fn key(&self) -> &ScopeKey {
        &self.key
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        // Release before retiring so the table's reference is the last one.
        self.guard.take();
        self.locks.retire(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_scope_is_exclusive() {
        let locks = Arc::new(ScopeLocks::new());
        let guard = locks.acquire(ScopeKey::node("p")).await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(ScopeKey::node("p")).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_scopes_do_not_block() {
        let locks = ScopeLocks::new();
        let _a = locks.acquire(ScopeKey::node("a")).await;
        let _b = locks.acquire(ScopeKey::node("b")).await;
        let _root = locks.acquire(ScopeKey::Root).await;
        assert_eq!(locks.len(), 3);
    }

    #[tokio::test]
    async fn test_retire_skips_held_scope() {
        let locks = ScopeLocks::new();
        let guard = locks.acquire(ScopeKey::node("a")).await;
        locks.retire(&ScopeKey::node("a"));
        assert_eq!(locks.len(), 1);
        assert_eq!(guard.key(), &ScopeKey::node("a"));

        drop(guard);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_waiter_keeps_scope_alive() {
        let locks = Arc::new(ScopeLocks::new());
        let guard = locks.acquire(ScopeKey::node("p")).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(ScopeKey::node("p")).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(guard);
        assert!(locks.len() <= 1);
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}
