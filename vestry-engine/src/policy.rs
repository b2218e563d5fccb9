//! Consent policies and their aggregator.
//!
//! Policies are pure consent/observer capabilities: they may veto an
//! attach or detach and they are told about realized outfit changes, but
//! they never mutate COF state themselves. The aggregator composes any
//! number of them into one unanimous-AND gate plus a fan-out notifier.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use vestry_types::{InventoryEntry, ItemId};

/// A pluggable consent policy.
#[async_trait]
pub trait WearPolicy: Send + Sync {
    /// Whether `item` (already resolved to its real entry) may be worn.
    async fn can_attach(&self, item: &InventoryEntry) -> bool;

    /// Whether `item` may be taken off.
    async fn can_detach(&self, item: &InventoryEntry) -> bool;

    /// Called after a change has been applied, with the real identities
    /// that were added to and removed from the outfit.
    async fn on_outfit_change(&self, added: &[ItemId], removed: &[ItemId]);
}

/// A policy that consents to everything and ignores notifications.
pub struct AllowAllPolicy;

#[async_trait]
impl WearPolicy for AllowAllPolicy {
    async fn can_attach(&self, _item: &InventoryEntry) -> bool {
        true
    }

    async fn can_detach(&self, _item: &InventoryEntry) -> bool {
        true
    }

    async fn on_outfit_change(&self, _added: &[ItemId], _removed: &[ItemId]) {}
}

/// Handle returned by [`PolicyAggregator::add_policy`], used to remove
/// the registration later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PolicyHandle(u64);

/// Composes a dynamic set of policies.
///
/// The set is copy-on-write: membership mutations swap a new `Arc`'d
/// vector under the lock, while every consumer iterates the snapshot it
/// took at call time. Removing a policy during an in-flight fan-out
/// therefore never shortens that fan-out's recipient set.
#[derive(Default)]
pub struct PolicyAggregator {
    policies: RwLock<Arc<Vec<(u64, Arc<dyn WearPolicy>)>>>,
    next_id: AtomicU64,
}

impl PolicyAggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a policy; the returned handle removes it again.
    pub async fn add_policy(&self, policy: Arc<dyn WearPolicy>) -> PolicyHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.policies.write().await;
        let mut next = guard.as_ref().clone();
        next.push((id, policy));
        *guard = Arc::new(next);
        PolicyHandle(id)
    }

    /// Removes a previously registered policy. Returns whether it was
    /// still registered.
    pub async fn remove_policy(&self, handle: PolicyHandle) -> bool {
        let mut guard = self.policies.write().await;
        let before = guard.len();
        let next: Vec<_> = guard
            .as_ref()
            .iter()
            .filter(|(id, _)| *id != handle.0)
            .cloned()
            .collect();
        let removed = next.len() != before;
        *guard = Arc::new(next);
        removed
    }

    /// Number of registered policies.
    pub async fn len(&self) -> usize {
        self.policies.read().await.len()
    }

    /// Whether no policies are registered.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn snapshot(&self) -> Arc<Vec<(u64, Arc<dyn WearPolicy>)>> {
        self.policies.read().await.clone()
    }

    /// Unanimous attach consent; vacuously true over zero policies.
    pub async fn can_attach(&self, item: &InventoryEntry) -> bool {
        for (_, policy) in self.snapshot().await.iter() {
            if !policy.can_attach(item).await {
                return false;
            }
        }
        true
    }

    /// Unanimous detach consent; vacuously true over zero policies.
    pub async fn can_detach(&self, item: &InventoryEntry) -> bool {
        for (_, policy) in self.snapshot().await.iter() {
            if !policy.can_detach(item).await {
                return false;
            }
        }
        true
    }

    /// Fans a realized change out to the policy set as it was when this
    /// call started.
    pub async fn report_change(&self, added: &[ItemId], removed: &[ItemId]) {
        if added.is_empty() && removed.is_empty() {
            return;
        }
        let snapshot = self.snapshot().await;
        for (_, policy) in snapshot.iter() {
            policy.on_outfit_change(added, removed).await;
        }
    }
}
