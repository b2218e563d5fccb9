//! Link resolution and containment tests.
//!
//! Link entries reference a real item by identity; resolving one means
//! looking the target up in the cache and, on a miss, fetching it once.
//! Containment (`is in Trash`, `is in my inventory`) is tested by
//! walking the parent chain upward with on-demand fetches, bounded so a
//! cyclic or hostile tree cannot hang the engine.

use std::sync::Arc;
use tracing::debug;
use vestry_inventory::InventoryStore;
use vestry_types::{FolderId, InventoryEntry, ItemId, MAX_ANCESTOR_DEPTH};

/// Resolves links and walks ancestor chains against one store binding.
pub struct LinkResolver {
    store: Arc<dyn InventoryStore>,
}

impl LinkResolver {
    /// Creates a resolver over the given store.
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    /// Resolves `entry` to its real entry.
    ///
    /// Non-links pass through unchanged. For links, the target is looked
    /// up in the cache; on a miss one fetch is issued and the lookup
    /// retried. `None` means the target is unobtainable — callers skip
    /// the item rather than failing the whole operation, unless the item
    /// was explicitly requested.
    pub async fn resolve(&self, entry: &InventoryEntry) -> Option<InventoryEntry> {
        if !entry.is_link() {
            return Some(entry.clone());
        }
        let target = entry.link_target?;
        if let Some(real) = self.store.get(target).await {
            return Some(real);
        }
        if let Err(err) = self.store.fetch_item(target).await {
            debug!(link = %entry.id, %target, %err, "link target fetch failed");
            return None;
        }
        self.store.get(target).await
    }

    /// Resolves an id: looks the entry up (fetching once on a miss),
    /// then chases a link if it is one.
    pub async fn resolve_id(&self, id: ItemId) -> Option<InventoryEntry> {
        let entry = match self.store.get(id).await {
            Some(entry) => entry,
            None => {
                self.store.fetch_item(id).await.ok()?;
                self.store.get(id).await?
            }
        };
        self.resolve(&entry).await
    }

    /// Walks `id`'s parent chain upward looking for `ancestor`.
    ///
    /// Missing parents are fetched on demand. Returns `false` on
    /// reaching the depth bound, a parent that cannot be obtained, or
    /// the `NONE` sentinel.
    pub async fn is_descendant_of(&self, id: ItemId, ancestor: FolderId) -> bool {
        if ancestor.is_none() {
            return false;
        }
        let mut current = id;
        for _ in 0..MAX_ANCESTOR_DEPTH {
            let parent = match self.store.parent_of(current).await {
                Some(parent) => parent,
                None => {
                    if self.store.fetch_item(current).await.is_err() {
                        return false;
                    }
                    match self.store.parent_of(current).await {
                        Some(parent) => parent,
                        None => return false,
                    }
                }
            };
            if parent == ancestor {
                return true;
            }
            if parent.is_none() {
                return false;
            }
            current = ItemId::from_uuid(parent.as_uuid());
        }
        false
    }

    /// Whether the entry sits anywhere under Trash.
    pub async fn in_trash(&self, id: ItemId) -> bool {
        self.is_descendant_of(id, self.store.trash_folder()).await
    }

    /// Whether the entry sits anywhere under the owned inventory root.
    pub async fn in_inventory(&self, id: ItemId) -> bool {
        self.is_descendant_of(id, self.store.root_folder()).await
    }
}
