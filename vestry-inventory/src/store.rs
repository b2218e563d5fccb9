//! Inventory store abstraction.
//!
//! Defines the surface of the remote inventory service the engine
//! consumes: identity-keyed cache lookup, demand fetch, folder-content
//! fetch, and link creation/removal. The engine never creates non-link
//! entries through this interface.

use crate::error::InventoryResult;
use async_trait::async_trait;
use vestry_types::{AgentId, FolderId, InventoryEntry, ItemId};

/// The inventory service as seen from the outfit engine.
///
/// Folders and items share one identifier space on the wire, so `get`
/// and `parent_of` accept an [`ItemId`] and resolve folders through
/// their id reinterpreted via [`InventoryEntry::folder_id`].
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// The inventory owner this store is bound to.
    fn owner(&self) -> AgentId;

    /// The root of the owned inventory tree.
    fn root_folder(&self) -> FolderId;

    /// The trash folder.
    fn trash_folder(&self) -> FolderId;

    /// The Current Outfit Folder, if the service has announced one.
    fn current_outfit_folder(&self) -> Option<FolderId>;

    /// Cache lookup by identity. Never goes to the network.
    async fn get(&self, id: ItemId) -> Option<InventoryEntry>;

    /// Fetches a single entry from the service into the cache.
    async fn fetch_item(&self, id: ItemId) -> InventoryResult<()>;

    /// Fetches a folder's contents (direct children, or the whole
    /// subtree when `recursive`), caching and returning them.
    async fn fetch_folder(
        &self,
        folder: FolderId,
        owner: AgentId,
        recursive: bool,
    ) -> InventoryResult<Vec<InventoryEntry>>;

    /// Creates a link entry under `parent` pointing at `target`.
    async fn create_link(
        &self,
        parent: FolderId,
        target: ItemId,
        name: &str,
        description: &str,
    ) -> InventoryResult<InventoryEntry>;

    /// Removes the given entries (links included) from the inventory.
    async fn remove_items(&self, ids: &[ItemId]) -> InventoryResult<()>;

    /// The containing folder of a cached entry, if known locally.
    async fn parent_of(&self, id: ItemId) -> Option<FolderId>;
}
