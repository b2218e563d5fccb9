//! In-memory inventory store.
//!
//! A complete in-process implementation of [`InventoryStore`] used by the
//! engine's tests. Entries can be seeded either directly into the cache
//! or "server-side only" (visible to fetches but not to `get`), and
//! individual fetches can be made to fail, so resolution-failure and
//! retry paths are exercisable without a network.

use crate::error::{InventoryError, InventoryResult};
use crate::store::InventoryStore;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tracing::debug;
use vestry_types::{AgentId, FolderId, InventoryEntry, ItemId};

#[derive(Default)]
struct Inner {
    /// Locally cached entries (folders share the item id space).
    cached: HashMap<ItemId, InventoryEntry>,
    /// Entries the "server" knows but the cache does not.
    remote: HashMap<ItemId, InventoryEntry>,
    /// Ids whose fetch is forced to fail.
    failing: HashSet<ItemId>,
    /// Fetch-folder call count, for single-flight assertions.
    folder_fetches: usize,
}

/// In-memory [`InventoryStore`].
pub struct MemoryInventory {
    owner: AgentId,
    root: FolderId,
    trash: FolderId,
    cof: Mutex<Option<FolderId>>,
    inner: Mutex<Inner>,
}

impl MemoryInventory {
    /// Creates an empty inventory with root and trash folders for `owner`.
    pub fn new(owner: AgentId) -> Self {
        let root = FolderId::new();
        let trash = FolderId::new();
        let store = Self {
            owner,
            root,
            trash,
            cof: Mutex::new(None),
            inner: Mutex::new(Inner::default()),
        };
        store.seed(InventoryEntry::folder(root, owner, FolderId::NONE, "My Inventory"));
        store.seed(InventoryEntry::folder(trash, owner, root, "Trash"));
        store
    }

    /// Seeds an entry straight into the cache (and the server view).
    pub fn seed(&self, entry: InventoryEntry) {
        let mut inner = self.inner.lock().unwrap();
        inner.remote.insert(entry.id, entry.clone());
        inner.cached.insert(entry.id, entry);
    }

    /// Seeds an entry the server knows but the cache has not seen yet.
    pub fn seed_uncached(&self, entry: InventoryEntry) {
        self.inner.lock().unwrap().remote.insert(entry.id, entry);
    }

    /// Forces fetches of `id` to fail with `NotFound`.
    pub fn fail_fetch(&self, id: ItemId) {
        self.inner.lock().unwrap().failing.insert(id);
    }

    /// Registers `folder` as the Current Outfit Folder.
    pub fn set_current_outfit_folder(&self, folder: FolderId) {
        *self.cof.lock().unwrap() = Some(folder);
    }

    /// Number of `fetch_folder` calls served so far.
    pub fn folder_fetch_count(&self) -> usize {
        self.inner.lock().unwrap().folder_fetches
    }

    /// Direct children of `folder` currently cached.
    pub fn children_of(&self, folder: FolderId) -> Vec<InventoryEntry> {
        let inner = self.inner.lock().unwrap();
        let mut out: Vec<_> = inner
            .cached
            .values()
            .filter(|e| e.parent == folder)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    fn collect_children(
        remote: &HashMap<ItemId, InventoryEntry>,
        folder: FolderId,
        recursive: bool,
        out: &mut Vec<InventoryEntry>,
    ) {
        for entry in remote.values() {
            if entry.parent == folder {
                out.push(entry.clone());
                if recursive && entry.is_folder() {
                    Self::collect_children(remote, entry.folder_id(), true, out);
                }
            }
        }
    }
}

#[async_trait]
impl InventoryStore for MemoryInventory {
    fn owner(&self) -> AgentId {
        self.owner
    }

    fn root_folder(&self) -> FolderId {
        self.root
    }

    fn trash_folder(&self) -> FolderId {
        self.trash
    }

    fn current_outfit_folder(&self) -> Option<FolderId> {
        *self.cof.lock().unwrap()
    }

    async fn get(&self, id: ItemId) -> Option<InventoryEntry> {
        self.inner.lock().unwrap().cached.get(&id).cloned()
    }

    async fn fetch_item(&self, id: ItemId) -> InventoryResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing.contains(&id) {
            return Err(InventoryError::NotFound(id));
        }
        match inner.remote.get(&id).cloned() {
            Some(entry) => {
                inner.cached.insert(id, entry);
                Ok(())
            }
            None => Err(InventoryError::NotFound(id)),
        }
    }

    async fn fetch_folder(
        &self,
        folder: FolderId,
        _owner: AgentId,
        recursive: bool,
    ) -> InventoryResult<Vec<InventoryEntry>> {
        let mut inner = self.inner.lock().unwrap();
        inner.folder_fetches += 1;
        let folder_item = ItemId::from_uuid(folder.as_uuid());
        if inner.failing.contains(&folder_item) {
            return Err(InventoryError::FolderNotFound(folder));
        }
        if !inner.remote.contains_key(&folder_item) {
            return Err(InventoryError::FolderNotFound(folder));
        }
        let mut out = Vec::new();
        Self::collect_children(&inner.remote, folder, recursive, &mut out);
        for entry in &out {
            inner.cached.insert(entry.id, entry.clone());
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(%folder, count = out.len(), "fetched folder contents");
        Ok(out)
    }

    async fn create_link(
        &self,
        parent: FolderId,
        target: ItemId,
        name: &str,
        description: &str,
    ) -> InventoryResult<InventoryEntry> {
        let mut link = InventoryEntry::item(ItemId::new(), self.owner, parent, name).as_link_to(target);
        link.description = description.to_string();
        let mut inner = self.inner.lock().unwrap();
        inner.remote.insert(link.id, link.clone());
        inner.cached.insert(link.id, link.clone());
        Ok(link)
    }

    async fn remove_items(&self, ids: &[ItemId]) -> InventoryResult<()> {
        let mut inner = self.inner.lock().unwrap();
        for id in ids {
            inner.cached.remove(id);
            inner.remote.remove(id);
        }
        Ok(())
    }

    async fn parent_of(&self, id: ItemId) -> Option<FolderId> {
        self.inner.lock().unwrap().cached.get(&id).map(|e| e.parent)
    }
}
