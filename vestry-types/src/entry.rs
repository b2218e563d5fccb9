//! Inventory entry model.
//!
//! Entries are owned by the remote inventory service; the engine only
//! ever references them by identity and never fabricates non-link
//! entries. The one entry kind the engine creates is the COF link.

use crate::{AgentId, AttachPoint, FolderId, ItemId, WearableType};
use serde::{Deserialize, Serialize};

/// Whether an entry is a folder or a leaf item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Folder,
    Item,
}

/// What kind of asset an item carries.
///
/// Only the variants the engine dispatches on; everything else the
/// service may store is `Other` and passes through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Bodypart,
    Clothing,
    Object,
    Gesture,
    Link,
    Folder,
    Other,
}

/// A single inventory entry as cached from the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryEntry {
    /// The entry's own identity (a link's own id, not its target).
    pub id: ItemId,
    /// Folder or item.
    pub kind: EntryKind,
    /// Asset classification.
    pub asset_type: AssetType,
    /// Inventory owner.
    pub owner: AgentId,
    /// Containing folder; `FolderId::NONE` for roots.
    pub parent: FolderId,
    /// Display name.
    pub name: String,
    /// Free-form description (the COF stores ordering hints here).
    pub description: String,
    /// Link target identity; `Some` iff `asset_type == Link`.
    pub link_target: Option<ItemId>,
    /// Wearable slot; `Some` iff the asset is a body part or clothing.
    pub wearable: Option<WearableType>,
    /// Attachment point; `Some` for attachable objects.
    pub attach_point: Option<AttachPoint>,
}

impl InventoryEntry {
    /// A minimal item entry. Tests and the in-memory store build on this.
    pub fn item(id: ItemId, owner: AgentId, parent: FolderId, name: impl Into<String>) -> Self {
        Self {
            id,
            kind: EntryKind::Item,
            asset_type: AssetType::Other,
            owner,
            parent,
            name: name.into(),
            description: String::new(),
            link_target: None,
            wearable: None,
            attach_point: None,
        }
    }

    /// A folder entry.
    pub fn folder(id: FolderId, owner: AgentId, parent: FolderId, name: impl Into<String>) -> Self {
        Self {
            id: ItemId::from_uuid(id.as_uuid()),
            kind: EntryKind::Folder,
            asset_type: AssetType::Folder,
            owner,
            parent,
            name: name.into(),
            description: String::new(),
            link_target: None,
            wearable: None,
            attach_point: None,
        }
    }

    /// Tags the entry as a wearable of the given type.
    pub fn with_wearable(mut self, wearable: WearableType) -> Self {
        self.asset_type = if wearable.is_body_part() {
            AssetType::Bodypart
        } else {
            AssetType::Clothing
        };
        self.wearable = Some(wearable);
        self
    }

    /// Tags the entry as an attachable object.
    pub fn with_attach_point(mut self, point: AttachPoint) -> Self {
        self.asset_type = AssetType::Object;
        self.attach_point = Some(point);
        self
    }

    /// Tags the entry as a gesture.
    pub fn as_gesture(mut self) -> Self {
        self.asset_type = AssetType::Gesture;
        self
    }

    /// Tags the entry as a link to `target`.
    pub fn as_link_to(mut self, target: ItemId) -> Self {
        self.asset_type = AssetType::Link;
        self.link_target = Some(target);
        self
    }

    /// Whether this entry is a link.
    #[must_use]
    pub fn is_link(&self) -> bool {
        self.asset_type == AssetType::Link
    }

    /// Whether this entry is a folder.
    #[must_use]
    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }

    /// The identity of the real item: a link's target, otherwise the
    /// entry's own id.
    #[must_use]
    pub fn real_id(&self) -> ItemId {
        match self.link_target {
            Some(target) if self.is_link() => target,
            _ => self.id,
        }
    }

    /// This entry's id reinterpreted as a folder id (folders share the
    /// item id space on the wire).
    #[must_use]
    pub fn folder_id(&self) -> FolderId {
        FolderId::from_uuid(self.id.as_uuid())
    }

    /// Whether this is a mandatory body part.
    #[must_use]
    pub fn is_body_part(&self) -> bool {
        self.wearable.map(|w| w.is_body_part()).unwrap_or(false)
    }
}
