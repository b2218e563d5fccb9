//! Core type definitions for Vestry.
//!
//! This crate defines the fundamental, service-agnostic types used by the
//! outfit engine:
//! - Item, folder, and agent identifiers (UUID-backed)
//! - The inventory entry model (items, folders, links)
//! - Wearable classification and capacity limits
//!
//! Everything service-specific (wire formats, cache policy, fetch
//! protocol) belongs to the inventory collaborator, not here.

mod entry;
mod ids;
mod wearable;

pub use entry::{AssetType, EntryKind, InventoryEntry};
pub use ids::{AgentId, FolderId, ItemId};
pub use wearable::{
    AttachPoint, WearableType, ATTACH_DEFAULT, MANDATORY_BODY_PARTS, MAX_ANCESTOR_DEPTH,
    MAX_ATTACHED_OBJECTS, MAX_CLOTHING_LAYERS,
};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),
}
