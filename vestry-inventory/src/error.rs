//! Error types for the inventory collaborator.

use thiserror::Error;
use vestry_types::{FolderId, ItemId};

/// Result type for inventory operations.
pub type InventoryResult<T> = Result<T, InventoryError>;

/// Errors that can occur talking to the inventory service.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Item not present locally and not obtainable from the service.
    #[error("item not found: {0}")]
    NotFound(ItemId),

    /// Folder unknown to the service.
    #[error("folder not found: {0}")]
    FolderNotFound(FolderId),

    /// The service refused a mutation (permissions, bad parent, ...).
    #[error("rejected by service: {0}")]
    Rejected(String),

    /// Transport-level failure.
    #[error("backend error: {0}")]
    Backend(String),

    /// The fetch did not complete within budget.
    #[error("inventory fetch timed out")]
    Timeout,
}
