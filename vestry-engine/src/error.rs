//! Error types for the outfit engine.
//!
//! Per-item problems (a link that will not resolve, an item in Trash, a
//! policy refusal, a full layer) are handled inside batch operations by
//! skipping the item; only whole-operation failures surface here.

use thiserror::Error;
use vestry_inventory::InventoryError;
use vestry_types::{ItemId, WearableType};

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that abort a whole engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The Current Outfit Folder handle could not be established.
    #[error("current outfit folder is not initialized")]
    NotInitialized,

    /// An explicitly requested item could not be resolved.
    #[error("could not resolve {0}")]
    Resolution(ItemId),

    /// The target of the operation is in Trash or outside the owned tree.
    #[error("{0} is not inside the owned inventory tree")]
    Ownership(ItemId),

    /// A mandatory body-part type would be left unfilled.
    #[error("outfit would be missing mandatory body parts: {missing:?}")]
    MinimumOutfit { missing: Vec<WearableType> },

    /// The appearance-applied confirmation was not observed in time.
    /// Link mutations already committed are left in place.
    #[error("appearance confirmation timed out")]
    ConfirmationTimeout,

    /// Inventory collaborator failure.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Appearance collaborator failure.
    #[error("appearance service error: {0}")]
    Appearance(String),
}

impl From<crate::appearance::AppearanceError> for EngineError {
    fn from(err: crate::appearance::AppearanceError) -> Self {
        EngineError::Appearance(err.to_string())
    }
}
