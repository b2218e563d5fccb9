//! Appearance service abstraction.
//!
//! The avatar-appearance side of the wire protocol, seen as a trait so
//! the engine can be driven against a real transport or the mock below.
//! Server-pushed notifications arrive as [`ServerEvent`] values fed to
//! the engine by whatever owns the connection.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vestry_types::{AttachPoint, FolderId, ItemId};

/// Result type for appearance calls.
pub type AppearanceResult<T> = Result<T, AppearanceError>;

/// Failure from the appearance collaborator.
#[derive(Debug, Error)]
pub enum AppearanceError {
    #[error("appearance service error: {0}")]
    Service(String),
}

/// Outbound avatar-appearance mutations.
#[async_trait]
pub trait AppearanceService: Send + Sync {
    /// Attaches a single object at `point`.
    async fn attach(&self, item: ItemId, point: AttachPoint, replace: bool)
        -> AppearanceResult<()>;

    /// Detaches a single object.
    async fn detach(&self, item: ItemId) -> AppearanceResult<()>;

    /// Wears a batch of items (incremental add).
    async fn wear_items(&self, items: &[ItemId], replace: bool) -> AppearanceResult<()>;

    /// Takes off a batch of items.
    async fn remove_items(&self, items: &[ItemId]) -> AppearanceResult<()>;

    /// Replaces the whole outfit with `items`.
    async fn replace_outfit(&self, items: &[ItemId]) -> AppearanceResult<()>;

    /// Requests a full appearance recompute.
    async fn request_rebake(&self) -> AppearanceResult<()>;

    /// Activates a gesture.
    async fn activate_gesture(&self, item: ItemId) -> AppearanceResult<()>;

    /// Deactivates a gesture.
    async fn deactivate_gesture(&self, item: ItemId) -> AppearanceResult<()>;
}

/// Server-pushed notifications the engine reacts to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerEvent {
    /// The server confirmed the last appearance change was applied.
    AppearanceApplied,

    /// A folder's structure changed server-side.
    FolderUpdated(FolderId),

    /// An in-world object was destroyed. When the object was attached,
    /// the reserved `AttachItemID` name-value field names the inventory
    /// item, letting the engine clean up the now-dangling COF link.
    ObjectKilled { attach_item: Option<ItemId> },
}

/// A recording appearance service for tests.
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// One recorded outbound call.
    #[derive(Debug, Clone, PartialEq)]
    pub enum AppearanceCall {
        Attach(ItemId, AttachPoint, bool),
        Detach(ItemId),
        Wear(Vec<ItemId>, bool),
        Remove(Vec<ItemId>),
        Replace(Vec<ItemId>),
        Rebake,
        ActivateGesture(ItemId),
        DeactivateGesture(ItemId),
    }

    /// Records every call; optionally fails everything.
    #[derive(Default)]
    pub struct MockAppearance {
        calls: Mutex<Vec<AppearanceCall>>,
        failing: Mutex<bool>,
    }

    impl MockAppearance {
        /// A fresh recorder.
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes every subsequent call fail.
        pub fn fail_all(&self) {
            *self.failing.lock().unwrap() = true;
        }

        /// All calls recorded so far, in order.
        pub fn calls(&self) -> Vec<AppearanceCall> {
            self.calls.lock().unwrap().clone()
        }

        /// Drops recorded calls.
        pub fn clear(&self) {
            self.calls.lock().unwrap().clear();
        }

        fn record(&self, call: AppearanceCall) -> AppearanceResult<()> {
            if *self.failing.lock().unwrap() {
                return Err(AppearanceError::Service("mock failure".into()));
            }
            self.calls.lock().unwrap().push(call);
            Ok(())
        }
    }

    #[async_trait]
    impl AppearanceService for MockAppearance {
        async fn attach(
            &self,
            item: ItemId,
            point: AttachPoint,
            replace: bool,
        ) -> AppearanceResult<()> {
            self.record(AppearanceCall::Attach(item, point, replace))
        }

        async fn detach(&self, item: ItemId) -> AppearanceResult<()> {
            self.record(AppearanceCall::Detach(item))
        }

        async fn wear_items(&self, items: &[ItemId], replace: bool) -> AppearanceResult<()> {
            self.record(AppearanceCall::Wear(items.to_vec(), replace))
        }

        async fn remove_items(&self, items: &[ItemId]) -> AppearanceResult<()> {
            self.record(AppearanceCall::Remove(items.to_vec()))
        }

        async fn replace_outfit(&self, items: &[ItemId]) -> AppearanceResult<()> {
            self.record(AppearanceCall::Replace(items.to_vec()))
        }

        async fn request_rebake(&self) -> AppearanceResult<()> {
            self.record(AppearanceCall::Rebake)
        }

        async fn activate_gesture(&self, item: ItemId) -> AppearanceResult<()> {
            self.record(AppearanceCall::ActivateGesture(item))
        }

        async fn deactivate_gesture(&self, item: ItemId) -> AppearanceResult<()> {
            self.record(AppearanceCall::DeactivateGesture(item))
        }
    }
}
