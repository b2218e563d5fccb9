//! Outfit reconciliation engine for Vestry.
//!
//! Keeps the single authoritative "currently worn" record, the Current
//! Outfit Folder (COF), consistent with the remote inventory service
//! across an asynchronous, latency-heavy protocol. The COF is an
//! inventory folder whose links enumerate everything the avatar wears.
//!
//! # Components
//!
//! - **Session**: owns the cached COF handle; single-flight, retryable
//!   initialization; background resync on server-pushed folder updates
//! - **Resolver**: chases link entries to their real targets and walks
//!   ancestor chains for containment tests
//! - **Policies**: pluggable consent capabilities composed into one
//!   unanimous gate plus a snapshot-isolated change notifier
//! - **Engine**: the reconciliation algorithms: attach/detach gates,
//!   incremental add/remove, and full outfit replacement
//!
//! # Invariants
//!
//! A real item is worn iff exactly one COF link targets it; clothing
//! layers and attached objects stay under their ceilings; every outfit
//! wears exactly one of each mandatory body part (shape, skin, hair,
//! eyes).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vestry_engine::{appearance::mock::MockAppearance, OutfitEngine};
//! use vestry_inventory::MemoryInventory;
//! use vestry_types::AgentId;
//!
//! # async fn demo() {
//! let store = Arc::new(MemoryInventory::new(AgentId::new()));
//! let engine = OutfitEngine::new(store, Arc::new(MockAppearance::new()));
//! engine.session().ensure_initialized().await.ok();
//! # }
//! ```

pub mod appearance;
mod engine;
mod error;
mod policy;
mod resolver;
mod session;

pub use appearance::{AppearanceError, AppearanceResult, AppearanceService, ServerEvent};
pub use engine::{EngineConfig, OutfitEngine};
pub use error::{EngineError, EngineResult};
pub use policy::{AllowAllPolicy, PolicyAggregator, PolicyHandle, WearPolicy};
pub use resolver::LinkResolver;
pub use session::CofSession;
