//! Inventory service interface for Vestry.
//!
//! The outfit engine treats the inventory as an external collaborator:
//! a cache-backed, identity-keyed store whose folder contents can be
//! fetched on demand and in which the engine may create and remove link
//! entries. This crate defines that surface ([`InventoryStore`]) and an
//! in-memory implementation ([`mem::MemoryInventory`]) for tests.
//!
//! Cache eviction, wire formats, and the fetch protocol itself belong to
//! the concrete service binding, not to this interface.

mod error;
pub mod mem;
mod store;

pub use error::{InventoryError, InventoryResult};
pub use mem::MemoryInventory;
pub use store::InventoryStore;
