//! COF session — ownership of the Current Outfit Folder handle.
//!
//! The handle is established lazily on first use. Initialization is
//! single-flight: concurrent callers queue on the session lock and the
//! first one through performs the fetch; the rest observe its result.
//! A failed attempt leaves the flag clear, so every later call retries
//! until one succeeds. Server-pushed structural updates to the COF
//! trigger a detached background refresh.

use crate::error::EngineResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use vestry_inventory::{InventoryError, InventoryStore};
use vestry_types::FolderId;

#[derive(Default)]
struct SessionState {
    cof: Option<FolderId>,
    initialized: bool,
}

/// Owns the cached COF handle and the store binding it came from.
///
/// The store is injected and swappable: [`CofSession::rebind`] replaces
/// the binding and resets cached state under the same coordination
/// locks, so an identity swap mid-life cannot leave a stale handle.
pub struct CofSession {
    store: RwLock<Arc<dyn InventoryStore>>,
    state: Mutex<SessionState>,
    fetch_timeout: Duration,
}

impl CofSession {
    /// Creates a session bound to `store`.
    pub fn new(store: Arc<dyn InventoryStore>, fetch_timeout: Duration) -> Self {
        Self {
            store: RwLock::new(store),
            state: Mutex::new(SessionState::default()),
            fetch_timeout,
        }
    }

    /// The current store binding.
    pub async fn store(&self) -> Arc<dyn InventoryStore> {
        self.store.read().await.clone()
    }

    /// Replaces the store binding (identity swap) and forces
    /// reinitialization on next use.
    ///
    /// Lock order is state then store, the same as
    /// [`CofSession::ensure_initialized`]; taking them in the opposite
    /// order can deadlock against an in-flight initializer.
    pub async fn rebind(&self, store: Arc<dyn InventoryStore>) {
        let mut state = self.state.lock().await;
        let mut binding = self.store.write().await;
        *binding = store;
        *state = SessionState::default();
        info!("session rebound, COF handle cleared");
    }

    /// Clears the cached handle, forcing reinitialization on next use.
    pub async fn reset(&self) {
        *self.state.lock().await = SessionState::default();
    }

    /// The cached COF handle, if initialization has succeeded.
    pub async fn cof(&self) -> Option<FolderId> {
        self.state.lock().await.cof
    }

    /// Establishes the COF handle and primes its contents.
    ///
    /// Returns `Ok(true)` once initialized (cached indefinitely),
    /// `Ok(false)` when the service has not announced a COF yet, and an
    /// error when the priming fetch fails. In both non-`true` cases the
    /// flag stays clear and the next caller retries.
    pub async fn ensure_initialized(&self) -> EngineResult<bool> {
        let mut state = self.state.lock().await;
        if state.initialized {
            return Ok(true);
        }
        let store = self.store.read().await.clone();
        let Some(cof) = store.current_outfit_folder() else {
            warn!("inventory has not announced a current outfit folder");
            return Ok(false);
        };
        let contents = timeout(
            self.fetch_timeout,
            store.fetch_folder(cof, store.owner(), false),
        )
        .await
        .map_err(|_| InventoryError::Timeout)??;
        debug!(%cof, links = contents.len(), "COF session initialized");
        state.cof = Some(cof);
        state.initialized = true;
        Ok(true)
    }

    /// Reacts to a server-pushed "folder updated" notification.
    ///
    /// If the folder is the COF, a detached task refetches its contents
    /// and demand-fetches newly linked targets. Fire-and-forget: the
    /// notification handler is never blocked and errors are only logged.
    pub async fn handle_folder_update(&self, folder: FolderId) {
        let is_cof = { self.state.lock().await.cof == Some(folder) };
        if !is_cof {
            return;
        }
        let store = self.store.read().await.clone();
        tokio::spawn(async move {
            let links = match store.fetch_folder(folder, store.owner(), false).await {
                Ok(links) => links,
                Err(err) => {
                    warn!(%folder, %err, "COF refresh fetch failed");
                    return;
                }
            };
            for link in links.iter().filter(|l| l.is_link()) {
                let Some(target) = link.link_target else { continue };
                if store.get(target).await.is_none() {
                    if let Err(err) = store.fetch_item(target).await {
                        debug!(%target, %err, "newly linked item fetch failed");
                    }
                }
            }
            debug!(%folder, links = links.len(), "COF refreshed after server update");
        });
    }
}
