//! Outfit reconciliation engine.
//!
//! The engine turns caller intents (attach, detach, add/remove,
//! replace outfit) into the minimal set of COF link creations and
//! deletions plus the external appearance calls that realize them.
//! Every intent reads a fresh snapshot of the current links, decides,
//! then mutates. Link-mutating intents are serialized through a fair
//! queue so each decision is made against a consistent link set;
//! read-only gates and queries run unserialized.

use crate::appearance::{AppearanceService, ServerEvent};
use crate::error::{EngineError, EngineResult};
use crate::policy::{PolicyAggregator, PolicyHandle, WearPolicy};
use crate::resolver::LinkResolver;
use crate::session::CofSession;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use vestry_inventory::{InventoryError, InventoryStore};
use vestry_types::{
    AssetType, AttachPoint, FolderId, InventoryEntry, ItemId, WearableType, ATTACH_DEFAULT,
    MANDATORY_BODY_PARTS, MAX_ATTACHED_OBJECTS, MAX_CLOTHING_LAYERS,
};

/// Timing budgets for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Budget for a folder-content fetch.
    pub fetch_timeout: Duration,
    /// How long to wait for the appearance-applied confirmation after a
    /// full outfit replace.
    pub replace_confirm_timeout: Duration,
    /// Pause between an incremental wear and the full recompute request.
    pub settle_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(20),
            replace_confirm_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_secs(1),
        }
    }
}

/// One worn item: the COF link realizing it plus the resolved entry.
struct WornLink {
    link_id: ItemId,
    real: InventoryEntry,
}

/// Snapshot of the currently worn set, indexed the ways the
/// reconciliation algorithms need it.
#[derive(Default)]
struct WornIndex {
    body_parts: HashMap<WearableType, WornLink>,
    clothing: HashMap<WearableType, Vec<WornLink>>,
    attachments: HashMap<AttachPoint, Vec<WornLink>>,
    by_real: HashMap<ItemId, Vec<ItemId>>,
    clothing_count: usize,
    attachment_count: usize,
}

impl WornIndex {
    fn is_worn(&self, real: ItemId) -> bool {
        self.by_real.contains_key(&real)
    }

    fn links_for(&self, real: ItemId) -> &[ItemId] {
        self.by_real.get(&real).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// The outfit engine.
///
/// Owns the COF session, the consent-policy aggregator, and the bound
/// appearance service. All intents are `&self`; share the engine behind
/// an `Arc` to drive it from several tasks.
pub struct OutfitEngine {
    session: CofSession,
    policies: Arc<PolicyAggregator>,
    appearance: Arc<dyn AppearanceService>,
    config: EngineConfig,
    confirmed: Notify,
    /// Serializes link-mutating intents; tokio's mutex wakes waiters in
    /// FIFO order, so queued intents run in arrival order. Shared so
    /// detached cleanup tasks queue on it too.
    mutations: Arc<Mutex<()>>,
}

impl OutfitEngine {
    /// Creates an engine with default timing budgets.
    pub fn new(store: Arc<dyn InventoryStore>, appearance: Arc<dyn AppearanceService>) -> Self {
        Self::with_config(store, appearance, EngineConfig::default())
    }

    /// Creates an engine with custom timing budgets.
    pub fn with_config(
        store: Arc<dyn InventoryStore>,
        appearance: Arc<dyn AppearanceService>,
        config: EngineConfig,
    ) -> Self {
        Self {
            session: CofSession::new(store, config.fetch_timeout),
            policies: Arc::new(PolicyAggregator::new()),
            appearance,
            config,
            confirmed: Notify::new(),
            mutations: Arc::new(Mutex::new(())),
        }
    }

    /// The COF session (initialization, rebinding, reset).
    pub fn session(&self) -> &CofSession {
        &self.session
    }

    /// The timing budgets in effect.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registers a consent policy.
    pub async fn add_policy(&self, policy: Arc<dyn WearPolicy>) -> PolicyHandle {
        self.policies.add_policy(policy).await
    }

    /// Removes a previously registered consent policy.
    pub async fn remove_policy(&self, handle: PolicyHandle) -> bool {
        self.policies.remove_policy(handle).await
    }

    // ── Snapshot helpers ─────────────────────────────────────────

    async fn store(&self) -> Arc<dyn InventoryStore> {
        self.session.store().await
    }

    async fn resolver(&self) -> LinkResolver {
        LinkResolver::new(self.store().await)
    }

    async fn require_cof(&self) -> EngineResult<FolderId> {
        if !self.session.ensure_initialized().await? {
            warn!("COF not initialized, operation skipped");
            return Err(EngineError::NotInitialized);
        }
        self.session.cof().await.ok_or(EngineError::NotInitialized)
    }

    /// Fetches the current COF links from the service (fresh snapshot).
    async fn cof_links(&self, cof: FolderId) -> EngineResult<Vec<InventoryEntry>> {
        let store = self.store().await;
        let entries = timeout(
            self.config.fetch_timeout,
            store.fetch_folder(cof, store.owner(), false),
        )
        .await
        .map_err(|_| InventoryError::Timeout)??;
        Ok(entries.into_iter().filter(InventoryEntry::is_link).collect())
    }

    async fn worn_index(&self, links: &[InventoryEntry]) -> WornIndex {
        let resolver = self.resolver().await;
        let mut index = WornIndex::default();
        for link in links {
            let Some(real) = resolver.resolve(link).await else {
                debug!(link = %link.id, "skipping unresolvable COF link");
                continue;
            };
            if real.is_folder() {
                // outfit history marker
                continue;
            }
            index.by_real.entry(real.id).or_default().push(link.id);
            let slot = WornLink { link_id: link.id, real: real.clone() };
            match real.asset_type {
                AssetType::Bodypart => {
                    if let Some(wearable) = real.wearable {
                        index.body_parts.insert(wearable, slot);
                    }
                }
                AssetType::Clothing => {
                    if let Some(wearable) = real.wearable {
                        index.clothing.entry(wearable).or_default().push(slot);
                        index.clothing_count += 1;
                    }
                }
                AssetType::Object => {
                    let point = real.attach_point.unwrap_or(ATTACH_DEFAULT);
                    index.attachments.entry(point).or_default().push(slot);
                    index.attachment_count += 1;
                }
                _ => {}
            }
        }
        index
    }

    // ── Attach / Detach gates ────────────────────────────────────

    /// Whether `item` may be put on right now.
    pub async fn can_attach(&self, item: ItemId) -> EngineResult<bool> {
        let cof = self.require_cof().await?;
        let resolver = self.resolver().await;
        let Some(real) = resolver.resolve_id(item).await else {
            debug!(%item, "attach refused: unresolvable");
            return Ok(false);
        };
        if !self.policies.can_attach(&real).await {
            debug!(%item, "attach refused: policy denied");
            return Ok(false);
        }
        if resolver.in_trash(real.id).await {
            debug!(%item, "attach refused: in trash");
            return Ok(false);
        }
        if !resolver.in_inventory(real.id).await {
            debug!(%item, "attach refused: outside owned tree");
            return Ok(false);
        }
        let links = self.cof_links(cof).await?;
        let index = self.worn_index(&links).await;
        if index.is_worn(real.id) {
            debug!(%item, "attach refused: already worn");
            return Ok(false);
        }
        Ok(match real.asset_type {
            AssetType::Object => index.attachment_count < MAX_ATTACHED_OBJECTS,
            AssetType::Clothing => index.clothing_count < MAX_CLOTHING_LAYERS,
            AssetType::Bodypart | AssetType::Gesture => true,
            _ => false,
        })
    }

    /// Whether `item` may be taken off right now. Body parts never may.
    pub async fn can_detach(&self, item: ItemId) -> EngineResult<bool> {
        let cof = self.require_cof().await?;
        let resolver = self.resolver().await;
        let Some(real) = resolver.resolve_id(item).await else {
            return Ok(false);
        };
        if !self.policies.can_detach(&real).await {
            debug!(%item, "detach refused: policy denied");
            return Ok(false);
        }
        if real.is_body_part() {
            debug!(%item, "detach refused: mandatory body part");
            return Ok(false);
        }
        let links = self.cof_links(cof).await?;
        let index = self.worn_index(&links).await;
        Ok(index.is_worn(real.id))
    }

    /// Puts a single item on. Returns whether the gate admitted it.
    pub async fn attach(
        &self,
        item: ItemId,
        point: AttachPoint,
        replace: bool,
    ) -> EngineResult<bool> {
        let _mutating = self.mutations.lock().await;
        if !self.can_attach(item).await? {
            info!(%item, "attach not performed");
            return Ok(false);
        }
        let cof = self.require_cof().await?;
        let real = self
            .resolver()
            .await
            .resolve_id(item)
            .await
            .ok_or(EngineError::Resolution(item))?;
        self.appearance.attach(real.id, point, replace).await?;
        self.policies.report_change(&[real.id], &[]).await;
        self.store()
            .await
            .create_link(cof, real.id, &real.name, &real.description)
            .await?;
        info!(item = %real.id, %point, "attached");
        Ok(true)
    }

    /// Takes a single item off. Returns whether the gate admitted it.
    pub async fn detach(&self, item: ItemId) -> EngineResult<bool> {
        let _mutating = self.mutations.lock().await;
        if !self.can_detach(item).await? {
            info!(%item, "detach not performed");
            return Ok(false);
        }
        let cof = self.require_cof().await?;
        let real = self
            .resolver()
            .await
            .resolve_id(item)
            .await
            .ok_or(EngineError::Resolution(item))?;
        self.appearance.detach(real.id).await?;
        self.policies.report_change(&[], &[real.id]).await;
        let links = self.cof_links(cof).await?;
        let index = self.worn_index(&links).await;
        // every matching link goes: duplicates are a bug state to clean up
        let link_ids = index.links_for(real.id).to_vec();
        if !link_ids.is_empty() {
            self.store().await.remove_items(&link_ids).await?;
        }
        info!(item = %real.id, "detached");
        Ok(true)
    }

    // ── Incremental add / remove ─────────────────────────────────

    /// Adds `requested` to the current outfit.
    ///
    /// With `replace`, items of the same wearable type or attachment
    /// point are taken off first; otherwise requests past a capacity
    /// ceiling are skipped. Per-item problems skip the item and the
    /// batch continues.
    pub async fn add_to_outfit(&self, requested: &[ItemId], replace: bool) -> EngineResult<()> {
        let _mutating = self.mutations.lock().await;
        let cof = self.require_cof().await?;
        let resolver = self.resolver().await;
        let links = self.cof_links(cof).await?;
        let index = self.worn_index(&links).await;

        let mut clothing_count = index.clothing_count;
        let mut attachment_count = index.attachment_count;
        let mut queued: HashSet<ItemId> = HashSet::new();
        let mut queued_parts: HashSet<WearableType> = HashSet::new();
        let mut to_add: Vec<InventoryEntry> = Vec::new();
        let mut remove_links: Vec<ItemId> = Vec::new();
        let mut removed_reals: Vec<ItemId> = Vec::new();

        for &id in requested {
            let Some(real) = resolver.resolve_id(id).await else {
                warn!(%id, "skipping unresolvable item");
                continue;
            };
            if resolver.in_trash(real.id).await || !resolver.in_inventory(real.id).await {
                warn!(%id, "skipping item outside the owned tree");
                continue;
            }
            if index.is_worn(real.id) || queued.contains(&real.id) {
                debug!(%id, "already worn or queued");
                continue;
            }
            match real.asset_type {
                AssetType::Clothing => {
                    let Some(wearable) = real.wearable else { continue };
                    if replace {
                        for slot in index.clothing.get(&wearable).into_iter().flatten() {
                            remove_links.push(slot.link_id);
                            removed_reals.push(slot.real.id);
                        }
                    } else {
                        if clothing_count >= MAX_CLOTHING_LAYERS {
                            debug!(%id, "clothing layer limit reached, skipping");
                            continue;
                        }
                        clothing_count += 1;
                    }
                    queued.insert(real.id);
                    to_add.push(real);
                }
                AssetType::Bodypart => {
                    let Some(wearable) = real.wearable else { continue };
                    // a body part slot holds exactly one item, and the
                    // first request for a slot wins within one batch
                    if !queued_parts.insert(wearable) {
                        debug!(%id, "body part slot already queued");
                        continue;
                    }
                    if let Some(current) = index.body_parts.get(&wearable) {
                        remove_links.push(current.link_id);
                        removed_reals.push(current.real.id);
                    }
                    queued.insert(real.id);
                    to_add.push(real);
                }
                AssetType::Gesture => {
                    // activated immediately, no link bookkeeping
                    if let Err(err) = self.appearance.activate_gesture(real.id).await {
                        warn!(item = %real.id, %err, "gesture activation failed");
                    }
                }
                AssetType::Object => {
                    if replace {
                        let point = real.attach_point.unwrap_or(ATTACH_DEFAULT);
                        for slot in index.attachments.get(&point).into_iter().flatten() {
                            remove_links.push(slot.link_id);
                            removed_reals.push(slot.real.id);
                        }
                    } else {
                        if attachment_count >= MAX_ATTACHED_OBJECTS {
                            debug!(%id, "attachment limit reached, skipping");
                            continue;
                        }
                        attachment_count += 1;
                    }
                    queued.insert(real.id);
                    to_add.push(real);
                }
                _ => debug!(%id, "not wearable, skipping"),
            }
        }

        dedup_ids(&mut remove_links);
        dedup_ids(&mut removed_reals);
        if to_add.is_empty() && remove_links.is_empty() {
            debug!("add_to_outfit: nothing to do");
            return Ok(());
        }

        let store = self.store().await;
        if !remove_links.is_empty() {
            store.remove_items(&remove_links).await?;
        }
        let mut added_reals = Vec::with_capacity(to_add.len());
        for real in &to_add {
            store
                .create_link(cof, real.id, &real.name, &real.description)
                .await?;
            added_reals.push(real.id);
        }
        self.appearance.wear_items(&added_reals, replace).await?;

        sleep(self.config.settle_delay).await;
        if let Err(err) = self.appearance.request_rebake().await {
            warn!(%err, "appearance recompute request failed");
        }
        // best-effort: a policy problem must not unwind applied state
        self.policies.report_change(&added_reals, &removed_reals).await;
        info!(
            added = added_reals.len(),
            removed = removed_reals.len(),
            "outfit add applied"
        );
        Ok(())
    }

    /// Takes `requested` off the current outfit.
    ///
    /// Unresolvable entries, body parts, and policy-denied items are
    /// dropped; survivors are deduplicated by real identity.
    pub async fn remove_from_outfit(&self, requested: &[ItemId]) -> EngineResult<()> {
        let _mutating = self.mutations.lock().await;
        let cof = self.require_cof().await?;
        let resolver = self.resolver().await;
        let links = self.cof_links(cof).await?;
        let index = self.worn_index(&links).await;

        let mut seen: HashSet<ItemId> = HashSet::new();
        let mut remove_links: Vec<ItemId> = Vec::new();
        let mut removed_reals: Vec<ItemId> = Vec::new();

        for &id in requested {
            let Some(real) = resolver.resolve_id(id).await else {
                debug!(%id, "skipping unresolvable item");
                continue;
            };
            if real.is_body_part() {
                debug!(%id, "body parts cannot be removed");
                continue;
            }
            if !self.policies.can_detach(&real).await {
                debug!(%id, "removal denied by policy");
                continue;
            }
            if !seen.insert(real.id) {
                continue;
            }
            if real.asset_type == AssetType::Gesture {
                if let Err(err) = self.appearance.deactivate_gesture(real.id).await {
                    warn!(item = %real.id, %err, "gesture deactivation failed");
                }
            }
            let link_ids = index.links_for(real.id);
            if link_ids.is_empty() {
                continue;
            }
            remove_links.extend_from_slice(link_ids);
            removed_reals.push(real.id);
        }

        if remove_links.is_empty() {
            return Ok(());
        }
        self.store().await.remove_items(&remove_links).await?;
        self.policies.report_change(&[], &removed_reals).await;
        self.appearance.remove_items(&removed_reals).await?;
        info!(removed = removed_reals.len(), "outfit remove applied");
        Ok(())
    }

    // ── Full outfit replacement ──────────────────────────────────

    /// Replaces the whole outfit with the contents of `folder`.
    ///
    /// No COF mutation happens until the mandatory-body-part gate has
    /// passed: body parts from the new outfit are merged with
    /// fallback-kept ones from the current outfit, and all four
    /// mandatory types must be covered or the operation aborts
    /// untouched. On confirmation timeout the link mutations already
    /// committed are left in place and the error is surfaced.
    pub async fn replace_outfit(&self, folder: FolderId) -> EngineResult<()> {
        let _mutating = self.mutations.lock().await;
        let cof = self.require_cof().await?;
        let store = self.store().await;
        let resolver = self.resolver().await;
        let folder_item = ItemId::from_uuid(folder.as_uuid());

        // 1. target folder must live in the owned tree
        if resolver.in_trash(folder_item).await || !resolver.in_inventory(folder_item).await {
            return Err(EngineError::Ownership(folder_item));
        }
        let members = timeout(
            self.config.fetch_timeout,
            store.fetch_folder(folder, store.owner(), false),
        )
        .await
        .map_err(|_| InventoryError::Timeout)??;

        // 2. current COF links
        let links = self.cof_links(cof).await?;

        // 3. classify target members
        let mut new_body: HashMap<WearableType, InventoryEntry> = HashMap::new();
        let mut new_clothing: Vec<InventoryEntry> = Vec::new();
        let mut new_objects: Vec<InventoryEntry> = Vec::new();
        let mut new_gestures: Vec<InventoryEntry> = Vec::new();
        let mut accepted: HashSet<ItemId> = HashSet::new();

        for member in &members {
            if member.is_folder() {
                continue;
            }
            let Some(real) = resolver.resolve(member).await else {
                debug!(member = %member.id, "dropping unresolvable outfit member");
                continue;
            };
            if real.is_folder() || accepted.contains(&real.id) {
                continue;
            }
            if resolver.in_trash(real.id).await || !resolver.in_inventory(real.id).await {
                debug!(member = %real.id, "dropping member outside the owned tree");
                continue;
            }
            match real.asset_type {
                AssetType::Bodypart => {
                    let Some(wearable) = real.wearable else { continue };
                    // first occurrence per type wins
                    if !new_body.contains_key(&wearable) {
                        accepted.insert(real.id);
                        new_body.insert(wearable, real);
                    }
                }
                AssetType::Clothing => {
                    if new_clothing.len() < MAX_CLOTHING_LAYERS {
                        accepted.insert(real.id);
                        new_clothing.push(real);
                    }
                }
                AssetType::Object => {
                    if new_objects.len() < MAX_ATTACHED_OBJECTS {
                        accepted.insert(real.id);
                        new_objects.push(real);
                    }
                }
                AssetType::Gesture => {
                    accepted.insert(real.id);
                    new_gestures.push(real);
                }
                _ => {}
            }
        }

        let gesture_ids: HashSet<ItemId> = new_gestures.iter().map(|g| g.id).collect();
        let mut to_add: HashMap<ItemId, InventoryEntry> = new_body
            .values()
            .chain(new_clothing.iter())
            .chain(new_objects.iter())
            .map(|e| (e.id, e.clone()))
            .collect();

        // 4. classify existing COF links against the new outfit
        let mut kept: Vec<ItemId> = Vec::new();
        let mut fallback_body: HashMap<WearableType, InventoryEntry> = HashMap::new();
        let mut remove_links: Vec<ItemId> = Vec::new();
        let mut removed_reals: Vec<ItemId> = Vec::new();
        let mut deactivate: Vec<ItemId> = Vec::new();

        for link in &links {
            let Some(real) = resolver.resolve(link).await else {
                // orphaned link
                remove_links.push(link.id);
                continue;
            };
            if real.is_folder() {
                // previous outfit history marker
                remove_links.push(link.id);
                continue;
            }
            if to_add.remove(&real.id).is_some() {
                // already linked to the right target, keep as-is
                kept.push(real.id);
                continue;
            }
            if kept.contains(&real.id) {
                // duplicate link to a kept target
                remove_links.push(link.id);
                continue;
            }
            match real.asset_type {
                AssetType::Bodypart
                    if real
                        .wearable
                        .map(|w| !new_body.contains_key(&w))
                        .unwrap_or(false) =>
                {
                    // not superseded by the new outfit: keep as fallback
                    if let Some(wearable) = real.wearable {
                        if fallback_body.contains_key(&wearable) {
                            // duplicate link for an already kept slot
                            remove_links.push(link.id);
                        } else {
                            fallback_body.insert(wearable, real);
                        }
                    }
                }
                AssetType::Gesture => {
                    if gesture_ids.contains(&real.id) {
                        // in the accepted set, keep the link as-is
                        kept.push(real.id);
                    } else {
                        deactivate.push(real.id);
                        remove_links.push(link.id);
                        removed_reals.push(real.id);
                    }
                }
                _ => {
                    remove_links.push(link.id);
                    removed_reals.push(real.id);
                }
            }
        }

        // 5. invariant gate: nothing has been mutated yet
        let missing: Vec<WearableType> = MANDATORY_BODY_PARTS
            .iter()
            .copied()
            .filter(|w| !new_body.contains_key(w) && !fallback_body.contains_key(w))
            .collect();
        if !missing.is_empty() {
            warn!(?missing, "replace aborted: mandatory body parts unfilled");
            return Err(EngineError::MinimumOutfit { missing });
        }

        // 6. gesture diffing
        for gesture in &deactivate {
            if let Err(err) = self.appearance.deactivate_gesture(*gesture).await {
                warn!(item = %gesture, %err, "gesture deactivation failed");
            }
        }
        for gesture in &new_gestures {
            if let Err(err) = self.appearance.activate_gesture(gesture.id).await {
                warn!(item = %gesture.id, %err, "gesture activation failed");
            }
        }

        // 7. one batch of link removals
        dedup_ids(&mut remove_links);
        dedup_ids(&mut removed_reals);
        if !remove_links.is_empty() {
            store.remove_items(&remove_links).await?;
        }

        // 8. links for everything newly worn, plus the outfit marker
        let mut added_reals: Vec<ItemId> = Vec::new();
        for real in to_add.values() {
            store
                .create_link(cof, real.id, &real.name, &real.description)
                .await?;
            added_reals.push(real.id);
        }
        let folder_name = store
            .get(folder_item)
            .await
            .map(|e| e.name)
            .unwrap_or_else(|| "Outfit".to_string());
        store.create_link(cof, folder_item, &folder_name, "").await?;

        // 9. report removals, push the new appearance, await confirmation
        self.policies.report_change(&[], &removed_reals).await;

        let mut worn: Vec<ItemId> = Vec::new();
        worn.extend(new_body.values().map(|e| e.id));
        worn.extend(fallback_body.values().map(|e| e.id));
        worn.extend(new_clothing.iter().map(|e| e.id));
        worn.extend(new_objects.iter().map(|e| e.id));
        dedup_ids(&mut worn);

        let confirm = self.confirmed.notified();
        tokio::pin!(confirm);
        confirm.as_mut().enable();
        self.appearance.replace_outfit(&worn).await?;
        if timeout(self.config.replace_confirm_timeout, confirm)
            .await
            .is_err()
        {
            // committed link mutations are deliberately left in place
            warn!(%folder, "appearance confirmation not observed in time");
            return Err(EngineError::ConfirmationTimeout);
        }

        self.policies.report_change(&added_reals, &[]).await;
        info!(
            %folder,
            worn = worn.len(),
            added = added_reals.len(),
            removed = removed_reals.len(),
            "outfit replaced"
        );
        Ok(())
    }

    // ── Queries & notifications ──────────────────────────────────

    /// The item worn in the given wearable slot, if any (first layer
    /// for clothing types).
    pub async fn worn_at(&self, wearable: WearableType) -> EngineResult<Option<ItemId>> {
        let cof = self.require_cof().await?;
        let links = self.cof_links(cof).await?;
        let index = self.worn_index(&links).await;
        Ok(if wearable.is_body_part() {
            index.body_parts.get(&wearable).map(|slot| slot.real.id)
        } else {
            index
                .clothing
                .get(&wearable)
                .and_then(|slots| slots.first())
                .map(|slot| slot.real.id)
        })
    }

    /// Feeds a server-pushed notification into the engine.
    ///
    /// Never blocks on the mutation queue: a sequential event pump must
    /// stay free to deliver the confirmation a queued intent is waiting
    /// for. Work that needs the queue is spawned detached.
    pub async fn handle_server_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::AppearanceApplied => self.confirmed.notify_waiters(),
            ServerEvent::FolderUpdated(folder) => self.session.handle_folder_update(folder).await,
            ServerEvent::ObjectKilled { attach_item } => {
                let Some(item) = attach_item else { return };
                // best-effort: the object is already gone in-world
                if !matches!(self.session.ensure_initialized().await, Ok(true)) {
                    warn!(%item, "forced-detach cleanup skipped, session uninitialized");
                    return;
                }
                let Some(cof) = self.session.cof().await else { return };
                let store = self.session.store().await;
                let policies = Arc::clone(&self.policies);
                let mutations = Arc::clone(&self.mutations);
                let fetch_timeout = self.config.fetch_timeout;
                tokio::spawn(async move {
                    if let Err(err) = cleanup_killed_attachment(
                        store,
                        policies,
                        mutations,
                        fetch_timeout,
                        cof,
                        item,
                    )
                    .await
                    {
                        warn!(%item, %err, "forced-detach cleanup failed");
                    }
                });
            }
        }
    }
}

/// Drops the COF links of an attachment the server destroyed. Runs
/// detached, queued behind any in-flight link-mutating intent.
async fn cleanup_killed_attachment(
    store: Arc<dyn InventoryStore>,
    policies: Arc<PolicyAggregator>,
    mutations: Arc<Mutex<()>>,
    fetch_timeout: Duration,
    cof: FolderId,
    item: ItemId,
) -> EngineResult<()> {
    let _mutating = mutations.lock().await;
    let links = timeout(fetch_timeout, store.fetch_folder(cof, store.owner(), false))
        .await
        .map_err(|_| InventoryError::Timeout)??;
    let link_ids: Vec<ItemId> = links
        .iter()
        .filter(|l| l.is_link() && l.link_target == Some(item))
        .map(|l| l.id)
        .collect();
    if link_ids.is_empty() {
        return Ok(());
    }
    store.remove_items(&link_ids).await?;
    policies.report_change(&[], &[item]).await;
    info!(%item, "removed COF link for server-killed attachment");
    Ok(())
}

/// Order-preserving in-place dedup.
fn dedup_ids(ids: &mut Vec<ItemId>) {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.retain(|id| seen.insert(*id));
}
