use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use vestry_engine::appearance::mock::{AppearanceCall, MockAppearance};
use vestry_engine::{EngineConfig, EngineError, OutfitEngine, ServerEvent, WearPolicy};
use vestry_inventory::{InventoryStore, MemoryInventory};
use vestry_types::{
    AgentId, AssetType, AttachPoint, FolderId, InventoryEntry, ItemId, WearableType,
    MANDATORY_BODY_PARTS, MAX_ATTACHED_OBJECTS, MAX_CLOTHING_LAYERS,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn test_config() -> EngineConfig {
    EngineConfig {
        fetch_timeout: Duration::from_secs(5),
        replace_confirm_timeout: Duration::from_millis(200),
        settle_delay: Duration::ZERO,
    }
}

struct Fixture {
    store: Arc<MemoryInventory>,
    appearance: Arc<MockAppearance>,
    engine: Arc<OutfitEngine>,
    cof: FolderId,
    closet: FolderId,
}

fn fixture() -> Fixture {
    init_tracing();
    let store = Arc::new(MemoryInventory::new(AgentId::new()));
    let owner = store.owner();
    let cof = FolderId::new();
    store.seed(InventoryEntry::folder(cof, owner, store.root_folder(), "Current Outfit"));
    store.set_current_outfit_folder(cof);
    let closet = FolderId::new();
    store.seed(InventoryEntry::folder(closet, owner, store.root_folder(), "Clothing"));
    let appearance = Arc::new(MockAppearance::new());
    let engine = Arc::new(OutfitEngine::with_config(
        store.clone(),
        appearance.clone(),
        test_config(),
    ));
    Fixture { store, appearance, engine, cof, closet }
}

impl Fixture {
    fn seed_wearable_in(&self, folder: FolderId, name: &str, wearable: WearableType) -> ItemId {
        let item = InventoryEntry::item(ItemId::new(), self.store.owner(), folder, name)
            .with_wearable(wearable);
        let id = item.id;
        self.store.seed(item);
        id
    }

    fn seed_wearable(&self, name: &str, wearable: WearableType) -> ItemId {
        self.seed_wearable_in(self.closet, name, wearable)
    }

    fn seed_object_in(&self, folder: FolderId, name: &str, point: AttachPoint) -> ItemId {
        let item = InventoryEntry::item(ItemId::new(), self.store.owner(), folder, name)
            .with_attach_point(point);
        let id = item.id;
        self.store.seed(item);
        id
    }

    fn seed_gesture_in(&self, folder: FolderId, name: &str) -> ItemId {
        let item =
            InventoryEntry::item(ItemId::new(), self.store.owner(), folder, name).as_gesture();
        let id = item.id;
        self.store.seed(item);
        id
    }

    fn seed_outfit_folder(&self, name: &str) -> FolderId {
        let folder = FolderId::new();
        self.store.seed(InventoryEntry::folder(
            folder,
            self.store.owner(),
            self.store.root_folder(),
            name,
        ));
        folder
    }

    /// Seeds a COF link to `target`, i.e. marks it as already worn.
    fn wear(&self, target: ItemId, name: &str) -> ItemId {
        let link = InventoryEntry::item(ItemId::new(), self.store.owner(), self.cof, name)
            .as_link_to(target);
        let id = link.id;
        self.store.seed(link);
        id
    }

    /// Seeds and wears one body part of every mandatory type.
    fn wear_mandatory_body_parts(&self) -> HashMap<WearableType, ItemId> {
        MANDATORY_BODY_PARTS
            .iter()
            .map(|&part| {
                let id = self.seed_wearable(&format!("base {part}"), part);
                self.wear(id, &format!("base {part} link"));
                (part, id)
            })
            .collect()
    }

    /// Real identities currently linked from the COF, sorted.
    fn worn_targets(&self) -> Vec<ItemId> {
        let mut out: Vec<ItemId> = self
            .store
            .children_of(self.cof)
            .iter()
            .filter(|e| e.is_link())
            .filter_map(|e| e.link_target)
            .collect();
        out.sort();
        out
    }

    /// Confirms the next appearance replace after a short delay.
    fn confirm_soon(&self) {
        let engine = self.engine.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            engine.handle_server_event(ServerEvent::AppearanceApplied).await;
        });
    }
}

/// Records every change report it receives.
#[derive(Default)]
struct Recording {
    reports: Mutex<Vec<(Vec<ItemId>, Vec<ItemId>)>>,
}

#[async_trait]
impl WearPolicy for Recording {
    async fn can_attach(&self, _item: &InventoryEntry) -> bool {
        true
    }
    async fn can_detach(&self, _item: &InventoryEntry) -> bool {
        true
    }
    async fn on_outfit_change(&self, added: &[ItemId], removed: &[ItemId]) {
        self.reports
            .lock()
            .unwrap()
            .push((added.to_vec(), removed.to_vec()));
    }
}

struct DenyDetachOf(ItemId);

#[async_trait]
impl WearPolicy for DenyDetachOf {
    async fn can_attach(&self, _item: &InventoryEntry) -> bool {
        true
    }
    async fn can_detach(&self, item: &InventoryEntry) -> bool {
        item.id != self.0
    }
    async fn on_outfit_change(&self, _added: &[ItemId], _removed: &[ItemId]) {}
}

// ── AddToOutfit ──────────────────────────────────────────────────

#[tokio::test]
async fn add_to_outfit_is_idempotent() {
    let fx = fixture();
    let shirt = fx.seed_wearable("shirt", WearableType::Shirt);
    let pants = fx.seed_wearable("pants", WearableType::Pants);

    fx.engine.add_to_outfit(&[shirt, pants], false).await.unwrap();
    let once = fx.worn_targets();
    fx.engine.add_to_outfit(&[shirt, pants], false).await.unwrap();
    let twice = fx.worn_targets();

    assert_eq!(once.len(), 2);
    assert_eq!(once, twice);
}

#[tokio::test]
async fn add_with_replace_swaps_same_clothing_type() {
    let fx = fixture();
    let old_shirt = fx.seed_wearable("old shirt", WearableType::Shirt);
    fx.wear(old_shirt, "old shirt link");
    let new_shirt = fx.seed_wearable("new shirt", WearableType::Shirt);

    fx.engine.add_to_outfit(&[new_shirt], true).await.unwrap();

    assert_eq!(fx.worn_targets(), vec![new_shirt]);
}

#[tokio::test]
async fn add_without_replace_stacks_clothing_layers() {
    let fx = fixture();
    let first = fx.seed_wearable("shirt one", WearableType::Shirt);
    fx.wear(first, "shirt one link");
    let second = fx.seed_wearable("shirt two", WearableType::Shirt);

    fx.engine.add_to_outfit(&[second], false).await.unwrap();

    let mut expected = vec![first, second];
    expected.sort();
    assert_eq!(fx.worn_targets(), expected);
}

#[tokio::test]
async fn add_body_part_always_replaces_the_slot() {
    let fx = fixture();
    let old_shape = fx.seed_wearable("old shape", WearableType::Shape);
    fx.wear(old_shape, "old shape link");
    let new_shape = fx.seed_wearable("new shape", WearableType::Shape);

    // replace=false: the slot still holds exactly one item
    fx.engine.add_to_outfit(&[new_shape], false).await.unwrap();

    assert_eq!(fx.worn_targets(), vec![new_shape]);
}

#[tokio::test]
async fn add_keeps_one_body_part_per_slot_within_a_batch() {
    let fx = fixture();
    let shape_a = fx.seed_wearable("shape a", WearableType::Shape);
    let shape_b = fx.seed_wearable("shape b", WearableType::Shape);

    fx.engine.add_to_outfit(&[shape_a, shape_b], false).await.unwrap();

    assert_eq!(fx.worn_targets(), vec![shape_a]);
}

#[tokio::test]
async fn add_activates_gestures_without_link_bookkeeping() {
    let fx = fixture();
    let wave = fx.seed_gesture_in(fx.closet, "wave");

    fx.engine.add_to_outfit(&[wave], false).await.unwrap();

    assert!(fx
        .appearance
        .calls()
        .contains(&AppearanceCall::ActivateGesture(wave)));
    assert!(fx.worn_targets().is_empty());
}

#[tokio::test]
async fn add_skips_items_past_the_clothing_ceiling() {
    let fx = fixture();
    for n in 0..MAX_CLOTHING_LAYERS {
        let layer = fx.seed_wearable(&format!("layer {n:02}"), WearableType::Tattoo);
        fx.wear(layer, &format!("layer {n:02} link"));
    }
    let extra = fx.seed_wearable("straw that breaks", WearableType::Shirt);

    fx.engine.add_to_outfit(&[extra], false).await.unwrap();

    assert_eq!(fx.worn_targets().len(), MAX_CLOTHING_LAYERS);
    assert!(!fx.worn_targets().contains(&extra));
}

#[tokio::test]
async fn add_skips_trashed_and_unresolvable_items() {
    let fx = fixture();
    let good = fx.seed_wearable("good shirt", WearableType::Shirt);
    let binned = InventoryEntry::item(
        ItemId::new(),
        fx.store.owner(),
        fx.store.trash_folder(),
        "binned",
    )
    .with_wearable(WearableType::Pants);
    let binned_id = binned.id;
    fx.store.seed(binned);
    let ghost = ItemId::new(); // never seeded anywhere

    fx.engine
        .add_to_outfit(&[good, binned_id, ghost], false)
        .await
        .unwrap();

    assert_eq!(fx.worn_targets(), vec![good]);
}

// ── RemoveFromOutfit ─────────────────────────────────────────────

#[tokio::test]
async fn remove_from_outfit_unlinks_reports_and_detaches() {
    let fx = fixture();
    let recorder = Arc::new(Recording::default());
    fx.engine.add_policy(recorder.clone()).await;
    let shirt = fx.seed_wearable("shirt", WearableType::Shirt);
    fx.wear(shirt, "shirt link");

    fx.engine.remove_from_outfit(&[shirt]).await.unwrap();

    assert!(fx.worn_targets().is_empty());
    assert!(fx.appearance.calls().contains(&AppearanceCall::Remove(vec![shirt])));
    let reports = recorder.reports.lock().unwrap().clone();
    assert_eq!(reports, vec![(vec![], vec![shirt])]);
}

#[tokio::test]
async fn remove_skips_body_parts() {
    let fx = fixture();
    let worn = fx.wear_mandatory_body_parts();
    let shape = worn[&WearableType::Shape];

    fx.engine.remove_from_outfit(&[shape]).await.unwrap();

    assert!(fx.worn_targets().contains(&shape));
}

#[tokio::test]
async fn remove_skips_policy_denied_items() {
    let fx = fixture();
    let shirt = fx.seed_wearable("shirt", WearableType::Shirt);
    let pants = fx.seed_wearable("pants", WearableType::Pants);
    fx.wear(shirt, "shirt link");
    fx.wear(pants, "pants link");
    fx.engine.add_policy(Arc::new(DenyDetachOf(shirt))).await;

    fx.engine.remove_from_outfit(&[shirt, pants]).await.unwrap();

    assert_eq!(fx.worn_targets(), vec![shirt]);
}

#[tokio::test]
async fn remove_deduplicates_by_real_identity() {
    let fx = fixture();
    let shirt = fx.seed_wearable("shirt", WearableType::Shirt);
    fx.wear(shirt, "shirt link");

    fx.engine.remove_from_outfit(&[shirt, shirt]).await.unwrap();

    assert!(fx.worn_targets().is_empty());
    let removes: Vec<_> = fx
        .appearance
        .calls()
        .into_iter()
        .filter(|c| matches!(c, AppearanceCall::Remove(_)))
        .collect();
    assert_eq!(removes, vec![AppearanceCall::Remove(vec![shirt])]);
}

#[tokio::test]
async fn remove_deactivates_gestures() {
    let fx = fixture();
    let wave = fx.seed_gesture_in(fx.closet, "wave");
    fx.wear(wave, "wave link");

    fx.engine.remove_from_outfit(&[wave]).await.unwrap();

    assert!(fx
        .appearance
        .calls()
        .contains(&AppearanceCall::DeactivateGesture(wave)));
    assert!(fx.worn_targets().is_empty());
}

// ── ReplaceOutfit ────────────────────────────────────────────────

#[tokio::test]
async fn replace_swaps_outfit_and_keeps_fallback_body_parts() {
    let fx = fixture();
    let worn = fx.wear_mandatory_body_parts();
    let old_shirt = fx.seed_wearable("old shirt", WearableType::Shirt);
    fx.wear(old_shirt, "old shirt link");

    let beach = fx.seed_outfit_folder("Beach");
    let new_shape = fx.seed_wearable_in(beach, "beach shape", WearableType::Shape);
    let trunks = fx.seed_wearable_in(beach, "trunks", WearableType::Pants);

    fx.confirm_soon();
    fx.engine.replace_outfit(beach).await.unwrap();

    let mut expected = vec![
        new_shape,
        trunks,
        worn[&WearableType::Skin],
        worn[&WearableType::Hair],
        worn[&WearableType::Eyes],
        ItemId::from_uuid(beach.as_uuid()), // outfit history marker
    ];
    expected.sort();
    assert_eq!(fx.worn_targets(), expected);
    assert!(fx
        .appearance
        .calls()
        .iter()
        .any(|c| matches!(c, AppearanceCall::Replace(_))));
}

#[tokio::test]
async fn replace_keeps_exactly_one_link_per_mandatory_type() {
    let fx = fixture();
    fx.wear_mandatory_body_parts();
    let formal = fx.seed_outfit_folder("Formal");
    for &part in &MANDATORY_BODY_PARTS {
        fx.seed_wearable_in(formal, &format!("formal {part}"), part);
    }

    fx.confirm_soon();
    fx.engine.replace_outfit(formal).await.unwrap();

    let mut per_type: HashMap<WearableType, usize> = HashMap::new();
    for link in fx.store.children_of(fx.cof) {
        let Some(target) = link.link_target else { continue };
        if let Some(real) = fx.store.get(target).await {
            if let Some(wearable) = real.wearable {
                *per_type.entry(wearable).or_default() += 1;
            }
        }
    }
    for &part in &MANDATORY_BODY_PARTS {
        assert_eq!(per_type.get(&part), Some(&1), "expected exactly one {part} link");
    }
}

#[tokio::test]
async fn replace_duplicate_body_parts_first_occurrence_wins() {
    let fx = fixture();
    fx.wear_mandatory_body_parts();
    let outfit = fx.seed_outfit_folder("Twins");
    // folder contents are delivered name-sorted, so "shape a" is first
    let shape_a = fx.seed_wearable_in(outfit, "shape a", WearableType::Shape);
    let shape_b = fx.seed_wearable_in(outfit, "shape b", WearableType::Shape);

    fx.confirm_soon();
    fx.engine.replace_outfit(outfit).await.unwrap();

    let worn = fx.worn_targets();
    assert!(worn.contains(&shape_a));
    assert!(!worn.contains(&shape_b));
}

#[tokio::test]
async fn replace_aborts_untouched_when_mandatory_parts_missing() {
    let fx = fixture();
    // wearing only three of the four mandatory parts: no hair
    for part in [WearableType::Shape, WearableType::Skin, WearableType::Eyes] {
        let id = fx.seed_wearable(&format!("base {part}"), part);
        fx.wear(id, &format!("base {part} link"));
    }
    let before = fx.worn_targets();
    let outfit = fx.seed_outfit_folder("Bare");
    fx.seed_wearable_in(outfit, "pants", WearableType::Pants);

    let err = fx.engine.replace_outfit(outfit).await.unwrap_err();

    assert!(matches!(
        err,
        EngineError::MinimumOutfit { ref missing } if missing == &vec![WearableType::Hair]
    ));
    // zero mutation: links untouched, nothing pushed to the wire
    assert_eq!(fx.worn_targets(), before);
    assert!(fx.appearance.calls().is_empty());
}

#[tokio::test]
async fn replace_rejects_a_trashed_target_folder() {
    let fx = fixture();
    fx.wear_mandatory_body_parts();
    let binned = FolderId::new();
    fx.store.seed(InventoryEntry::folder(
        binned,
        fx.store.owner(),
        fx.store.trash_folder(),
        "old outfit",
    ));

    assert!(matches!(
        fx.engine.replace_outfit(binned).await,
        Err(EngineError::Ownership(_))
    ));
}

#[tokio::test]
async fn replace_confirmation_timeout_leaves_links_in_place() {
    let fx = fixture();
    fx.wear_mandatory_body_parts();
    let outfit = fx.seed_outfit_folder("Quiet");
    let shirt = fx.seed_wearable_in(outfit, "shirt", WearableType::Shirt);

    // no AppearanceApplied event arrives
    let err = fx.engine.replace_outfit(outfit).await.unwrap_err();

    assert!(matches!(err, EngineError::ConfirmationTimeout));
    // the committed link mutations are deliberately not rolled back
    let worn = fx.worn_targets();
    assert!(worn.contains(&shirt));
    assert!(worn.contains(&ItemId::from_uuid(outfit.as_uuid())));
}

#[tokio::test]
async fn replace_diffs_gestures() {
    let fx = fixture();
    fx.wear_mandatory_body_parts();
    let old_gesture = fx.seed_gesture_in(fx.closet, "old wave");
    fx.wear(old_gesture, "old wave link");
    let outfit = fx.seed_outfit_folder("Expressive");
    let new_gesture = fx.seed_gesture_in(outfit, "new bow");

    fx.confirm_soon();
    fx.engine.replace_outfit(outfit).await.unwrap();

    let calls = fx.appearance.calls();
    assert!(calls.contains(&AppearanceCall::DeactivateGesture(old_gesture)));
    assert!(calls.contains(&AppearanceCall::ActivateGesture(new_gesture)));
    let worn = fx.worn_targets();
    assert!(!worn.contains(&old_gesture));
    assert!(!worn.contains(&new_gesture));
}

#[tokio::test]
async fn replace_keeps_links_to_gestures_in_the_target_folder() {
    let fx = fixture();
    let recorder = Arc::new(Recording::default());
    fx.engine.add_policy(recorder.clone()).await;
    fx.wear_mandatory_body_parts();
    let outfit = fx.seed_outfit_folder("Expressive");
    let bow = fx.seed_gesture_in(outfit, "bow");
    fx.wear(bow, "bow link");

    fx.confirm_soon();
    fx.engine.replace_outfit(outfit).await.unwrap();

    // the link's target is in the accepted set, so it stays as-is
    assert!(fx.worn_targets().contains(&bow));
    assert!(!fx
        .appearance
        .calls()
        .contains(&AppearanceCall::DeactivateGesture(bow)));
    let reports = recorder.reports.lock().unwrap().clone();
    assert!(reports.iter().all(|(_, removed)| !removed.contains(&bow)));
}

#[tokio::test]
async fn replace_clamps_an_overfull_target_folder() {
    let fx = fixture();
    fx.wear_mandatory_body_parts();
    let hoard = fx.seed_outfit_folder("Hoard");
    for n in 0..MAX_CLOTHING_LAYERS + 5 {
        fx.seed_wearable_in(hoard, &format!("layer {n:03}"), WearableType::Tattoo);
    }
    for n in 0..MAX_ATTACHED_OBJECTS + 5 {
        fx.seed_object_in(hoard, &format!("gadget {n:03}"), AttachPoint(n as u8));
    }

    fx.confirm_soon();
    fx.engine.replace_outfit(hoard).await.unwrap();

    let mut clothing = 0;
    let mut objects = 0;
    for link in fx.store.children_of(fx.cof) {
        let Some(target) = link.link_target else { continue };
        if let Some(real) = fx.store.get(target).await {
            match real.asset_type {
                AssetType::Clothing => clothing += 1,
                AssetType::Object => objects += 1,
                _ => {}
            }
        }
    }
    assert_eq!(clothing, MAX_CLOTHING_LAYERS);
    assert_eq!(objects, MAX_ATTACHED_OBJECTS);
}

#[tokio::test]
async fn replace_confirmation_survives_a_busy_event_pump() {
    let fx = fixture();
    fx.wear_mandatory_body_parts();
    let gadget = fx.seed_object_in(fx.closet, "gadget", AttachPoint(4));
    fx.wear(gadget, "gadget link");
    let outfit = fx.seed_outfit_folder("Calm");
    fx.seed_wearable_in(outfit, "shirt", WearableType::Shirt);

    // one sequential pump delivers a kill notification and then the
    // confirmation; the kill handling must not stall the pump
    let engine = fx.engine.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(50)).await;
        engine
            .handle_server_event(ServerEvent::ObjectKilled { attach_item: Some(gadget) })
            .await;
        engine.handle_server_event(ServerEvent::AppearanceApplied).await;
    });

    fx.engine.replace_outfit(outfit).await.unwrap();
}

#[tokio::test]
async fn replace_reports_removals_then_additions() {
    let fx = fixture();
    let recorder = Arc::new(Recording::default());
    fx.engine.add_policy(recorder.clone()).await;
    fx.wear_mandatory_body_parts();
    let old_shirt = fx.seed_wearable("old shirt", WearableType::Shirt);
    fx.wear(old_shirt, "old shirt link");
    let outfit = fx.seed_outfit_folder("Fresh");
    let new_shirt = fx.seed_wearable_in(outfit, "new shirt", WearableType::Shirt);

    fx.confirm_soon();
    fx.engine.replace_outfit(outfit).await.unwrap();

    let reports = recorder.reports.lock().unwrap().clone();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0], (vec![], vec![old_shirt]));
    assert_eq!(reports[1], (vec![new_shirt], vec![]));
}
