use std::sync::Mutex as StdMutex;
use std::time::Duration;

use super::*;
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use shared::error::ErrorKind;
use storage::{CookieConsentStore, CookieJar, MemoryCookieJar, SetCookie, CONSENT_COOKIE_NAME};
use tag_bridge::{ConsentDirectives, ConsentMode, DataLayer, TagCommand, TagRuntime};
use tokio::sync::broadcast::error::TryRecvError;

use crate::launcher::PreferencesLauncher;

type MemoryStore = CookieConsentStore<Arc<MemoryCookieJar>>;

struct Harness {
    jar: Arc<MemoryCookieJar>,
    store: Arc<MemoryStore>,
    layer: Arc<DataLayer>,
    bus: EventBus,
    controller: Arc<ConsentController>,
}

fn harness() -> Harness {
    let jar = Arc::new(MemoryCookieJar::new());
    let store = Arc::new(CookieConsentStore::new(jar.clone()));
    let layer = Arc::new(DataLayer::new());
    let bus = EventBus::new();
    let controller = ConsentController::new(
        store.clone(),
        TagBridge::new(layer.clone()),
        bus.clone(),
    );
    Harness {
        jar,
        store,
        layer,
        bus,
        controller,
    }
}

fn updates(layer: &DataLayer) -> Vec<ConsentDirectives> {
    layer
        .snapshot()
        .into_iter()
        .filter_map(|command| match command {
            TagCommand::Consent {
                mode: ConsentMode::Update,
                directives,
                ..
            } => Some(directives),
            _ => None,
        })
        .collect()
}

fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<ConsentEvent>) -> Vec<ConsentEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return events,
            Err(TryRecvError::Lagged(_)) => {}
        }
    }
}

struct RejectingJar;

#[async_trait]
impl CookieJar for RejectingJar {
    async fn get(&self, _name: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _cookie: &SetCookie) -> anyhow::Result<()> {
        Err(anyhow!("cookies are disabled"))
    }

    async fn remove(&self, _name: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Captures what the jar holds at the moment the bridge is notified.
struct StoreObservingRuntime {
    jar: Arc<MemoryCookieJar>,
    observed: StdMutex<Vec<Option<String>>>,
}

impl TagRuntime for StoreObservingRuntime {
    fn push(&self, _command: TagCommand) -> anyhow::Result<()> {
        let jar = self.jar.clone();
        let value = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(jar.raw_value(CONSENT_COOKIE_NAME))
        });
        self.observed.lock().expect("lock").push(value);
        Ok(())
    }
}

#[tokio::test]
async fn first_visit_shows_banner_and_accept_all_grants_everything() {
    let h = harness();

    assert_eq!(h.controller.phase().await, ControllerPhase::Uninitialized);
    assert_eq!(h.controller.mount().await, UiState::BannerVisible);
    assert!(updates(&h.layer).is_empty());

    let ui_state = h.controller.accept_all().await.expect("accept");
    assert_eq!(ui_state, UiState::Hidden);
    assert_eq!(h.controller.ui_state().await, UiState::Hidden);
    assert_eq!(h.store.read().await, Some(ConsentRecord::accept_all()));

    let issued = updates(&h.layer);
    assert_eq!(issued.len(), 1);
    assert_eq!(issued[0].granted().count(), 7);
}

#[tokio::test]
async fn stored_decision_is_applied_once_at_mount_without_banner() {
    let h = harness();
    let stored = ConsentRecord::new(false, true, false);
    h.store.write(&stored).await.expect("seed");

    assert_eq!(h.controller.mount().await, UiState::Hidden);
    assert_eq!(h.controller.committed().await, Some(stored));

    let issued = updates(&h.layer);
    assert_eq!(issued, vec![ConsentDirectives::from_record(&stored)]);
    assert!(h
        .controller
        .view(&ProviderCatalog::default(), &UiCopy::default())
        .await
        .is_none());
}

#[tokio::test]
async fn mounting_twice_does_not_reapply() {
    let h = harness();
    h.store
        .write(&ConsentRecord::accept_all())
        .await
        .expect("seed");

    h.controller.mount().await;
    h.controller.mount().await;
    assert_eq!(updates(&h.layer).len(), 1);
}

#[tokio::test]
async fn cancel_leaves_store_and_bridge_untouched() {
    let h = harness();
    let stored = ConsentRecord::necessary_only();
    h.store.write(&stored).await.expect("seed");
    h.controller.mount().await;

    assert_eq!(h.controller.open_preferences().await, UiState::PreferencesVisible);
    let draft = h
        .controller
        .toggle_category(Category::Marketing)
        .await
        .expect("draft");
    assert!(draft.marketing());

    assert_eq!(h.controller.close().await, UiState::Hidden);
    assert_eq!(h.controller.draft().await, None);
    assert_eq!(h.store.read().await, Some(stored));
    assert_eq!(updates(&h.layer).len(), 1, "only the mount-time apply");
}

#[tokio::test]
async fn malformed_cookie_shows_banner() {
    let h = harness();
    h.jar
        .insert_raw(
            CONSENT_COOKIE_NAME,
            "%7Bnot-json",
            Utc::now() + chrono::Duration::days(30),
        )
        .await;

    assert_eq!(h.controller.mount().await, UiState::BannerVisible);
    assert!(updates(&h.layer).is_empty());
}

#[tokio::test]
async fn refuse_all_persists_necessary_only() {
    let h = harness();
    h.controller.mount().await;

    h.controller.refuse_all().await.expect("refuse");
    assert_eq!(h.store.read().await, Some(ConsentRecord::necessary_only()));
    assert_eq!(updates(&h.layer), vec![ConsentDirectives::default_deny()]);
}

#[tokio::test]
async fn preferences_draft_starts_from_committed_record_or_default() {
    let h = harness();
    h.controller.mount().await;

    h.controller.open_preferences().await;
    assert_eq!(h.controller.draft().await, Some(ConsentRecord::necessary_only()));
    h.controller.close().await;

    let stored = ConsentRecord::new(true, false, true);
    h.store.write(&stored).await.expect("seed");
    let reloaded = ConsentController::new(
        h.store.clone(),
        TagBridge::new(h.layer.clone()),
        h.bus.clone(),
    );
    reloaded.mount().await;
    reloaded.open_preferences().await;
    assert_eq!(reloaded.draft().await, Some(stored));
}

#[tokio::test]
async fn toggling_necessary_is_a_no_op() {
    let h = harness();
    h.controller.mount().await;
    h.controller.open_preferences().await;

    let before = h.controller.draft().await;
    let after = h.controller.toggle_category(Category::Necessary).await;
    assert_eq!(before, after);
    assert!(after.is_some_and(|draft| draft.necessary()));
}

#[tokio::test]
async fn toggle_and_save_without_open_preferences_are_ignored() {
    let h = harness();
    h.controller.mount().await;

    assert_eq!(h.controller.toggle_category(Category::Analytics).await, None);
    assert_eq!(
        h.controller.save_preferences().await.expect("save"),
        UiState::BannerVisible
    );
    assert_eq!(h.store.read().await, None);
}

#[tokio::test]
async fn save_preferences_commits_the_draft() {
    let h = harness();
    h.controller.mount().await;
    h.controller.open_preferences().await;
    h.controller.toggle_category(Category::Functional).await;
    h.controller.toggle_category(Category::Marketing).await;

    assert_eq!(
        h.controller.save_preferences().await.expect("save"),
        UiState::Hidden
    );
    let expected = ConsentRecord::new(true, false, true);
    assert_eq!(h.store.read().await, Some(expected));
    assert_eq!(h.controller.committed().await, Some(expected));
    assert_eq!(h.controller.draft().await, None);
    assert_eq!(updates(&h.layer), vec![ConsentDirectives::from_record(&expected)]);
}

#[tokio::test]
async fn turning_analytics_off_then_saving_emits_no_analytics_event() {
    let h = harness();
    h.store
        .write(&ConsentRecord::accept_all())
        .await
        .expect("seed");
    h.controller.mount().await;
    let mut rx = h.bus.subscribe();

    h.controller.open_preferences().await;
    h.controller.toggle_category(Category::Analytics).await;
    h.controller.save_preferences().await.expect("save");

    let events = drain_events(&mut rx);
    assert!(!events.contains(&ConsentEvent::AnalyticsConsentGranted));
    assert_eq!(
        events,
        vec![ConsentEvent::ConsentCommitted {
            record: ConsentRecord::new(true, false, true)
        }]
    );
}

#[tokio::test]
async fn analytics_event_is_emitted_once_per_granting_commit() {
    let h = harness();
    h.controller.mount().await;
    let mut rx = h.bus.subscribe();

    h.controller.accept_all().await.expect("accept");
    let events = drain_events(&mut rx);
    let granted = events
        .iter()
        .filter(|event| **event == ConsentEvent::AnalyticsConsentGranted)
        .count();
    assert_eq!(granted, 1);

    // Re-saving with analytics still on notifies again.
    h.controller.open_preferences().await;
    h.controller.save_preferences().await.expect("save");
    let events = drain_events(&mut rx);
    assert!(events.contains(&ConsentEvent::AnalyticsConsentGranted));
}

#[tokio::test]
async fn dismissing_without_decision_keeps_consent_absent() {
    let h = harness();
    assert_eq!(h.controller.mount().await, UiState::BannerVisible);
    assert_eq!(h.controller.close().await, UiState::Hidden);
    assert_eq!(h.store.read().await, None);

    let next_page = ConsentController::new(
        h.store.clone(),
        TagBridge::new(h.layer.clone()),
        h.bus.clone(),
    );
    assert_eq!(next_page.mount().await, UiState::BannerVisible);
}

#[tokio::test]
async fn failed_write_skips_bridge_and_keeps_ui_open() {
    let store = Arc::new(CookieConsentStore::new(RejectingJar));
    let layer = Arc::new(DataLayer::new());
    let bus = EventBus::new();
    let mut rx = bus.subscribe();
    let controller = ConsentController::new(store, TagBridge::new(layer.clone()), bus);

    controller.mount().await;
    let err = controller.accept_all().await.expect_err("write must fail");
    assert!(matches!(err, ConsentError::StoreWrite(_)));
    assert_eq!(err.kind(), ErrorKind::StoreWrite);

    assert!(updates(&layer).is_empty());
    assert_eq!(controller.ui_state().await, UiState::BannerVisible);
    assert_eq!(controller.committed().await, None);
    assert!(drain_events(&mut rx).is_empty());
}

#[tokio::test]
async fn unavailable_bridge_does_not_block_commit() {
    let jar = Arc::new(MemoryCookieJar::new());
    let store = Arc::new(CookieConsentStore::new(jar));
    let controller =
        ConsentController::new(store.clone(), TagBridge::unavailable(), EventBus::new());

    controller.mount().await;
    assert_eq!(controller.accept_all().await.expect("accept"), UiState::Hidden);
    assert_eq!(store.read().await, Some(ConsentRecord::accept_all()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn record_is_persisted_before_bridge_is_notified() {
    let jar = Arc::new(MemoryCookieJar::new());
    let store = Arc::new(CookieConsentStore::new(jar.clone()));
    let runtime = Arc::new(StoreObservingRuntime {
        jar: jar.clone(),
        observed: StdMutex::new(Vec::new()),
    });
    let controller =
        ConsentController::new(store, TagBridge::new(runtime.clone()), EventBus::new());

    controller.mount().await;
    controller.refuse_all().await.expect("refuse");

    let observed = runtime.observed.lock().expect("lock");
    assert_eq!(observed.len(), 1);
    assert_eq!(
        observed[0].as_deref(),
        Some(storage::encode_record(&ConsentRecord::necessary_only()).as_str())
    );
}

#[tokio::test]
async fn open_request_before_mount_is_honoured_by_mount() {
    let h = harness();
    assert_eq!(h.controller.open_preferences().await, UiState::Hidden);
    assert_eq!(h.controller.mount().await, UiState::PreferencesVisible);
    assert_eq!(h.controller.draft().await, Some(ConsentRecord::necessary_only()));
}

#[tokio::test]
async fn dispatch_routes_ui_actions() {
    let h = harness();
    h.controller.mount().await;

    let steps = [
        (UserAction::OpenPreferences, UiState::PreferencesVisible),
        (
            UserAction::ToggleCategory {
                category: Category::Analytics,
            },
            UiState::PreferencesVisible,
        ),
        (UserAction::SavePreferences, UiState::Hidden),
    ];
    for (action, expected) in steps {
        assert_eq!(h.controller.dispatch(action).await.expect("dispatch"), expected);
    }
    assert_eq!(h.store.read().await, Some(ConsentRecord::new(false, true, false)));
}

#[tokio::test]
async fn launcher_event_opens_preferences_from_any_state() {
    let h = harness();
    h.store
        .write(&ConsentRecord::accept_all())
        .await
        .expect("seed");
    h.controller.mount().await;
    let listener = h.controller.spawn_event_listener();

    let launcher = PreferencesLauncher::new(h.bus.clone());
    assert_eq!(launcher.launch(), 1);

    let mut opened = false;
    for _ in 0..50 {
        if h.controller.ui_state().await == UiState::PreferencesVisible {
            opened = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    listener.abort();

    assert!(opened, "launcher event should open preferences");
    assert_eq!(h.controller.draft().await, Some(ConsentRecord::accept_all()));
}

#[tokio::test]
async fn launcher_without_listeners_is_not_an_error() {
    let launcher = PreferencesLauncher::new(EventBus::new());
    assert_eq!(launcher.launch(), 0);
    assert_eq!(launcher.view().label, "Gérer les cookies");
}

#[tokio::test]
async fn preferences_view_reflects_the_draft() {
    let h = harness();
    h.controller.mount().await;
    h.controller.open_preferences().await;
    h.controller.toggle_category(Category::Analytics).await;

    let Some(ViewModel::Preferences(view)) = h
        .controller
        .view(&ProviderCatalog::default(), &UiCopy::default())
        .await
    else {
        panic!("expected preferences view");
    };
    let analytics = view
        .categories
        .iter()
        .find(|row| row.category == Category::Analytics)
        .expect("analytics row");
    assert!(analytics.checked);
    assert!(!analytics.locked);
}
