use std::{fs, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use shared::{catalog::ProviderCatalog, domain::UiState, protocol::UserAction};
use storage::{ConsentStore, CookieConsentStore, SqliteCookieJar};
use tag_bridge::{DataLayer, GtmContainer, TagBridge};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, info, warn};

pub mod analytics;
pub mod bus;
pub mod config;
pub mod controller;
pub mod launcher;
pub mod view;

pub use analytics::AnalyticsGate;
pub use bus::EventBus;
pub use config::{load_settings, load_settings_from, normalize_database_url, ConsentSettings};
pub use controller::{ConsentController, ControllerPhase};
pub use launcher::{LauncherView, PreferencesLauncher};
pub use view::{render, UiCopy, ViewModel};

/// Everything the consent subsystem needs for one page load, built once at
/// startup and handed to whoever needs a piece of it.
///
/// The controller listens for launcher events from construction on, so a
/// launcher clicked before `start` still opens the preferences editor.
/// Dropping the context stops that listener.
pub struct ConsentContext {
    bus: EventBus,
    store: Arc<dyn ConsentStore>,
    data_layer: Arc<DataLayer>,
    bridge: TagBridge,
    controller: Arc<ConsentController>,
    launcher: PreferencesLauncher,
    container: Option<GtmContainer>,
    catalog: ProviderCatalog,
    copy: UiCopy,
    listener: JoinHandle<()>,
}

impl ConsentContext {
    /// Must be called from within a tokio runtime.
    pub fn new(settings: &ConsentSettings, store: Arc<dyn ConsentStore>) -> Result<Self> {
        Handle::try_current().context("consent context needs a running tokio runtime")?;

        let catalog = match &settings.catalog_path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("failed to read catalog '{}'", path.display()))?;
                ProviderCatalog::from_toml_str(&raw)
                    .with_context(|| format!("failed to load catalog '{}'", path.display()))?
            }
            None => ProviderCatalog::default(),
        };

        let container = settings
            .gtm_id
            .as_deref()
            .and_then(|id| match GtmContainer::parse(id) {
                Ok(container) => Some(container),
                Err(err) => {
                    warn!(error = %err, "consent: tag manager container not loaded");
                    None
                }
            });

        let bus = EventBus::new();
        let data_layer = Arc::new(DataLayer::new());
        let bridge = TagBridge::new(data_layer.clone())
            .with_wait_for_update(Duration::from_millis(settings.wait_for_update_ms));
        let controller = ConsentController::new(store.clone(), bridge.clone(), bus.clone());
        let copy = UiCopy {
            policy_url: settings.policy_url.clone(),
            ..UiCopy::default()
        };
        let launcher = PreferencesLauncher::new(bus.clone())
            .with_labels(copy.launcher_label.clone(), copy.launcher_aria_label.clone());
        let listener = controller.spawn_event_listener();

        Ok(Self {
            bus,
            store,
            data_layer,
            bridge,
            controller,
            launcher,
            container,
            catalog,
            copy,
            listener,
        })
    }

    /// Context over a durable SQLite cookie jar at `settings.database_url`.
    pub async fn open(settings: &ConsentSettings) -> Result<Self> {
        let max_age = settings.cookie_max_age()?;
        let database_url = normalize_database_url(&settings.database_url);
        let jar = SqliteCookieJar::new(&database_url).await?;
        let store = CookieConsentStore::new(jar)
            .with_cookie_name(settings.cookie_name.clone())
            .with_max_age(max_age);
        Self::new(settings, Arc::new(store))
    }

    /// Page-load sequence: default-deny first, then the stored decision (if
    /// any), then the container start event. Never waits on the tag runtime.
    pub async fn start(&self) -> UiState {
        self.bridge.boot();
        let ui_state = self.controller.mount().await;
        if let Some(container) = &self.container {
            if container.start(&self.bridge) {
                info!(container = container.id(), "consent: tag manager container queued");
            }
        }
        ui_state
    }

    pub async fn dispatch(&self, action: UserAction) -> Result<UiState> {
        Ok(self.controller.dispatch(action).await?)
    }

    pub async fn view(&self) -> Option<ViewModel> {
        self.controller.view(&self.catalog, &self.copy).await
    }

    pub fn analytics_gate(&self) -> AnalyticsGate {
        AnalyticsGate::new(self.store.clone(), &self.bus)
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn store(&self) -> &Arc<dyn ConsentStore> {
        &self.store
    }

    pub fn data_layer(&self) -> &Arc<DataLayer> {
        &self.data_layer
    }

    pub fn bridge(&self) -> &TagBridge {
        &self.bridge
    }

    pub fn controller(&self) -> &Arc<ConsentController> {
        &self.controller
    }

    pub fn launcher(&self) -> &PreferencesLauncher {
        &self.launcher
    }

    pub fn container(&self) -> Option<&GtmContainer> {
        self.container.as_ref()
    }

    pub fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }

    pub fn copy(&self) -> &UiCopy {
        &self.copy
    }
}

impl Drop for ConsentContext {
    fn drop(&mut self) {
        debug!("consent: stopping controller listener");
        self.listener.abort();
    }
}
