//! Consent state machine.
//!
//! The controller owns the UI state and the preferences draft and is the
//! only component that writes to the [`ConsentStore`]. Every decisive action
//! funnels through `commit`, which persists before it notifies the tag
//! bridge: a reload between the two steps already sees the new record.

use std::sync::Arc;

use shared::{
    catalog::ProviderCatalog,
    domain::{Category, ConsentRecord, UiState},
    error::ConsentError,
    protocol::{ConsentEvent, UserAction},
};
use storage::ConsentStore;
use tag_bridge::TagBridge;
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_stream::{wrappers::errors::BroadcastStreamRecvError, StreamExt};
use tracing::{debug, error, info, warn};

use crate::{
    bus::EventBus,
    view::{render, UiCopy, ViewModel},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    Uninitialized,
    Mounted(UiState),
}

#[derive(Debug)]
struct ControllerState {
    phase: ControllerPhase,
    committed: Option<ConsentRecord>,
    draft: Option<ConsentRecord>,
    open_requested_before_mount: bool,
}

impl ControllerState {
    fn ui_state(&self) -> UiState {
        match self.phase {
            ControllerPhase::Uninitialized => UiState::Hidden,
            ControllerPhase::Mounted(ui_state) => ui_state,
        }
    }

    fn show_preferences(&mut self) {
        let seed = self.committed.unwrap_or_else(ConsentRecord::necessary_only);
        self.draft = Some(seed);
        self.phase = ControllerPhase::Mounted(UiState::PreferencesVisible);
    }
}

pub struct ConsentController {
    store: Arc<dyn ConsentStore>,
    bridge: TagBridge,
    bus: EventBus,
    inner: Mutex<ControllerState>,
}

impl ConsentController {
    pub fn new(store: Arc<dyn ConsentStore>, bridge: TagBridge, bus: EventBus) -> Arc<Self> {
        Arc::new(Self {
            store,
            bridge,
            bus,
            inner: Mutex::new(ControllerState {
                phase: ControllerPhase::Uninitialized,
                committed: None,
                draft: None,
                open_requested_before_mount: false,
            }),
        })
    }

    pub async fn phase(&self) -> ControllerPhase {
        self.inner.lock().await.phase
    }

    pub async fn ui_state(&self) -> UiState {
        self.inner.lock().await.ui_state()
    }

    pub async fn committed(&self) -> Option<ConsentRecord> {
        self.inner.lock().await.committed
    }

    pub async fn draft(&self) -> Option<ConsentRecord> {
        self.inner.lock().await.draft
    }

    /// Reads the stored decision once per page load. A stored record is
    /// applied silently; an absent one shows the banner. Mounting twice is a
    /// no-op.
    pub async fn mount(&self) -> UiState {
        let mut state = self.inner.lock().await;
        if let ControllerPhase::Mounted(ui_state) = state.phase {
            debug!(?ui_state, "consent: controller already mounted");
            return ui_state;
        }

        state.committed = self.store.read().await;
        state.phase = match state.committed {
            Some(record) => {
                self.bridge.apply(&record);
                info!("consent: stored decision applied at mount");
                ControllerPhase::Mounted(UiState::Hidden)
            }
            None => {
                info!("consent: no stored decision; showing banner");
                ControllerPhase::Mounted(UiState::BannerVisible)
            }
        };

        if std::mem::take(&mut state.open_requested_before_mount) {
            state.show_preferences();
        }
        state.ui_state()
    }

    pub async fn accept_all(&self) -> Result<UiState, ConsentError> {
        let mut state = self.inner.lock().await;
        self.commit(&mut state, ConsentRecord::accept_all()).await
    }

    pub async fn refuse_all(&self) -> Result<UiState, ConsentError> {
        let mut state = self.inner.lock().await;
        self.commit(&mut state, ConsentRecord::necessary_only()).await
    }

    /// Valid from any state. Before mount the request is remembered and
    /// honoured by `mount`.
    pub async fn open_preferences(&self) -> UiState {
        let mut state = self.inner.lock().await;
        if state.phase == ControllerPhase::Uninitialized {
            debug!("consent: preferences requested before mount");
            state.open_requested_before_mount = true;
            return UiState::Hidden;
        }
        state.show_preferences();
        UiState::PreferencesVisible
    }

    /// Flips one category in the draft. Never persists; `Necessary` and a
    /// missing draft are no-ops.
    pub async fn toggle_category(&self, category: Category) -> Option<ConsentRecord> {
        let mut state = self.inner.lock().await;
        if !category.is_mutable() {
            debug!(%category, "consent: ignoring toggle of locked category");
            return state.draft;
        }
        match state.draft.as_mut() {
            Some(draft) => {
                *draft = draft.toggled(category);
                Some(*draft)
            }
            None => {
                debug!(%category, "consent: toggle without open preferences ignored");
                None
            }
        }
    }

    pub async fn save_preferences(&self) -> Result<UiState, ConsentError> {
        let mut state = self.inner.lock().await;
        let Some(draft) = state.draft else {
            debug!("consent: save without open preferences ignored");
            return Ok(state.ui_state());
        };
        self.commit(&mut state, draft).await
    }

    /// Dismisses whatever is visible and drops the draft without persisting.
    pub async fn close(&self) -> UiState {
        let mut state = self.inner.lock().await;
        state.draft = None;
        state.open_requested_before_mount = false;
        if let ControllerPhase::Mounted(_) = state.phase {
            state.phase = ControllerPhase::Mounted(UiState::Hidden);
        }
        if state.committed.is_none() {
            info!(
                reason = %ConsentError::UserAbandonedFlow,
                "consent: dismissed without decision; will ask again next visit"
            );
        }
        UiState::Hidden
    }

    pub async fn dispatch(&self, action: UserAction) -> Result<UiState, ConsentError> {
        debug!(action = action.name(), "consent: user action");
        match action {
            UserAction::AcceptAll => self.accept_all().await,
            UserAction::RefuseAll => self.refuse_all().await,
            UserAction::OpenPreferences => Ok(self.open_preferences().await),
            UserAction::ToggleCategory { category } => {
                self.toggle_category(category).await;
                Ok(self.ui_state().await)
            }
            UserAction::SavePreferences => self.save_preferences().await,
            UserAction::Close => Ok(self.close().await),
        }
    }

    pub async fn handle_event(&self, event: ConsentEvent) {
        if let ConsentEvent::OpenCookiePreferences = event {
            self.open_preferences().await;
        }
    }

    /// Subscribes to the bus so launcher events open the preferences editor.
    /// The subscription exists once this returns. Abort the handle to stop
    /// listening.
    pub fn spawn_event_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.bus.stream();
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(item) = events.next().await {
                match item {
                    Ok(event) => controller.handle_event(event).await,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(skipped, "consent: controller listener lagged behind bus");
                    }
                }
            }
        })
    }

    pub async fn view(&self, catalog: &ProviderCatalog, copy: &UiCopy) -> Option<ViewModel> {
        let state = self.inner.lock().await;
        let record = state
            .draft
            .or(state.committed)
            .unwrap_or_else(ConsentRecord::necessary_only);
        render(state.ui_state(), &record, catalog, copy)
    }

    async fn commit(
        &self,
        state: &mut ControllerState,
        record: ConsentRecord,
    ) -> Result<UiState, ConsentError> {
        if let Err(err) = self.store.write(&record).await {
            error!(
                kind = ?err.kind(),
                error = %err,
                "consent: commit aborted; record not persisted"
            );
            return Err(err);
        }

        state.committed = Some(record);
        state.draft = None;
        state.open_requested_before_mount = false;
        state.phase = ControllerPhase::Mounted(UiState::Hidden);

        self.bridge.apply(&record);
        self.bus.publish(ConsentEvent::ConsentCommitted { record });
        if record.analytics() {
            self.bus.publish(ConsentEvent::AnalyticsConsentGranted);
        }
        info!(
            granted = ?record.granted_categories().collect::<Vec<_>>(),
            "consent: decision committed"
        );
        Ok(UiState::Hidden)
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
