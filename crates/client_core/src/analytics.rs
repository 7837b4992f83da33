use std::sync::Arc;

use shared::{domain::Category, protocol::ConsentEvent};
use storage::ConsentStore;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::bus::EventBus;

/// Lets an analytics bootstrap defer its own initialisation until the
/// visitor has granted analytics, either on a previous visit or right now.
///
/// The gate subscribes when it is created, so a commit landing between
/// creation and `wait` is not missed.
pub struct AnalyticsGate {
    store: Arc<dyn ConsentStore>,
    events: broadcast::Receiver<ConsentEvent>,
}

impl AnalyticsGate {
    pub fn new(store: Arc<dyn ConsentStore>, bus: &EventBus) -> Self {
        Self {
            store,
            events: bus.subscribe(),
        }
    }

    /// Resolves `true` once analytics is granted, `false` if every bus
    /// handle is dropped first.
    pub async fn wait(mut self) -> bool {
        if self.store.has_consented(Category::Analytics).await {
            debug!("analytics gate: consent already stored");
            return true;
        }

        loop {
            match self.events.recv().await {
                Ok(ConsentEvent::AnalyticsConsentGranted) => return true,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "analytics gate: lagged; re-checking stored consent");
                    if self.store.has_consented(Category::Analytics).await {
                        return true;
                    }
                }
                Err(RecvError::Closed) => return false,
            }
        }
    }
}
