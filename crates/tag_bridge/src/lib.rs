use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use serde_json::{json, Value};
use shared::{domain::ConsentRecord, error::ConsentError};
use tracing::{debug, info, warn};

mod directives;
pub mod gtm;

pub use directives::{ConsentDirectives, ConsentStatus, StoragePurpose};
pub use gtm::GtmContainer;

/// Grace window the tag runtime waits for an explicit update before
/// proceeding with the denied defaults.
pub const DEFAULT_WAIT_FOR_UPDATE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentMode {
    Default,
    Update,
}

impl ConsentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ConsentMode::Default => "default",
            ConsentMode::Update => "update",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagCommand {
    Consent {
        mode: ConsentMode,
        directives: ConsentDirectives,
        wait_for_update: Option<Duration>,
    },
    Event {
        name: String,
        start_ms: i64,
    },
}

impl TagCommand {
    /// Data layer entry shape: `["consent", "update", {...}]` for consent
    /// commands, `{"gtm.start": .., "event": ..}` for events.
    pub fn to_wire(&self) -> Value {
        match self {
            TagCommand::Consent {
                mode,
                directives,
                wait_for_update,
            } => {
                let mut params = directives.to_wire();
                if let Some(wait) = wait_for_update {
                    params.insert("wait_for_update".into(), json!(wait.as_millis() as u64));
                }
                json!(["consent", mode.as_str(), params])
            }
            TagCommand::Event { name, start_ms } => json!({
                "gtm.start": start_ms,
                "event": name,
            }),
        }
    }
}

/// Sink for tag manager commands. Implementations must accept commands
/// whether or not the vendor script has loaded yet.
pub trait TagRuntime: Send + Sync {
    fn push(&self, command: TagCommand) -> anyhow::Result<()>;
}

/// Buffer standing in for the page's data layer until the runtime loads.
#[derive(Debug, Default)]
pub struct DataLayer {
    entries: Mutex<Vec<TagCommand>>,
}

impl DataLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<TagCommand> {
        self.lock().clone()
    }

    /// Hands every buffered command to a runtime that just finished loading.
    pub fn drain(&self) -> Vec<TagCommand> {
        std::mem::take(&mut *self.lock())
    }

    pub fn to_wire(&self) -> Vec<Value> {
        self.lock().iter().map(TagCommand::to_wire).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<TagCommand>> {
        // A poisoned buffer still holds valid commands.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TagRuntime for DataLayer {
    fn push(&self, command: TagCommand) -> anyhow::Result<()> {
        self.lock().push(command);
        Ok(())
    }
}

/// Translates consent records into tag runtime directives.
///
/// A missing runtime turns every call into a silent no-op; runtime errors
/// are logged and swallowed. Neither ever reaches the caller.
#[derive(Clone)]
pub struct TagBridge {
    runtime: Option<Arc<dyn TagRuntime>>,
    wait_for_update: Duration,
}

impl TagBridge {
    pub fn new(runtime: Arc<dyn TagRuntime>) -> Self {
        Self {
            runtime: Some(runtime),
            wait_for_update: DEFAULT_WAIT_FOR_UPDATE,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            runtime: None,
            wait_for_update: DEFAULT_WAIT_FOR_UPDATE,
        }
    }

    pub fn with_wait_for_update(mut self, wait_for_update: Duration) -> Self {
        self.wait_for_update = wait_for_update;
        self
    }

    pub fn is_available(&self) -> bool {
        self.runtime.is_some()
    }

    pub fn wait_for_update(&self) -> Duration {
        self.wait_for_update
    }

    /// Issues the default-deny directives. Call once, before any stored
    /// record is known and without waiting for the runtime to load.
    pub fn boot(&self) -> ConsentDirectives {
        let directives = ConsentDirectives::default_deny();
        self.issue(TagCommand::Consent {
            mode: ConsentMode::Default,
            directives: directives.clone(),
            wait_for_update: Some(self.wait_for_update),
        });
        directives
    }

    /// Issues the full mapping for `record` and returns it. Identical records
    /// always produce identical directives.
    pub fn apply(&self, record: &ConsentRecord) -> ConsentDirectives {
        let directives = ConsentDirectives::from_record(record);
        if self.issue(TagCommand::Consent {
            mode: ConsentMode::Update,
            directives: directives.clone(),
            wait_for_update: None,
        }) {
            info!(
                functional = record.functional(),
                analytics = record.analytics(),
                marketing = record.marketing(),
                "tag bridge: consent update issued"
            );
        }
        directives
    }

    pub fn push_event(&self, command: TagCommand) -> bool {
        self.issue(command)
    }

    fn issue(&self, command: TagCommand) -> bool {
        let Some(runtime) = &self.runtime else {
            debug!(reason = %ConsentError::BridgeUnavailable, "tag bridge: directive dropped");
            return false;
        };
        match runtime.push(command) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "tag bridge: runtime rejected directive");
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
