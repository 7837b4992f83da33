use serde::Serialize;
use shared::protocol::ConsentEvent;

use crate::bus::EventBus;

/// Lets any page element ask for the preferences editor without holding a
/// controller. It only needs the bus, so it can be wired before the
/// controller exists.
#[derive(Debug, Clone)]
pub struct PreferencesLauncher {
    bus: EventBus,
    label: String,
    aria_label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LauncherView {
    pub label: String,
    pub aria_label: String,
}

impl PreferencesLauncher {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            label: "Gérer les cookies".to_string(),
            aria_label: "Ouvrir les préférences de cookies".to_string(),
        }
    }

    pub fn with_labels(mut self, label: impl Into<String>, aria_label: impl Into<String>) -> Self {
        self.label = label.into();
        self.aria_label = aria_label.into();
        self
    }

    /// Broadcasts `openCookiePreferences`. Returns the number of listeners reached.
    pub fn launch(&self) -> usize {
        self.bus.publish(ConsentEvent::OpenCookiePreferences)
    }

    pub fn view(&self) -> LauncherView {
        LauncherView {
            label: self.label.clone(),
            aria_label: self.aria_label.clone(),
        }
    }
}
