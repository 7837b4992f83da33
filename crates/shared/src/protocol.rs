use serde::{Deserialize, Serialize};

use crate::domain::{Category, ConsentRecord};

pub const OPEN_COOKIE_PREFERENCES: &str = "openCookiePreferences";
pub const ANALYTICS_CONSENT_GRANTED: &str = "analytics_consent_granted";
pub const CONSENT_COMMITTED: &str = "consent_committed";

/// Closed set of topics carried by the consent bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ConsentEvent {
    #[serde(rename = "openCookiePreferences")]
    OpenCookiePreferences,
    #[serde(rename = "analytics_consent_granted")]
    AnalyticsConsentGranted,
    #[serde(rename = "consent_committed")]
    ConsentCommitted { record: ConsentRecord },
}

impl ConsentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ConsentEvent::OpenCookiePreferences => OPEN_COOKIE_PREFERENCES,
            ConsentEvent::AnalyticsConsentGranted => ANALYTICS_CONSENT_GRANTED,
            ConsentEvent::ConsentCommitted { .. } => CONSENT_COMMITTED,
        }
    }
}

/// Actions a UI layer forwards to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum UserAction {
    AcceptAll,
    RefuseAll,
    OpenPreferences,
    ToggleCategory { category: Category },
    SavePreferences,
    Close,
}

impl UserAction {
    pub fn name(&self) -> &'static str {
        match self {
            UserAction::AcceptAll => "accept_all",
            UserAction::RefuseAll => "refuse_all",
            UserAction::OpenPreferences => "open_preferences",
            UserAction::ToggleCategory { .. } => "toggle_category",
            UserAction::SavePreferences => "save_preferences",
            UserAction::Close => "close",
        }
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
