//! Google Tag Manager container loading.
//!
//! Loading the container is independent of consent: the default-deny
//! directives are already queued in the data layer by the time the script
//! runs, so the runtime picks them up whenever it arrives.

use chrono::Utc;
use shared::error::ConsentError;
use url::Url;

use crate::{TagBridge, TagCommand};

const GTM_SCRIPT_URL: &str = "https://www.googletagmanager.com/gtm.js";
const GTM_NOSCRIPT_URL: &str = "https://www.googletagmanager.com/ns.html";
const PLACEHOLDER_ID: &str = "GTM-XXXXXXX";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GtmContainer {
    id: String,
    data_layer: String,
}

impl GtmContainer {
    pub fn parse(id: &str) -> Result<Self, ConsentError> {
        let id = id.trim();
        let valid = id.strip_prefix("GTM-").is_some_and(|suffix| {
            !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_alphanumeric())
        });
        if !valid || id == PLACEHOLDER_ID {
            return Err(ConsentError::InvalidContainerId(id.to_string()));
        }
        Ok(Self {
            id: id.to_string(),
            data_layer: "dataLayer".to_string(),
        })
    }

    pub fn with_data_layer(mut self, name: impl Into<String>) -> Self {
        self.data_layer = name.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Loader URL; a non-default data layer name travels as `l=`.
    pub fn script_url(&self) -> Result<Url, url::ParseError> {
        let mut params = vec![("id", self.id.as_str())];
        if self.data_layer != "dataLayer" {
            params.push(("l", self.data_layer.as_str()));
        }
        Url::parse_with_params(GTM_SCRIPT_URL, &params)
    }

    /// Source of the hidden iframe served to visitors without scripts.
    pub fn noscript_url(&self) -> Result<Url, url::ParseError> {
        Url::parse_with_params(GTM_NOSCRIPT_URL, &[("id", self.id.as_str())])
    }

    pub fn bootstrap_event(&self) -> TagCommand {
        TagCommand::Event {
            name: "gtm.js".to_string(),
            start_ms: Utc::now().timestamp_millis(),
        }
    }

    /// Queues the container start event behind whatever consent directives
    /// are already buffered.
    pub fn start(&self, bridge: &TagBridge) -> bool {
        bridge.push_event(self.bootstrap_event())
    }
}

#[cfg(test)]
#[path = "tests/gtm_tests.rs"]
mod tests;
