use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shared::domain::{Category, ConsentRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoragePurpose {
    AnalyticsStorage,
    AdStorage,
    AdUserData,
    AdPersonalization,
    FunctionalityStorage,
    PersonalizationStorage,
    SecurityStorage,
}

impl StoragePurpose {
    pub const ALL: [StoragePurpose; 7] = [
        StoragePurpose::AnalyticsStorage,
        StoragePurpose::AdStorage,
        StoragePurpose::AdUserData,
        StoragePurpose::AdPersonalization,
        StoragePurpose::FunctionalityStorage,
        StoragePurpose::PersonalizationStorage,
        StoragePurpose::SecurityStorage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StoragePurpose::AnalyticsStorage => "analytics_storage",
            StoragePurpose::AdStorage => "ad_storage",
            StoragePurpose::AdUserData => "ad_user_data",
            StoragePurpose::AdPersonalization => "ad_personalization",
            StoragePurpose::FunctionalityStorage => "functionality_storage",
            StoragePurpose::PersonalizationStorage => "personalization_storage",
            StoragePurpose::SecurityStorage => "security_storage",
        }
    }

    /// The category gating this purpose. `None` means always granted.
    pub fn governing_category(self) -> Option<Category> {
        match self {
            StoragePurpose::AnalyticsStorage => Some(Category::Analytics),
            StoragePurpose::AdStorage
            | StoragePurpose::AdUserData
            | StoragePurpose::AdPersonalization => Some(Category::Marketing),
            StoragePurpose::FunctionalityStorage | StoragePurpose::PersonalizationStorage => {
                Some(Category::Functional)
            }
            StoragePurpose::SecurityStorage => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    Granted,
    Denied,
}

impl ConsentStatus {
    pub fn from_granted(granted: bool) -> Self {
        if granted {
            ConsentStatus::Granted
        } else {
            ConsentStatus::Denied
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConsentStatus::Granted => "granted",
            ConsentStatus::Denied => "denied",
        }
    }
}

/// Full purpose → status mapping. Always covers every purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsentDirectives(BTreeMap<StoragePurpose, ConsentStatus>);

impl ConsentDirectives {
    pub fn from_record(record: &ConsentRecord) -> Self {
        Self::from_fn(|category| record.get(category))
    }

    /// Boot-time policy: everything denied except security storage.
    pub fn default_deny() -> Self {
        Self::from_fn(|_| false)
    }

    fn from_fn(granted: impl Fn(Category) -> bool) -> Self {
        Self(
            StoragePurpose::ALL
                .into_iter()
                .map(|purpose| {
                    let status = match purpose.governing_category() {
                        Some(category) => ConsentStatus::from_granted(granted(category)),
                        None => ConsentStatus::Granted,
                    };
                    (purpose, status)
                })
                .collect(),
        )
    }

    pub fn status(&self, purpose: StoragePurpose) -> ConsentStatus {
        self.0
            .get(&purpose)
            .copied()
            .unwrap_or(ConsentStatus::Denied)
    }

    pub fn iter(&self) -> impl Iterator<Item = (StoragePurpose, ConsentStatus)> + '_ {
        self.0.iter().map(|(purpose, status)| (*purpose, *status))
    }

    pub fn granted(&self) -> impl Iterator<Item = StoragePurpose> + '_ {
        self.iter()
            .filter(|(_, status)| *status == ConsentStatus::Granted)
            .map(|(purpose, _)| purpose)
    }

    /// Wire object as gtag expects it: `{"ad_storage": "denied", ...}`.
    pub fn to_wire(&self) -> serde_json::Map<String, serde_json::Value> {
        self.iter()
            .map(|(purpose, status)| {
                (
                    purpose.as_str().to_string(),
                    serde_json::Value::from(status.as_str()),
                )
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "tests/directives_tests.rs"]
mod tests;
