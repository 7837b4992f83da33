use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConsentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Necessary,
    Functional,
    Analytics,
    Marketing,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Necessary,
        Category::Functional,
        Category::Analytics,
        Category::Marketing,
    ];

    /// `Necessary` can never be switched off, in any record, draft or UI.
    pub const fn is_mutable(self) -> bool {
        !matches!(self, Category::Necessary)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Necessary => "necessary",
            Category::Functional => "functional",
            Category::Analytics => "analytics",
            Category::Marketing => "marketing",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = ConsentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConsentError::UnknownCategory(s.to_string()))
    }
}

/// A visitor's committed (or drafted) decision for the four categories.
///
/// There is no field for `necessary`: it is `true` by construction, so no
/// mutation path can produce a record that denies strictly necessary storage.
/// The wire form still carries `"necessary": true` and a value claiming
/// `false` is rejected on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "ConsentRecordWire", into = "ConsentRecordWire")]
pub struct ConsentRecord {
    functional: bool,
    analytics: bool,
    marketing: bool,
}

impl ConsentRecord {
    pub const fn new(functional: bool, analytics: bool, marketing: bool) -> Self {
        Self {
            functional,
            analytics,
            marketing,
        }
    }

    /// Only strictly necessary storage; also the draft seed when nothing was committed yet.
    pub const fn necessary_only() -> Self {
        Self::new(false, false, false)
    }

    pub const fn accept_all() -> Self {
        Self::new(true, true, true)
    }

    pub const fn necessary(&self) -> bool {
        true
    }

    pub const fn functional(&self) -> bool {
        self.functional
    }

    pub const fn analytics(&self) -> bool {
        self.analytics
    }

    pub const fn marketing(&self) -> bool {
        self.marketing
    }

    pub fn get(&self, category: Category) -> bool {
        match category {
            Category::Necessary => true,
            Category::Functional => self.functional,
            Category::Analytics => self.analytics,
            Category::Marketing => self.marketing,
        }
    }

    /// Returns a copy with `category` set to `granted`. Setting `Necessary` is ignored.
    #[must_use]
    pub fn with(mut self, category: Category, granted: bool) -> Self {
        match category {
            Category::Necessary => {}
            Category::Functional => self.functional = granted,
            Category::Analytics => self.analytics = granted,
            Category::Marketing => self.marketing = granted,
        }
        self
    }

    #[must_use]
    pub fn toggled(self, category: Category) -> Self {
        let current = self.get(category);
        self.with(category, !current)
    }

    pub fn granted_categories(&self) -> impl Iterator<Item = Category> + '_ {
        Category::ALL
            .into_iter()
            .filter(move |category| self.get(*category))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct ConsentRecordWire {
    necessary: bool,
    functional: bool,
    analytics: bool,
    marketing: bool,
}

impl TryFrom<ConsentRecordWire> for ConsentRecord {
    type Error = ConsentError;

    fn try_from(wire: ConsentRecordWire) -> Result<Self, Self::Error> {
        if !wire.necessary {
            return Err(ConsentError::NecessaryDenied);
        }
        Ok(Self::new(wire.functional, wire.analytics, wire.marketing))
    }
}

impl From<ConsentRecord> for ConsentRecordWire {
    fn from(record: ConsentRecord) -> Self {
        Self {
            necessary: true,
            functional: record.functional,
            analytics: record.analytics,
            marketing: record.marketing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiState {
    #[default]
    Hidden,
    BannerVisible,
    PreferencesVisible,
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
