//! Disclosure data for the preferences editor.
//!
//! The catalog lists, per category, the collectors a visitor is told about.
//! It never influences enforcement; the tag bridge only looks at the record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{domain::Category, error::ConsentError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collector {
    pub name: String,
    pub provider: String,
    pub purpose: String,
    pub retention_period: String,
    pub mechanism: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDisclosure {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub collectors: Vec<Collector>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CatalogWire", into = "CatalogWire")]
pub struct ProviderCatalog {
    categories: BTreeMap<Category, CategoryDisclosure>,
}

/// One table per category, so a catalog file missing a category fails to parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogWire {
    necessary: CategoryDisclosure,
    functional: CategoryDisclosure,
    analytics: CategoryDisclosure,
    marketing: CategoryDisclosure,
}

impl From<CatalogWire> for ProviderCatalog {
    fn from(wire: CatalogWire) -> Self {
        let categories = BTreeMap::from([
            (Category::Necessary, wire.necessary),
            (Category::Functional, wire.functional),
            (Category::Analytics, wire.analytics),
            (Category::Marketing, wire.marketing),
        ]);
        Self { categories }
    }
}

impl From<ProviderCatalog> for CatalogWire {
    fn from(mut catalog: ProviderCatalog) -> Self {
        let mut take = |category: Category| {
            catalog
                .categories
                .remove(&category)
                .unwrap_or_else(|| disclosure(category.as_str(), "", "", Vec::new()))
        };
        Self {
            necessary: take(Category::Necessary),
            functional: take(Category::Functional),
            analytics: take(Category::Analytics),
            marketing: take(Category::Marketing),
        }
    }
}

impl ProviderCatalog {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConsentError> {
        toml::from_str(raw).map_err(|err| ConsentError::InvalidCatalog(err.to_string()))
    }

    pub fn disclosure(&self, category: Category) -> Option<&CategoryDisclosure> {
        self.categories.get(&category)
    }

    pub fn collectors(&self, category: Category) -> &[Collector] {
        self.categories
            .get(&category)
            .map(|disclosure| disclosure.collectors.as_slice())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &CategoryDisclosure)> {
        self.categories
            .iter()
            .map(|(category, disclosure)| (*category, disclosure))
    }
}

fn collector(
    name: &str,
    provider: &str,
    purpose: &str,
    retention_period: &str,
    mechanism: &str,
) -> Collector {
    Collector {
        name: name.into(),
        provider: provider.into(),
        purpose: purpose.into(),
        retention_period: retention_period.into(),
        mechanism: mechanism.into(),
    }
}

fn disclosure(
    title: &str,
    icon: &str,
    description: &str,
    collectors: Vec<Collector>,
) -> CategoryDisclosure {
    CategoryDisclosure {
        title: title.into(),
        description: description.into(),
        icon: icon.into(),
        collectors,
    }
}

impl Default for ProviderCatalog {
    fn default() -> Self {
        let site = "Rénovation Lacombe Connely";
        let mut categories = BTreeMap::new();
        categories.insert(
            Category::Necessary,
            disclosure(
                "Nécessaires",
                "🔒",
                "Ces cookies sont essentiels au fonctionnement du site web et ne peuvent pas être désactivés.",
                vec![collector(
                    "Session Cookie",
                    site,
                    "Maintient votre session active lors de la navigation.",
                    "Session",
                    "HTTP Cookie",
                )],
            ),
        );
        categories.insert(
            Category::Functional,
            disclosure(
                "Fonctionnels",
                "⚙️",
                "Ces cookies améliorent les fonctionnalités du site web et votre expérience utilisateur.",
                vec![collector(
                    "Language Preference",
                    site,
                    "Mémorise votre préférence de langue.",
                    "1 an",
                    "HTTP Cookie",
                )],
            ),
        );
        categories.insert(
            Category::Analytics,
            disclosure(
                "Analytiques",
                "📊",
                "Ces cookies nous aident à comprendre comment les visiteurs interagissent avec notre site web.",
                vec![collector(
                    "Google Analytics",
                    "Google LLC",
                    "Analyse le trafic et l'utilisation du site web.",
                    "2 ans",
                    "HTTP Cookie",
                )],
            ),
        );
        categories.insert(
            Category::Marketing,
            disclosure(
                "Marketing",
                "📢",
                "Ces cookies sont utilisés pour diffuser des publicités pertinentes et mesurer l'efficacité des campagnes.",
                vec![collector(
                    "Facebook Pixel",
                    "Meta Platforms Inc.",
                    "Suivi des conversions et publicités ciblées.",
                    "90 jours",
                    "HTTP Cookie",
                )],
            ),
        );
        Self { categories }
    }
}

#[cfg(test)]
#[path = "tests/catalog_tests.rs"]
mod tests;
