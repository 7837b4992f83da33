//! Pure mapping from controller state to what a UI layer should draw.

use serde::{Deserialize, Serialize};
use shared::{
    catalog::{Collector, ProviderCatalog},
    domain::{Category, ConsentRecord, UiState},
    protocol::UserAction,
};

/// Visible strings. Defaults are the site's French copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiCopy {
    pub banner_text: String,
    pub settings_label: String,
    pub refuse_label: String,
    pub accept_label: String,
    pub close_label: String,
    pub preferences_title: String,
    pub cancel_label: String,
    pub save_label: String,
    pub policy_label: String,
    pub policy_url: String,
    pub launcher_label: String,
    pub launcher_aria_label: String,
}

impl Default for UiCopy {
    fn default() -> Self {
        Self {
            banner_text: "En cliquant sur \"Accepter\", vous consentez à l'utilisation de cookies pour améliorer votre expérience, analyser le trafic et personnaliser le contenu.".into(),
            settings_label: "Paramètres".into(),
            refuse_label: "Refuser".into(),
            accept_label: "Accepter".into(),
            close_label: "Fermer".into(),
            preferences_title: "Préférences de cookies".into(),
            cancel_label: "Annuler".into(),
            save_label: "Sauvegarder".into(),
            policy_label: "Politique de cookies".into(),
            policy_url: "/politique-de-cookie".into(),
            launcher_label: "Gérer les cookies".into(),
            launcher_aria_label: "Ouvrir les préférences de cookies".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionView {
    pub action: UserAction,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyLink {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BannerView {
    pub text: String,
    pub actions: Vec<ActionView>,
    pub policy: PolicyLink,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryView {
    pub category: Category,
    pub title: String,
    pub description: String,
    pub icon: String,
    pub checked: bool,
    /// Rendered as a disabled toggle. The controller ignores toggles on it regardless.
    pub locked: bool,
    pub collectors: Vec<Collector>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreferencesView {
    pub title: String,
    pub categories: Vec<CategoryView>,
    pub actions: Vec<ActionView>,
    pub policy: PolicyLink,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewModel {
    Banner(BannerView),
    Preferences(PreferencesView),
}

/// `record` is the draft while editing preferences; it is ignored for the banner.
pub fn render(
    ui_state: UiState,
    record: &ConsentRecord,
    catalog: &ProviderCatalog,
    copy: &UiCopy,
) -> Option<ViewModel> {
    let policy = PolicyLink {
        label: copy.policy_label.clone(),
        url: copy.policy_url.clone(),
    };
    match ui_state {
        UiState::Hidden => None,
        UiState::BannerVisible => Some(ViewModel::Banner(BannerView {
            text: copy.banner_text.clone(),
            actions: vec![
                action(UserAction::OpenPreferences, &copy.settings_label),
                action(UserAction::RefuseAll, &copy.refuse_label),
                action(UserAction::AcceptAll, &copy.accept_label),
                action(UserAction::Close, &copy.close_label),
            ],
            policy,
        })),
        UiState::PreferencesVisible => Some(ViewModel::Preferences(PreferencesView {
            title: copy.preferences_title.clone(),
            categories: Category::ALL
                .into_iter()
                .map(|category| category_view(category, record, catalog))
                .collect(),
            actions: vec![
                action(UserAction::Close, &copy.cancel_label),
                action(UserAction::SavePreferences, &copy.save_label),
            ],
            policy,
        })),
    }
}

fn action(action: UserAction, label: &str) -> ActionView {
    ActionView {
        action,
        label: label.to_string(),
    }
}

fn category_view(
    category: Category,
    record: &ConsentRecord,
    catalog: &ProviderCatalog,
) -> CategoryView {
    let disclosure = catalog.disclosure(category);
    CategoryView {
        category,
        title: disclosure
            .map(|d| d.title.clone())
            .unwrap_or_else(|| category.as_str().to_string()),
        description: disclosure
            .map(|d| d.description.clone())
            .unwrap_or_default(),
        icon: disclosure.map(|d| d.icon.clone()).unwrap_or_default(),
        checked: record.get(category),
        locked: !category.is_mutable(),
        collectors: catalog.collectors(category).to_vec(),
    }
}

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod tests;
