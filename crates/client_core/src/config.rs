use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use chrono::Duration;
use serde::Deserialize;
use storage::{CONSENT_COOKIE_NAME, CONSENT_MAX_AGE_DAYS};
use tracing::warn;

pub const DEFAULT_SETTINGS_FILE: &str = "consent.toml";
pub const DEFAULT_JAR_URL: &str = "sqlite://./data/cookies.db";

/// Browsers clamp cookie lifetimes to 400 days.
pub const MAX_COOKIE_AGE_DAYS: i64 = 400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentSettings {
    pub cookie_name: String,
    pub max_age_days: i64,
    pub wait_for_update_ms: u64,
    pub gtm_id: Option<String>,
    pub database_url: String,
    pub policy_url: String,
    pub catalog_path: Option<PathBuf>,
}

impl Default for ConsentSettings {
    fn default() -> Self {
        Self {
            cookie_name: CONSENT_COOKIE_NAME.into(),
            max_age_days: CONSENT_MAX_AGE_DAYS,
            wait_for_update_ms: 500,
            gtm_id: None,
            database_url: DEFAULT_JAR_URL.into(),
            policy_url: "/politique-de-cookie".into(),
            catalog_path: None,
        }
    }
}

impl ConsentSettings {
    /// Lifetime of the consent cookie. Zero expires it immediately.
    pub fn cookie_max_age(&self) -> anyhow::Result<Duration> {
        if !(0..=MAX_COOKIE_AGE_DAYS).contains(&self.max_age_days) {
            bail!(
                "cookie max age of {} days is outside 0..={MAX_COOKIE_AGE_DAYS}",
                self.max_age_days
            );
        }
        Duration::try_days(self.max_age_days).context("cookie max age overflows")
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    cookie_name: Option<String>,
    max_age_days: Option<i64>,
    wait_for_update_ms: Option<u64>,
    gtm_id: Option<String>,
    database_url: Option<String>,
    policy_url: Option<String>,
    catalog_path: Option<PathBuf>,
}

/// Defaults, then `consent.toml` in the working directory, then environment.
pub fn load_settings() -> ConsentSettings {
    let mut settings = ConsentSettings::default();
    if let Ok(raw) = fs::read_to_string(DEFAULT_SETTINGS_FILE) {
        if let Ok(file_cfg) = toml::from_str::<SettingsFile>(&raw) {
            apply_file(&mut settings, file_cfg);
        }
    }
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    if let Err(err) = settings.cookie_max_age() {
        warn!(error = %err, "consent settings: falling back to default cookie max age");
        settings.max_age_days = CONSENT_MAX_AGE_DAYS;
    }
    settings
}

/// Like [`load_settings`] but with an explicit file that must exist and parse.
pub fn load_settings_from(path: &Path) -> anyhow::Result<ConsentSettings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
    let file_cfg = toml::from_str::<SettingsFile>(&raw)
        .with_context(|| format!("failed to parse settings file '{}'", path.display()))?;

    let mut settings = ConsentSettings::default();
    apply_file(&mut settings, file_cfg);
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings
        .cookie_max_age()
        .with_context(|| format!("invalid settings file '{}'", path.display()))?;
    Ok(settings)
}

fn apply_file(settings: &mut ConsentSettings, file_cfg: SettingsFile) {
    if let Some(v) = file_cfg.cookie_name {
        settings.cookie_name = v;
    }
    if let Some(v) = file_cfg.max_age_days {
        settings.max_age_days = v;
    }
    if let Some(v) = file_cfg.wait_for_update_ms {
        settings.wait_for_update_ms = v;
    }
    if let Some(v) = file_cfg.gtm_id {
        settings.gtm_id = Some(v);
    }
    if let Some(v) = file_cfg.database_url {
        settings.database_url = v;
    }
    if let Some(v) = file_cfg.policy_url {
        settings.policy_url = v;
    }
    if let Some(v) = file_cfg.catalog_path {
        settings.catalog_path = Some(v);
    }
}

pub(crate) fn apply_env_overrides(
    settings: &mut ConsentSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup("CONSENT_COOKIE_NAME") {
        settings.cookie_name = v;
    }
    if let Some(v) = lookup("APP__COOKIE_NAME") {
        settings.cookie_name = v;
    }

    if let Some(v) = lookup("APP__COOKIE_MAX_AGE_DAYS") {
        if let Ok(parsed) = v.parse::<i64>() {
            settings.max_age_days = parsed;
        }
    }

    if let Some(v) = lookup("APP__WAIT_FOR_UPDATE_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.wait_for_update_ms = parsed;
        }
    }

    if let Some(v) = lookup("GTM_ID") {
        settings.gtm_id = Some(v);
    }
    if let Some(v) = lookup("APP__GTM_ID") {
        settings.gtm_id = Some(v);
    }

    if let Some(v) = lookup("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = lookup("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = lookup("APP__POLICY_URL") {
        settings.policy_url = v;
    }

    if let Some(v) = lookup("APP__CATALOG_PATH") {
        settings.catalog_path = Some(PathBuf::from(v));
    }
}

/// Cookie jar location as a `sqlx` URL. Bare paths and `sqlite:` paths
/// become `sqlite://`; blank means the default jar.
pub fn normalize_database_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return DEFAULT_JAR_URL.to_string();
    }
    if raw.contains("://") || raw.starts_with("sqlite::memory:") {
        return raw.to_string();
    }

    let path = raw.strip_prefix("sqlite:").unwrap_or(raw);
    format!("sqlite://{}", path.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
