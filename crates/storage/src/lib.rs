use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use tracing::{debug, warn};

use shared::{
    domain::{Category, ConsentRecord},
    error::ConsentError,
};

pub mod cookie;
mod memory;

pub use cookie::{
    decode_record, encode_record, find_cookie, SameSite, SetCookie, CONSENT_COOKIE_NAME,
    CONSENT_MAX_AGE_DAYS,
};
pub use memory::MemoryCookieJar;

/// Raw cookie backend. Implementations own expiry: `get` never returns a
/// value past its `Max-Age`.
#[async_trait]
pub trait CookieJar: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<String>>;
    async fn set(&self, cookie: &SetCookie) -> Result<()>;
    async fn remove(&self, name: &str) -> Result<()>;
}

#[async_trait]
impl<J: CookieJar + ?Sized> CookieJar for Arc<J> {
    async fn get(&self, name: &str) -> Result<Option<String>> {
        (**self).get(name).await
    }

    async fn set(&self, cookie: &SetCookie) -> Result<()> {
        (**self).set(cookie).await
    }

    async fn remove(&self, name: &str) -> Result<()> {
        (**self).remove(name).await
    }
}

/// The only read/write boundary to the persisted consent decision.
#[async_trait]
pub trait ConsentStore: Send + Sync {
    /// `None` when nothing usable is stored. Never fails: unreadable values
    /// are logged and reported as absent so the visitor is asked again.
    async fn read(&self) -> Option<ConsentRecord>;

    /// Replaces the whole persisted record.
    async fn write(&self, record: &ConsentRecord) -> std::result::Result<(), ConsentError>;

    async fn clear(&self) -> std::result::Result<(), ConsentError>;

    async fn has_consented(&self, category: Category) -> bool {
        self.read()
            .await
            .is_some_and(|record| record.get(category))
    }
}

#[async_trait]
impl<S: ConsentStore + ?Sized> ConsentStore for Arc<S> {
    async fn read(&self) -> Option<ConsentRecord> {
        (**self).read().await
    }

    async fn write(&self, record: &ConsentRecord) -> std::result::Result<(), ConsentError> {
        (**self).write(record).await
    }

    async fn clear(&self) -> std::result::Result<(), ConsentError> {
        (**self).clear().await
    }
}

pub struct CookieConsentStore<J: CookieJar> {
    jar: J,
    cookie_name: String,
    max_age: Duration,
}

impl<J: CookieJar> CookieConsentStore<J> {
    pub fn new(jar: J) -> Self {
        Self {
            jar,
            cookie_name: CONSENT_COOKIE_NAME.to_string(),
            max_age: Duration::days(CONSENT_MAX_AGE_DAYS),
        }
    }

    pub fn with_cookie_name(mut self, cookie_name: impl Into<String>) -> Self {
        self.cookie_name = cookie_name.into();
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn jar(&self) -> &J {
        &self.jar
    }

    /// The cookie `write` would persist for `record`.
    pub fn set_cookie(&self, record: &ConsentRecord) -> SetCookie {
        SetCookie::consent(&self.cookie_name, record, self.max_age)
    }
}

#[async_trait]
impl<J: CookieJar> ConsentStore for CookieConsentStore<J> {
    async fn read(&self) -> Option<ConsentRecord> {
        let raw = match self.jar.get(&self.cookie_name).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(
                    cookie = %self.cookie_name,
                    error = %format!("{err:#}"),
                    "consent: cookie jar read failed; treating consent as absent"
                );
                return None;
            }
        };

        match decode_record(&raw) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(
                    cookie = %self.cookie_name,
                    kind = ?err.kind(),
                    error = %err,
                    "consent: stored value is malformed; treating consent as absent"
                );
                None
            }
        }
    }

    async fn write(&self, record: &ConsentRecord) -> std::result::Result<(), ConsentError> {
        let cookie = self.set_cookie(record);
        self.jar
            .set(&cookie)
            .await
            .map_err(|err| ConsentError::StoreWrite(format!("{err:#}")))?;
        debug!(cookie = %cookie.header_value(), "consent: record persisted");
        Ok(())
    }

    async fn clear(&self) -> std::result::Result<(), ConsentError> {
        self.jar
            .remove(&self.cookie_name)
            .await
            .map_err(|err| ConsentError::StoreWrite(format!("{err:#}")))
    }
}

/// Durable jar for embedders without a browser cookie store.
#[derive(Clone)]
pub struct SqliteCookieJar {
    pool: Pool<Sqlite>,
}

impl SqliteCookieJar {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_jar_directory(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid cookie jar database url '{database_url}'"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await
            .context("failed to open cookie jar database")?;
        let jar = Self { pool };
        jar.ensure_cookie_table().await?;
        Ok(jar)
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_cookie_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cookie_jar (
                name        TEXT PRIMARY KEY NOT NULL,
                value       TEXT NOT NULL,
                path        TEXT NOT NULL,
                same_site   TEXT NOT NULL,
                expires_at  INTEGER NOT NULL,
                updated_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure cookie_jar table exists")?;
        Ok(())
    }

    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cookie_jar WHERE expires_at <= ?")
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await
            .context("failed to purge expired cookies")?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CookieJar for SqliteCookieJar {
    async fn get(&self, name: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM cookie_jar WHERE name = ? AND expires_at > ?")
            .bind(name)
            .bind(Utc::now().timestamp_millis())
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read cookie '{name}'"))?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    async fn set(&self, cookie: &SetCookie) -> Result<()> {
        let expires_at = cookie
            .expires_at(Utc::now())
            .with_context(|| format!("max-age of cookie '{}' is out of range", cookie.name))?
            .timestamp_millis();
        sqlx::query(
            "INSERT INTO cookie_jar (name, value, path, same_site, expires_at, updated_at)
             VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(name) DO UPDATE SET
                value = excluded.value,
                path = excluded.path,
                same_site = excluded.same_site,
                expires_at = excluded.expires_at,
                updated_at = CURRENT_TIMESTAMP",
        )
        .bind(&cookie.name)
        .bind(&cookie.value)
        .bind(&cookie.path)
        .bind(cookie.same_site.as_str())
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write cookie '{}'", cookie.name))?;
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM cookie_jar WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to remove cookie '{name}'"))?;
        Ok(())
    }
}

fn ensure_jar_directory(database_url: &str) -> Result<()> {
    let Some(parent) = sqlite_path(database_url)
        .as_deref()
        .and_then(Path::parent)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
    else {
        return Ok(());
    };

    fs::create_dir_all(&parent).with_context(|| {
        format!(
            "cookie jar: cannot create directory '{}' for '{database_url}'",
            parent.display()
        )
    })
}

/// File backing a `sqlite:` jar URL; `None` for in-memory or non-sqlite URLs.
fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    let rest = database_url.strip_prefix("sqlite:")?;
    if rest.starts_with(":memory:") {
        return None;
    }
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let file = rest.split_once('?').map_or(rest, |(file, _)| file);
    (!file.is_empty()).then(|| PathBuf::from(file))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
