use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{cookie::SetCookie, CookieJar};

#[derive(Debug, Clone)]
struct MemoryCookie {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Process-local jar. Expired entries read as absent and are dropped lazily.
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    cookies: RwLock<HashMap<String, MemoryCookie>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a raw value, bypassing encoding. Used to simulate cookies
    /// written by other scripts.
    pub async fn insert_raw(&self, name: &str, value: &str, expires_at: DateTime<Utc>) {
        self.cookies.write().await.insert(
            name.to_string(),
            MemoryCookie {
                value: value.to_string(),
                expires_at,
            },
        );
    }

    pub async fn raw_value(&self, name: &str) -> Option<String> {
        self.cookies
            .read()
            .await
            .get(name)
            .map(|cookie| cookie.value.clone())
    }
}

#[async_trait]
impl CookieJar for MemoryCookieJar {
    async fn get(&self, name: &str) -> Result<Option<String>> {
        let now = Utc::now();
        {
            let guard = self.cookies.read().await;
            match guard.get(name) {
                None => return Ok(None),
                Some(cookie) if cookie.expires_at > now => return Ok(Some(cookie.value.clone())),
                Some(_) => {}
            }
        }

        // A `set` may have landed between the two locks; only drop what is
        // still expired.
        let mut guard = self.cookies.write().await;
        if let Some(cookie) = guard.get(name).filter(|cookie| cookie.expires_at > now) {
            return Ok(Some(cookie.value.clone()));
        }
        guard.remove(name);
        Ok(None)
    }

    async fn set(&self, cookie: &SetCookie) -> Result<()> {
        let expires_at = cookie
            .expires_at(Utc::now())
            .with_context(|| format!("max-age of cookie '{}' is out of range", cookie.name))?;
        self.cookies.write().await.insert(
            cookie.name.clone(),
            MemoryCookie {
                value: cookie.value.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.cookies.write().await.remove(name);
        Ok(())
    }
}
