//! Wire format of the consent cookie.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use shared::{domain::ConsentRecord, error::ConsentError};

pub const CONSENT_COOKIE_NAME: &str = "cookie-consent";
pub const CONSENT_MAX_AGE_DAYS: i64 = 365;

/// Same escape set as `encodeURIComponent`, so pages reading the cookie
/// with `decodeURIComponent` see plain JSON.
const COOKIE_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(SameSite::Strict),
            "lax" => Some(SameSite::Lax),
            "none" => Some(SameSite::None),
            _ => None,
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cookie as handed to a jar. Consent cookies are never `HttpOnly`: page
/// scripts have to read them to gate their own bootstraps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub max_age: Duration,
    pub path: String,
    pub same_site: SameSite,
}

impl SetCookie {
    pub fn consent(name: &str, record: &ConsentRecord, max_age: Duration) -> Self {
        Self {
            name: name.to_string(),
            value: encode_record(record),
            max_age,
            path: "/".to_string(),
            same_site: SameSite::Lax,
        }
    }

    /// `None` when the max-age runs past the representable calendar.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_add_signed(self.max_age)
    }

    /// `Set-Cookie` style rendering, e.g.
    /// `cookie-consent=...; Max-Age=31536000; Path=/; SameSite=Lax`.
    pub fn header_value(&self) -> String {
        format!(
            "{}={}; Max-Age={}; Path={}; SameSite={}",
            self.name,
            self.value,
            self.max_age.num_seconds().max(0),
            self.path,
            self.same_site
        )
    }
}

pub fn encode_record(record: &ConsentRecord) -> String {
    // Serializing four booleans cannot fail.
    let json = serde_json::to_string(record).unwrap_or_default();
    utf8_percent_encode(&json, COOKIE_VALUE).to_string()
}

/// Accepts both the percent-encoded form this crate writes and raw JSON
/// written by older page scripts.
pub fn decode_record(raw: &str) -> Result<ConsentRecord, ConsentError> {
    let decoded = percent_decode_str(raw.trim())
        .decode_utf8()
        .map_err(|err| ConsentError::StoreRead(format!("invalid utf-8: {err}")))?;
    serde_json::from_str(&decoded).map_err(|err| ConsentError::StoreRead(err.to_string()))
}

/// Finds `name` in a `Cookie:` header or `document.cookie` string.
pub fn find_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then_some(value)
    })
}

#[cfg(test)]
#[path = "tests/cookie_tests.rs"]
mod tests;
