//! Cookie model shared between the HTTP client and the browser.
//!
//! An authenticated scrape reuses the cookies obtained during the HTTP
//! login flow, so the same cookie must round-trip between the HTTP client's
//! native representation (`Set-Cookie` text, [`reqwest::cookie::Cookie`])
//! and the browser's cookie parameter (a JSON object).
//!
//! Domain normalization is one-directional: converting *from* the native
//! representation always adds a leading dot to the domain when absent, which
//! is how browsers store host-wide cookies.

// ============================================================================
// Imports
// ============================================================================

use std::time::UNIX_EPOCH;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Cookie expiry timestamp format (`Wdy, DD Mon YYYY HH:MM:SS GMT`).
pub const EXPIRES_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

// ============================================================================
// Cookie
// ============================================================================

/// A cookie in normalized form.
///
/// `expires` is a Unix timestamp in seconds; `None` marks a session cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,

    /// Cookie value.
    pub value: String,

    /// Cookie domain, dot-prefixed after normalization.
    pub domain: String,

    /// Cookie path.
    pub path: String,

    /// Expiry as Unix seconds; `None` for session cookies.
    pub expires: Option<i64>,

    /// `HttpOnly` flag.
    pub http_only: bool,

    /// `Secure` flag.
    pub secure: bool,
}

// ============================================================================
// Cookie - Accessors
// ============================================================================

impl Cookie {
    /// Returns `true` for a session cookie (no expiry).
    #[inline]
    #[must_use]
    pub fn session(&self) -> bool {
        self.expires.is_none()
    }

    /// Returns the stored size of the cookie (name + value length).
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.name.len() + self.value.len()
    }
}

// ============================================================================
// Cookie - Native Conversions
// ============================================================================

impl Cookie {
    /// Converts from the HTTP client's cookie representation.
    ///
    /// The domain gains a leading dot when absent.
    #[must_use]
    pub fn from_native(cookie: &reqwest::cookie::Cookie<'_>) -> Self {
        let expires = cookie
            .expires()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64);

        Self {
            name: cookie.name().to_owned(),
            value: cookie.value().to_owned(),
            domain: normalize_domain(cookie.domain().unwrap_or("")),
            path: cookie.path().unwrap_or("").to_owned(),
            expires,
            http_only: cookie.http_only(),
            secure: cookie.secure(),
        }
    }

    /// Parses a `Set-Cookie` header value.
    ///
    /// Only the attributes this crate needs are recognized (`Domain`,
    /// `Path`, `Expires`, `Secure`, `HttpOnly`). The domain gains a leading
    /// dot when absent, as in [`Cookie::from_native`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a header without a
    /// `name=value` pair.
    pub fn parse(header: &str) -> Result<Self> {
        let mut parts = header.split(';');
        let pair = parts.next().unwrap_or("").trim();
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| Error::invalid_argument(format!("malformed Set-Cookie: {header}")))?;

        let mut cookie = Self {
            name: name.trim().to_owned(),
            value: value.trim().to_owned(),
            ..Self::default()
        };

        for attr in parts {
            let attr = attr.trim();
            let (key, val) = attr.split_once('=').unwrap_or((attr, ""));
            match key.trim().to_ascii_lowercase().as_str() {
                "domain" => cookie.domain = normalize_domain(val.trim()),
                "path" => cookie.path = val.trim().to_owned(),
                "expires" => cookie.expires = parse_expires(val.trim()),
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                _ => {}
            }
        }

        Ok(cookie)
    }

    /// Renders the cookie as a `Set-Cookie` header value.
    #[must_use]
    pub fn to_set_cookie(&self) -> String {
        let mut header = format!("{}={}", self.name, self.value);

        if !self.domain.is_empty() {
            header.push_str("; Domain=");
            header.push_str(&self.domain);
        }
        if !self.path.is_empty() {
            header.push_str("; Path=");
            header.push_str(&self.path);
        }
        if let Some(expires) = self.expires
            && let Some(formatted) = format_expires(expires)
        {
            header.push_str("; Expires=");
            header.push_str(&formatted);
        }
        if self.secure {
            header.push_str("; Secure");
        }
        if self.http_only {
            header.push_str("; HttpOnly");
        }

        header
    }
}

// ============================================================================
// Cookie - Browser Conversions
// ============================================================================

impl Cookie {
    /// Renders the cookie as a browser `setCookie` parameter.
    ///
    /// Session cookies carry `expires: -1`, matching how browsers report
    /// them.
    #[must_use]
    pub fn to_browser(&self) -> Value {
        json!({
            "name": self.name,
            "value": self.value,
            "domain": self.domain,
            "path": self.path,
            "expires": self.expires.unwrap_or(-1),
            "size": self.size(),
            "httpOnly": self.http_only,
            "secure": self.secure,
            "session": self.session(),
        })
    }

    /// Reads a cookie back from a browser cookie object.
    ///
    /// Returns `None` when the object has no `name` field.
    #[must_use]
    pub fn from_browser(value: &Value) -> Option<Self> {
        let name = value.get("name")?.as_str()?.to_owned();
        let expires = value
            .get("expires")
            .and_then(Value::as_i64)
            .filter(|&e| e > 0);

        Some(Self {
            name,
            value: str_field(value, "value"),
            domain: normalize_domain(&str_field(value, "domain")),
            path: str_field(value, "path"),
            expires,
            http_only: bool_field(value, "httpOnly"),
            secure: bool_field(value, "secure"),
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Adds a leading dot to a non-empty domain when absent.
fn normalize_domain(domain: &str) -> String {
    if domain.is_empty() || domain.starts_with('.') {
        domain.to_owned()
    } else {
        format!(".{domain}")
    }
}

/// Parses an `Expires` attribute value into Unix seconds.
fn parse_expires(value: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(value, EXPIRES_FORMAT)
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}

/// Formats Unix seconds as an `Expires` attribute value.
fn format_expires(timestamp: i64) -> Option<String> {
    DateTime::from_timestamp(timestamp, 0).map(|dt| dt.format(EXPIRES_FORMAT).to_string())
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_owned()
}

fn bool_field(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

// ============================================================================
// Tests
// ============================================================================
