//! Resolves the per-machine API credentials handed to the page in a cookie.
//!
//! The embedding page stores a JSON blob in a cookie named after the second
//! segment of the page path (`/machine/<cookie-name>/...`):
//!
//! ```json
//! {"apiKey": {"id": "...", "key": "..."}, "machineId": "...", "hostname": "..."}
//! ```
//!
//! Fields missing from the blob resolve to empty strings. Whether that is
//! usable is decided by the consumer, see [`crate::client::connect`].

use serde::Deserialize;
use std::fmt;
use url::Url;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum CredentialError {
    #[error("credentials unavailable: page path has no cookie name segment")]
    NoCookieName,

    #[error("credentials unavailable: cookie {0:?} is not set")]
    CookieMissing(String),

    #[error("credentials unavailable: cookie {name:?} is not valid JSON: {reason}")]
    InvalidJson { name: String, reason: String },
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CookieApiKey {
    id: String,
    key: String,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct CookiePayload {
    api_key: CookieApiKey,
    machine_id: String,
    hostname: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key_id: String,
    pub api_key_secret: String,
    pub hostname: String,
    pub machine_id: String,
}

impl Credentials {
    /// Resolves credentials for the page at `page_url` from a `Cookie` header value.
    pub fn resolve(page_url: &Url, cookie_header: &str) -> Result<Self, CredentialError> {
        let name = cookie_name_from_path(page_url.path()).ok_or(CredentialError::NoCookieName)?;

        let value = find_cookie(cookie_header, name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CredentialError::CookieMissing(name.to_string()))?;

        Self::from_cookie_value(name, &value)
    }

    fn from_cookie_value(name: &str, value: &str) -> Result<Self, CredentialError> {
        let payload: CookiePayload =
            serde_json::from_str(value).map_err(|e| CredentialError::InvalidJson {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Credentials {
            api_key_id: payload.api_key.id,
            api_key_secret: payload.api_key.key,
            hostname: payload.hostname,
            machine_id: payload.machine_id,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key_id", &self.api_key_id)
            .field("api_key_secret", &"<redacted>")
            .field("hostname", &self.hostname)
            .field("machine_id", &self.machine_id)
            .finish()
    }
}

/// Returns the second path segment, e.g. `abc` for `/machine/abc/settings`.
pub fn cookie_name_from_path(path: &str) -> Option<&str> {
    path.split('/').nth(2).filter(|s| !s.is_empty())
}

/// Looks up `name` in a `Cookie` header and percent-decodes its value.
fn find_cookie(cookie_header: &str, name: &str) -> Option<String> {
    cookie_header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| {
            let value = value.trim().trim_matches('"');
            urlencoding::decode(value)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| value.to_string())
        })
}
