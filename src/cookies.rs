//! Cookie persistence for the HTTP client.
//!
//! A [`cookie_store::CookieStore`] handles `Set-Cookie` semantics (expiry,
//! domain and path matching). Its JSON form is kept in the preference
//! store, so challenge clearance survives restarts and can be cleared by
//! the user.

use crate::config::PreferenceStore;
use crate::error::ConfigError;
use cookie_store::CookieStore as CookieJar;
use reqwest::Url;
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// A cookie store backed by [`PreferenceStore`].
pub struct PersistentCookieStore {
    prefs: Arc<PreferenceStore>,
    key: String,
    jar: RwLock<CookieJar>,
}

impl PersistentCookieStore {
    /// Creates a store writing under the given instance key, starting
    /// from whatever was persisted there.
    pub fn new(prefs: Arc<PreferenceStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let jar = prefs
            .read(|p| p.cookies.get(&key).cloned())
            .map(|json| load_jar(&key, &json))
            .unwrap_or_default();

        Self {
            prefs,
            key,
            jar: RwLock::new(jar),
        }
    }

    /// The instance key cookies are stored under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Records `Set-Cookie` values received from `url`.
    pub fn save_from_response<'a>(&self, url: &Url, set_cookies: impl IntoIterator<Item = &'a str>) {
        let mut jar = self.jar.write().unwrap_or_else(PoisonError::into_inner);

        let mut changed = false;
        for raw in set_cookies {
            match jar.parse(raw, url) {
                Ok(_) => changed = true,
                // Expired cookies with nothing to delete land here too.
                Err(err) => debug!(url = %url, error = %err, "ignored cookie"),
            }
        }
        if !changed {
            return;
        }

        match self.persist(&jar) {
            Ok(()) => debug!(url = %url, "stored cookies"),
            Err(err) => warn!(url = %url, error = %err, "failed to persist cookies"),
        }
    }

    /// `Cookie` header value for a request to `url`.
    pub fn load_for_request(&self, url: &Url) -> Option<String> {
        let jar = self.jar.read().unwrap_or_else(PoisonError::into_inner);
        let pairs: Vec<String> = jar
            .get_request_values(url)
            .map(|(name, value)| format!("{name}={value}"))
            .collect();

        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    /// Removes every cookie of this instance.
    pub fn clear(&self) -> Result<(), ConfigError> {
        self.jar
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.prefs.update(|p| {
            p.cookies.remove(&self.key);
        })
    }

    fn persist(&self, jar: &CookieJar) -> Result<(), ConfigError> {
        let mut buf = Vec::new();
        cookie_store::serde::json::save_incl_expired_and_nonpersistent(jar, &mut buf).map_err(
            |e| ConfigError::InvalidValue {
                key: self.key.clone(),
                message: e.to_string(),
            },
        )?;
        let json = String::from_utf8_lossy(&buf).into_owned();

        self.prefs.update(|p| {
            p.cookies.insert(self.key.clone(), json);
        })
    }
}

/// Parses a persisted jar, starting empty when it is unreadable.
fn load_jar(key: &str, json: &str) -> CookieJar {
    cookie_store::serde::json::load_all(json.as_bytes()).unwrap_or_else(|err| {
        warn!(key, error = %err, "discarding unreadable cookies");
        CookieJar::default()
    })
}

impl CookieStore for PersistentCookieStore {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let values: Vec<&str> = cookie_headers.filter_map(|h| h.to_str().ok()).collect();
        self.save_from_response(url, values);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.load_for_request(url)
            .and_then(|value| HeaderValue::from_str(&value).ok())
    }
}
