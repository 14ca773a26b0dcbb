//! Signed-cookie support.
//!
//! When cookie signing keys are configured, each cookie `name=value` may be
//! accompanied by a `name.sig` companion carrying an HMAC-SHA256 signature
//! of `name=value`. Signing always uses the first key; verification accepts
//! any configured key, so keys can be rotated by prepending a new one.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

fn keyed_mac(key: &str, payload: &str) -> Option<HmacSha256> {
    // HMAC accepts keys of any length; new_from_slice only fails for
    // fixed-size MACs.
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).ok()?;
    mac.update(payload.as_bytes());
    Some(mac)
}

/// Signed-cookie jar keyed by the settings' cookie keys.
///
/// Constructed per request from the parsed `Cookie` header. Unsigned access
/// is always available via [`CookieJar::get`]; [`CookieJar::get_signed`]
/// additionally requires a valid signature companion.
#[derive(Debug, Clone)]
pub struct CookieJar {
    cookies: HashMap<String, String>,
    keys: Vec<String>,
}

impl CookieJar {
    #[must_use]
    pub fn new(cookies: HashMap<String, String>, keys: &[String]) -> Self {
        Self {
            cookies,
            keys: keys.to_vec(),
        }
    }

    /// Raw cookie value, signature ignored.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Cookie value, present only if its `.sig` companion verifies against
    /// one of the configured keys.
    #[must_use]
    pub fn get_signed(&self, name: &str) -> Option<&str> {
        let value = self.cookies.get(name)?;
        let sig = self.cookies.get(&format!("{name}.sig"))?;
        let sig_bytes = URL_SAFE_NO_PAD.decode(sig).ok()?;
        let payload = format!("{name}={value}");
        for key in &self.keys {
            let Some(mac) = keyed_mac(key, &payload) else {
                continue;
            };
            if mac.verify_slice(&sig_bytes).is_ok() {
                return Some(value);
            }
        }
        None
    }

    /// Compute the signature value for `name=value` under the first key.
    /// Returns `None` when no keys are configured.
    #[must_use]
    pub fn sign(&self, name: &str, value: &str) -> Option<String> {
        let key = self.keys.first()?;
        let mac = keyed_mac(key, &format!("{name}={value}"))?;
        Some(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }

    /// `Set-Cookie` header values for a signed cookie: the value cookie and
    /// its signature companion. Falls back to the bare cookie when signing
    /// is not configured.
    #[must_use]
    pub fn set_cookie_headers(&self, name: &str, value: &str) -> Vec<String> {
        match self.sign(name, value) {
            Some(sig) => vec![
                format!("{name}={value}; Path=/; HttpOnly"),
                format!("{name}.sig={sig}; Path=/; HttpOnly"),
            ],
            None => vec![format!("{name}={value}; Path=/; HttpOnly")],
        }
    }
}
