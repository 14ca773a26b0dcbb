//! Server settings resolved once at construction time.
//!
//! `Settings` is the configuration bag shared read-only by every request:
//! the static asset root, the template root, TLS material, and the cookie
//! signing keys. All paths are resolved while the settings are built; nothing
//! is re-checked per request.

use std::path::{Path, PathBuf};
use tracing::warn;

/// TLS key/cert material.
///
/// Both paths must be present for the server to consider TLS configured.
/// Encryption itself is delegated to an external secure-transport provider
/// (typically a terminating proxy); the server only advertises the scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsOptions {
    pub key_path: PathBuf,
    pub cert_path: PathBuf,
}

/// Immutable (post-construction) server configuration.
///
/// Built with [`Settings::builder`], then shared by reference across all
/// concurrent requests. No request mutates it, so no locking is needed.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    static_path: Option<PathBuf>,
    template_path: Option<PathBuf>,
    tls: Option<TlsOptions>,
    cookie_keys: Vec<String>,
}

impl Settings {
    #[must_use]
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Filesystem root served for unmatched GET/HEAD requests, if configured
    /// and present at construction time.
    #[must_use]
    pub fn static_path(&self) -> Option<&Path> {
        self.static_path.as_deref()
    }

    /// Root against which relative template paths are resolved.
    #[must_use]
    pub fn template_path(&self) -> Option<&Path> {
        self.template_path.as_deref()
    }

    #[must_use]
    pub fn tls(&self) -> Option<&TlsOptions> {
        self.tls.as_ref()
    }

    /// Keys used to sign and verify cookies. Empty means signed-cookie
    /// support is disabled.
    #[must_use]
    pub fn cookie_keys(&self) -> &[String] {
        &self.cookie_keys
    }

    /// URL scheme the server advertises: `https` when TLS material is
    /// configured, `http` otherwise.
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        if self.tls.is_some() {
            "https"
        } else {
            "http"
        }
    }
}

/// Builder for [`Settings`].
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    static_path: Option<PathBuf>,
    template_path: Option<PathBuf>,
    tls_key: Option<PathBuf>,
    tls_cert: Option<PathBuf>,
    cookie_keys: Vec<String>,
}

impl SettingsBuilder {
    #[must_use]
    pub fn static_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.static_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn template_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.template_path = Some(path.into());
        self
    }

    /// Configure TLS material. TLS counts as configured only when both the
    /// key and the cert are supplied.
    #[must_use]
    pub fn tls<P: Into<PathBuf>>(mut self, key_path: P, cert_path: P) -> Self {
        self.tls_key = Some(key_path.into());
        self.tls_cert = Some(cert_path.into());
        self
    }

    #[must_use]
    pub fn cookie_key<S: Into<String>>(mut self, key: S) -> Self {
        self.cookie_keys.push(key.into());
        self
    }

    /// Resolve paths and freeze the settings.
    ///
    /// A static root that does not exist on disk is dropped with a warning
    /// rather than failing construction: the server still runs, it just has
    /// no static fallback.
    #[must_use]
    pub fn build(self) -> Settings {
        let static_path = self.static_path.and_then(|p| match p.canonicalize() {
            Ok(abs) => Some(abs),
            Err(err) => {
                warn!(path = %p.display(), error = %err, "static root missing, disabling static fallback");
                None
            }
        });
        let template_path = self
            .template_path
            .map(|p| p.canonicalize().unwrap_or(p));
        let tls = match (self.tls_key, self.tls_cert) {
            (Some(key_path), Some(cert_path)) => Some(TlsOptions {
                key_path,
                cert_path,
            }),
            _ => None,
        };
        Settings {
            static_path,
            template_path,
            tls,
            cookie_keys: self.cookie_keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_static_root_is_dropped() {
        let settings = Settings::builder()
            .static_path("/definitely/not/a/real/dir")
            .build();
        assert!(settings.static_path().is_none());
    }

    #[test]
    fn test_scheme_follows_tls() {
        let plain = Settings::builder().build();
        assert_eq!(plain.scheme(), "http");
        let tls = Settings::builder().tls("key.pem", "cert.pem").build();
        assert_eq!(tls.scheme(), "https");
        assert!(tls.tls().is_some());
    }

    #[test]
    fn test_cookie_keys_accumulate() {
        let settings = Settings::builder()
            .cookie_key("alpha")
            .cookie_key("beta")
            .build();
        assert_eq!(settings.cookie_keys(), ["alpha", "beta"]);
    }
}
