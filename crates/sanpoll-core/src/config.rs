// ── Runtime backend configuration ──
//
// These types describe *how* to reach one array console. They carry
// credential data and connection tuning, but never touch disk —
// sanpoll-config builds an `ArrayConfig` from its profile file and hands
// it into the driver constructor. One config, one driver, one array; no
// shared mutable globals.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::error::CoreError;
use crate::model::Vendor;

/// Login credentials. Opaque to the core — each vendor's login flow
/// decides how they go on the wire.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// Configuration for one array backend instance.
#[derive(Debug, Clone)]
pub struct ArrayConfig {
    pub vendor: Vendor,
    /// Console base URL (e.g. `https://10.3.20.34:8088`).
    pub url: Url,
    /// WebSocket endpoint for the async consoles. Derived from `url`
    /// (https → wss) when absent.
    pub ws_url: Option<Url>,
    pub credentials: Credentials,
    /// Where this backend caches its session token.
    pub session_file: PathBuf,
    /// Vendor enum table (JSON), if this console reports numeric codes.
    pub enum_table: Option<PathBuf>,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// Bounded wait per outstanding RPC reply.
    pub call_timeout: Duration,
    /// Fixed delay between the cookie-seeding request and the login call.
    /// The V7000 console answers "too many requests" without it.
    pub pre_login_delay: Duration,
}

impl ArrayConfig {
    /// A config with the defaults every field except the identity ones.
    pub fn new(
        vendor: Vendor,
        url: Url,
        credentials: Credentials,
        session_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            vendor,
            url,
            ws_url: None,
            credentials,
            session_file: session_file.into(),
            enum_table: None,
            timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(30),
            pre_login_delay: Duration::from_secs(1),
        }
    }

    /// The WebSocket endpoint: explicit `ws_url`, or `url` with the
    /// scheme swapped to `wss`.
    pub fn ws_endpoint(&self) -> Result<Url, CoreError> {
        if let Some(ref ws) = self.ws_url {
            return Ok(ws.clone());
        }
        let mut derived = self.url.clone();
        let scheme = match derived.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => {
                return Err(CoreError::Config {
                    message: format!("cannot derive a WebSocket endpoint from scheme {other}"),
                });
            }
        };
        derived
            .set_scheme(scheme)
            .map_err(|()| CoreError::Config {
                message: "cannot derive a WebSocket endpoint".into(),
            })?;
        Ok(derived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> ArrayConfig {
        ArrayConfig::new(
            Vendor::Dell,
            url.parse().unwrap(),
            Credentials {
                username: "admin".into(),
                password: SecretString::from("secret".to_owned()),
            },
            "/tmp/dell.session",
        )
    }

    #[test]
    fn ws_endpoint_derived_from_https() {
        let cfg = config("https://10.3.20.16");
        assert_eq!(cfg.ws_endpoint().unwrap().as_str(), "wss://10.3.20.16/");
    }

    #[test]
    fn explicit_ws_url_wins() {
        let mut cfg = config("https://10.3.20.16");
        cfg.ws_url = Some("wss://10.3.20.99:8443".parse().unwrap());
        assert_eq!(
            cfg.ws_endpoint().unwrap().as_str(),
            "wss://10.3.20.99:8443/"
        );
    }
}
