// Shared transport configuration for building reqwest::Client instances.
//
// Every vendor backend talks to its console over TLS with certificate
// validation disabled: the consoles ship self-signed certificates and
// expose no CA bundle. This is a deliberate, scoped trust exception for
// the management network, not a general policy — it is confined to the
// clients built here and to the WebSocket connector in `rpc::channel`.

use std::time::Duration;

use crate::error::Error;

const USER_AGENT: &str = concat!("sanpoll/", env!("CARGO_PKG_VERSION"));

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout (connect + read).
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_client_succeeds() {
        let config = TransportConfig::default();
        assert!(config.build_client().is_ok());
    }

    #[test]
    fn default_timeout_is_30s() {
        assert_eq!(TransportConfig::default().timeout, Duration::from_secs(30));
    }
}
