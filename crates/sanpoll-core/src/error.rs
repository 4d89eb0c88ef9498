// ── Core error types ──
//
// User-facing errors from sanpoll-core. Consumers never see reqwest or
// tungstenite failures directly; the `From<sanpoll_api::Error>` impl
// translates the transport-layer taxonomy into domain variants while
// keeping the distinctions the binary reports on (auth vs. reachability
// vs. vendor business errors).

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection / auth ────────────────────────────────────────────
    #[error("Cannot reach array console: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Session expired -- the next run will re-authenticate")]
    SessionExpired,

    // ── Vendor responses ─────────────────────────────────────────────
    /// Vendor business error, untranslated.
    #[error("Console error {code}: {message}")]
    Business { code: String, message: String },

    /// A payload did not have the shape the driver expected.
    #[error("Malformed console payload: {message}")]
    Payload { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Everything else from the API layer ───────────────────────────
    #[error("API error: {message}")]
    Api { message: String },
}

impl CoreError {
    /// Returns `true` if the cached session died during the pass; the
    /// driver aborts the remaining steps, since every further call would
    /// fail the same way.
    pub fn is_auth_expired(&self) -> bool {
        matches!(
            self,
            Self::SessionExpired | Self::AuthenticationFailed { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<sanpoll_api::Error> for CoreError {
    fn from(err: sanpoll_api::Error) -> Self {
        match err {
            sanpoll_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            sanpoll_api::Error::SessionExpired => CoreError::SessionExpired,
            sanpoll_api::Error::Business { code, message } => {
                CoreError::Business { code, message }
            }
            sanpoll_api::Error::Deserialization { message, .. } => {
                CoreError::Payload { message }
            }
            sanpoll_api::Error::InvalidEnumTable(message) => CoreError::Config { message },
            ref e @ (sanpoll_api::Error::Transport(_)
            | sanpoll_api::Error::WebSocketConnect(_)) => {
                if e.is_unreachable() {
                    CoreError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                    }
                }
            }
            other => CoreError::Api {
                message: other.to_string(),
            },
        }
    }
}
