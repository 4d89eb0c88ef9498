use thiserror::Error;

/// Top-level error type for the `sanpoll-api` crate.
///
/// Covers every failure mode across the session, transport, and RPC
/// surfaces. `sanpoll-core` maps these into user-facing diagnostics; the
/// variants here keep the distinctions the drivers branch on — most
/// importantly "the console rejected the request" vs. "the console was
/// unreachable" vs. "the session is no longer honored".
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication / session ────────────────────────────────────
    /// Login failed (wrong credentials, console refused the login call).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The console rejected the cached session token — re-authentication
    /// happens on the next run, never inside the failing call.
    #[error("Session expired -- re-authentication required")]
    SessionExpired,

    /// Session-store file I/O failed.
    #[error("Session store error: {0}")]
    Io(#[from] std::io::Error),

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The console answered, but with a non-success HTTP status.
    #[error("Console rejected the request (HTTP {status})")]
    Http { status: u16, body: String },

    // ── Business ────────────────────────────────────────────────────
    /// Vendor error code inside an otherwise-successful HTTP response.
    /// The message is the vendor's own, untranslated.
    #[error("Console error {code}: {message}")]
    Business { code: String, message: String },

    // ── RPC channel ─────────────────────────────────────────────────
    /// WebSocket handshake failed (includes a rejected session token).
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// The channel's reader loop terminated while the call was pending.
    #[error("RPC channel closed before the reply arrived")]
    ChannelClosed,

    /// A correlation id was reused while its first call was still pending.
    #[error("Correlation id {id} already has a pending call")]
    CorrelationInUse { id: String },

    /// The bounded wait for a reply elapsed.
    #[error("No reply for correlation id {id} within {timeout_secs}s")]
    ReplyTimeout { id: String, timeout_secs: u64 },

    // ── Data ────────────────────────────────────────────────────────
    /// Payload deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// A vendor enum table document could not be loaded.
    #[error("Invalid enum table: {0}")]
    InvalidEnumTable(String),
}

impl Error {
    /// Returns `true` if this error means the cached session is dead and
    /// a fresh login would resolve it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::SessionExpired)
    }

    /// Returns `true` if the console was never reached (as opposed to the
    /// console actively rejecting the request).
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_connect() || e.is_timeout(),
            Self::WebSocketConnect(_) => true,
            _ => false,
        }
    }

    /// The HTTP status the console answered with, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
