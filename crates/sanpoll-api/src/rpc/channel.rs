//! The persistent RPC channel.
//!
//! One WebSocket connection per channel, one background reader task per
//! connection. Outbound frames carry a caller-supplied correlation id;
//! the reader demultiplexes inbound frames back to the matching pending
//! call. Replies arrive in whatever order the console feels like — the
//! correlation id is the only ordering key.
//!
//! # Lifecycle
//!
//! `Disconnected → Connected → (per call) AwaitingReply → Connected`, and
//! `Connected → Disconnected` on any read error, close frame, or explicit
//! [`close`](RpcChannel::close). When the reader loop exits it drains the
//! pending map, which wakes every caller still waiting with
//! [`Error::ChannelClosed`] — a dead channel never leaves a caller
//! hanging, and [`PendingReply::wait`] is bounded by a timeout besides.
//!
//! # Example
//!
//! ```rust,ignore
//! let channel = RpcChannel::connect(&ws_url, Some(token.as_str())).await?;
//! let ids = IdAllocator::new();
//!
//! let env = RpcEnvelope::new("sc", "StorageCenterSummaryService", "getCapacityData")
//!     .arg(serial);
//! let reply = channel.call(ids.next_id(), &env).await?;
//! let payload = reply.wait(Duration::from_secs(30)).await?;
//!
//! channel.close().await;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, oneshot};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::Error;
use crate::rpc::envelope::{RPC_CALL_TYPE, RpcEnvelope, WireRequest};
use crate::rpc::id::CorrelationId;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ── Shared channel state ─────────────────────────────────────────────

/// State touched by both the issuing callers and the reader task.
struct ChannelShared {
    /// At most one entry per correlation id; the sender resolves the
    /// matching [`PendingReply`].
    pending: std::sync::Mutex<HashMap<CorrelationId, oneshot::Sender<Value>>>,
    closed: AtomicBool,
}

impl ChannelShared {
    fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

// ── PendingReply ─────────────────────────────────────────────────────

/// Handle to one outstanding call.
#[derive(Debug)]
pub struct PendingReply {
    id: CorrelationId,
    rx: oneshot::Receiver<Value>,
}

impl PendingReply {
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.id
    }

    /// Bounded wait for the reply.
    ///
    /// Resolves with the whole reply frame, with
    /// [`Error::ChannelClosed`] if the reader loop exits first, or with
    /// [`Error::ReplyTimeout`] once `timeout` elapses. A dropped
    /// connection produces no per-call failure notification from the
    /// console, so an unbounded wait is never offered.
    pub async fn wait(self, timeout: Duration) -> Result<Value, Error> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(Error::ChannelClosed),
            Err(_) => Err(Error::ReplyTimeout {
                id: self.id.to_string(),
                timeout_secs: timeout.as_secs(),
            }),
        }
    }
}

// ── RpcChannel ───────────────────────────────────────────────────────

/// A single persistent bidirectional connection to a console.
pub struct RpcChannel {
    sink: Mutex<SplitSink<WsStream, Message>>,
    shared: Arc<ChannelShared>,
    cancel: CancellationToken,
}

impl RpcChannel {
    /// Establish the connection and spawn the reader task.
    ///
    /// Fails fast if the handshake is rejected — an invalid or expired
    /// session token typically surfaces here as an HTTP error on the
    /// upgrade request. `cookie` is attached to the upgrade request when
    /// present.
    pub async fn connect(url: &Url, cookie: Option<&str>) -> Result<Self, Error> {
        let uri: tungstenite::http::Uri = url.as_str().parse().map_err(
            |e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()),
        )?;

        let mut request = ClientRequestBuilder::new(uri);
        if let Some(cookie_val) = cookie {
            request = request.with_header("Cookie", cookie_val);
        }

        let connector = insecure_connector()?;
        let (ws_stream, _response) =
            tokio_tungstenite::connect_async_tls_with_config(request, None, false, Some(connector))
                .await
                .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        info!(url = %url, "RPC channel connected");

        let (sink, stream) = ws_stream.split();
        let shared = Arc::new(ChannelShared {
            pending: std::sync::Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });
        let cancel = CancellationToken::new();

        tokio::spawn(read_loop(stream, Arc::clone(&shared), cancel.clone()));

        Ok(Self {
            sink: Mutex::new(sink),
            shared,
            cancel,
        })
    }

    /// Send an envelope under `id` and register the pending call.
    ///
    /// The pending entry is registered before the frame hits the wire, so
    /// a reply can never race past its own registration. `id` must be
    /// fresh: reusing an id while its first call is outstanding is a
    /// caller error and is rejected with [`Error::CorrelationInUse`].
    pub async fn call(
        &self,
        id: CorrelationId,
        request: &RpcEnvelope,
    ) -> Result<PendingReply, Error> {
        if self.is_closed() {
            return Err(Error::ChannelClosed);
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending.lock().expect("pending map poisoned");
            if pending.contains_key(&id) {
                return Err(Error::CorrelationInUse { id: id.to_string() });
            }
            pending.insert(id.clone(), tx);
        }

        let frame = WireRequest {
            kind: RPC_CALL_TYPE,
            correlation_id: &id,
            envelope: request,
        };
        let json = serde_json::to_string(&frame).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: String::new(),
        })?;

        debug!(correlation_id = %id, method = %request.method_name, "RPC call");

        let send_result = {
            let mut sink = self.sink.lock().await;
            sink.send(Message::Text(json.into())).await
        };

        if let Err(e) = send_result {
            warn!(correlation_id = %id, error = %e, "RPC send failed");
            // Roll back the registration so the id is free again.
            self.shared
                .pending
                .lock()
                .expect("pending map poisoned")
                .remove(&id);
            self.shared.mark_closed();
            return Err(Error::ChannelClosed);
        }

        Ok(PendingReply { id, rx })
    }

    /// Whether the channel has gone down (read error, close frame, or
    /// explicit close). Calls on a closed channel fail immediately.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Terminate the reader loop and the connection.
    ///
    /// Every caller that opens a channel closes it on all exit paths;
    /// `Drop` also cancels the reader, so an early `?` return cannot leak
    /// the background task.
    pub async fn close(&self) {
        self.shared.mark_closed();
        self.cancel.cancel();
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            debug!(error = %e, "RPC channel close handshake failed");
        }
    }
}

impl Drop for RpcChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Reader loop ──────────────────────────────────────────────────────

/// Runs for the lifetime of the connection: demultiplex inbound frames to
/// pending calls, drop everything else, and on exit wake all waiters.
async fn read_loop(
    mut stream: SplitStream<WsStream>,
    shared: Arc<ChannelShared>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        dispatch_frame(&text, &shared);
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite answers pings automatically
                        trace!("RPC channel ping");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            info!(code = %cf.code, reason = %cf.reason, "RPC channel close frame");
                        } else {
                            info!("RPC channel close frame (no payload)");
                        }
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary, Pong, raw Frame -- not part of the protocol
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "RPC channel read failed");
                        break;
                    }
                    None => {
                        info!("RPC channel stream ended");
                        break;
                    }
                }
            }
        }
    }

    shared.mark_closed();

    // Dropping the senders wakes every caller still blocked in
    // PendingReply::wait with a channel-closed error.
    let abandoned = {
        let mut pending = shared.pending.lock().expect("pending map poisoned");
        pending.drain().count()
    };
    if abandoned > 0 {
        warn!(abandoned, "RPC channel closed with unresolved calls");
    }
    debug!("RPC reader loop exiting");
}

/// Route one inbound text frame to its pending call, if any.
///
/// Frames without a matching pending call — vendor push/event traffic,
/// or replies nobody awaits anymore — are dropped.
fn dispatch_frame(text: &str, shared: &ChannelShared) {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "undecodable frame dropped");
            return;
        }
    };

    let Some(id) = frame_correlation_id(&value) else {
        trace!("frame without correlation id dropped");
        return;
    };

    let sender = {
        let mut pending = shared.pending.lock().expect("pending map poisoned");
        pending.remove(&id)
    };

    match sender {
        Some(tx) => {
            if tx.send(value).is_err() {
                debug!(correlation_id = %id, "caller gave up before the reply arrived");
            }
        }
        None => {
            trace!(correlation_id = %id, "unmatched frame dropped");
        }
    }
}

/// The consoles echo the id as either a JSON string or an integer.
fn frame_correlation_id(value: &Value) -> Option<CorrelationId> {
    match value.get("correlationId")? {
        Value::String(s) => Some(CorrelationId::from(s.as_str())),
        Value::Number(n) => Some(CorrelationId::from(n.to_string())),
        _ => None,
    }
}

// ── Insecure TLS connector ───────────────────────────────────────────

/// WebSocket-side counterpart of the HTTP client's
/// `danger_accept_invalid_certs(true)` — same trust exception, same
/// scope: the consoles present self-signed certificates.
fn insecure_connector() -> Result<Connector, Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let tls = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(danger::NoVerification::new(provider)))
        .with_no_client_auth();
    Ok(Connector::Rustls(Arc::new(tls)))
}

mod danger {
    use std::sync::Arc;

    use rustls::client::danger::{
        HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
    };
    use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
    use rustls::{DigitallySignedStruct, SignatureScheme};
    use rustls_pki_types::{CertificateDer, ServerName, UnixTime};

    /// Accepts any server certificate. Signature verification is still
    /// delegated to the crypto provider, so a handshake with a garbage
    /// signature fails even though the chain is never checked.
    #[derive(Debug)]
    pub(super) struct NoVerification {
        provider: Arc<CryptoProvider>,
    }

    impl NoVerification {
        pub(super) fn new(provider: Arc<CryptoProvider>) -> Self {
            Self { provider }
        }
    }

    impl ServerCertVerifier for NoVerification {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            verify_tls12_signature(
                message,
                cert,
                dss,
                &self.provider.signature_verification_algorithms,
            )
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            verify_tls13_signature(
                message,
                cert,
                dss,
                &self.provider.signature_verification_algorithms,
            )
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            self.provider
                .signature_verification_algorithms
                .supported_schemes()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn correlation_id_from_string_frame() {
        let frame = json!({ "correlationId": "7", "result": {} });
        assert_eq!(
            frame_correlation_id(&frame),
            Some(CorrelationId::from("7"))
        );
    }

    #[test]
    fn correlation_id_from_integer_frame() {
        let frame = json!({ "correlationId": 7, "result": {} });
        assert_eq!(
            frame_correlation_id(&frame),
            Some(CorrelationId::from("7"))
        );
    }

    #[test]
    fn frame_without_id_yields_none() {
        let frame = json!({ "type": "event", "payload": {} });
        assert_eq!(frame_correlation_id(&frame), None);
    }

    #[test]
    fn non_scalar_id_yields_none() {
        let frame = json!({ "correlationId": ["1"] });
        assert_eq!(frame_correlation_id(&frame), None);
    }

    #[test]
    fn dispatch_resolves_matching_pending_call() {
        let shared = ChannelShared {
            pending: std::sync::Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        };
        let (tx, mut rx) = oneshot::channel();
        shared
            .pending
            .lock()
            .unwrap()
            .insert(CorrelationId::from("1"), tx);

        dispatch_frame(r#"{"correlationId":"1","result":{"ok":true}}"#, &shared);

        let value = rx.try_recv().unwrap();
        assert_eq!(value["result"]["ok"], true);
        assert!(shared.pending.lock().unwrap().is_empty());
    }

    #[test]
    fn dispatch_drops_unmatched_frame() {
        let shared = ChannelShared {
            pending: std::sync::Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        };
        let (tx, mut rx) = oneshot::channel();
        shared
            .pending
            .lock()
            .unwrap()
            .insert(CorrelationId::from("1"), tx);

        // Unrelated id: dropped, pending call untouched.
        dispatch_frame(r#"{"correlationId":"2","result":{}}"#, &shared);

        assert!(rx.try_recv().is_err());
        assert_eq!(shared.pending.lock().unwrap().len(), 1);
    }

    #[test]
    fn dispatch_survives_garbage() {
        let shared = ChannelShared {
            pending: std::sync::Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        };
        dispatch_frame("not json at all", &shared);
        dispatch_frame(r#"{"no":"id"}"#, &shared);
    }
}
