//! Session, transport, and RPC primitives shared by every vendor backend.
//!
//! Storage-array management consoles are proprietary web applications;
//! each vendor has its own login flow, transport (plain HTTP calls or a
//! WebSocket RPC channel), and private status-code vocabulary. This crate
//! is the layer underneath all of them:
//!
//! - [`session`] — the cached-token lifecycle: one small file per array,
//!   restored on start, invalidated when the console stops honoring it.
//! - [`http`] / [`transport`] — authenticated unary calls with outcome
//!   classification (rejected vs. unreachable vs. session expired).
//! - [`rpc`] — the persistent channel: correlation-id demultiplexing,
//!   per-call bounded waits, teardown that never strands a caller.
//! - [`enums`] — vendor status-code → canonical label translation.
//!
//! Vendor drivers live in `sanpoll-core` and compose these pieces.

pub mod enums;
pub mod error;
pub mod http;
pub mod rpc;
pub mod session;
pub mod transport;

pub use enums::{EnumTable, UNKNOWN_LABEL};
pub use error::Error;
pub use http::{ApiClient, RawResponse};
pub use rpc::{CorrelationId, IdAllocator, PendingReply, RpcChannel, RpcEnvelope};
pub use session::{Session, SessionStore, SessionToken};
pub use transport::TransportConfig;
