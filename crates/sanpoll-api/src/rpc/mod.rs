//! Asynchronous request/response correlation over a persistent channel.
//!
//! The async consoles multiplex many outstanding calls over one
//! WebSocket connection; replies carry the caller's correlation id and
//! may arrive in any order. [`RpcChannel`] owns the connection and the
//! demultiplexing, [`PendingReply`] is the per-call future, and
//! [`IdAllocator`] hands out fresh ids.

mod channel;
mod envelope;
mod id;

pub use channel::{PendingReply, RpcChannel};
pub use envelope::RpcEnvelope;
pub use id::{CorrelationId, IdAllocator};
