//! RPC request envelopes.

use serde::Serialize;

use crate::rpc::id::CorrelationId;

/// Every frame the channel sends is an RPC call.
pub(crate) const RPC_CALL_TYPE: &str = "rpc-call";

// ── RpcEnvelope ──────────────────────────────────────────────────────

/// A console RPC request, minus its correlation id.
///
/// The channel injects `type` and `correlationId` when framing, so an
/// envelope value can be built once and sent under several ids (the
/// fan-out pattern) without any field mutation.
///
/// Wire shape of the full frame:
///
/// ```json
/// {"type":"rpc-call","pluginId":"sc","correlationId":"4",
///  "methodName":"getHardwareDisks","methodArguments":["SN123","1"],
///  "handlerName":"DiskService"}
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcEnvelope {
    pub plugin_id: String,
    pub handler_name: String,
    pub method_name: String,
    pub method_arguments: Vec<String>,
}

impl RpcEnvelope {
    pub fn new(
        plugin_id: impl Into<String>,
        handler_name: impl Into<String>,
        method_name: impl Into<String>,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            handler_name: handler_name.into(),
            method_name: method_name.into(),
            method_arguments: Vec::new(),
        }
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.method_arguments.push(value.into());
        self
    }
}

// ── WireRequest ──────────────────────────────────────────────────────

/// The full frame as written to the socket.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireRequest<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub correlation_id: &'a CorrelationId,
    #[serde(flatten)]
    pub envelope: &'a RpcEnvelope,
}

// ── Tests ────────────────────────────────────────────────────────────
