// sanpoll-core: canonical data model and vendor backend drivers.
//
// `sanpoll-api` knows how to talk; this crate knows what to ask and what
// the answers mean. Each driver composes the session, transport, and RPC
// primitives into one collection pass and fills an `ArrayReport`.

pub mod config;
pub mod driver;
pub mod error;
pub mod model;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ArrayConfig, Credentials};
pub use driver::{DellDriver, HuaweiDriver, IbmDriver};
pub use error::CoreError;
pub use model::{
    ArrayReport, CapacitySummary, ComponentHealth, ComponentKind, PerfSample, Vendor,
};
