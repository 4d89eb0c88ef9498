//! Correlation-id allocation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ── CorrelationId ────────────────────────────────────────────────────

/// Caller-chosen token embedded in a request and echoed in its reply —
/// the only key that ties the two together.
///
/// Kept as a string because that is what goes on the wire; the consoles
/// echo whatever they were given. Small decimal integers are what their
/// own web UIs send, so that is what [`IdAllocator`] produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CorrelationId {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

impl From<String> for CorrelationId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<u64> for CorrelationId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── IdAllocator ──────────────────────────────────────────────────────

/// Hands out process-unique correlation ids from a monotonic counter.
///
/// A driver that issues statically numbered bootstrap calls first seeds
/// the allocator past them with [`seeded`](Self::seeded); ids carry no
/// positional meaning beyond uniqueness.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::seeded(1)
    }

    /// Start allocation at `first`.
    pub fn seeded(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    pub fn next_id(&self) -> CorrelationId {
        CorrelationId::from(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────────
