//! Vendor backend drivers.
//!
//! One driver instance polls one array. The session flow is the same
//! everywhere: restore the cached token, log in only when the cache is
//! empty, and let an authorization failure during the pass invalidate the
//! cache — the pass then aborts (every further call would fail the same
//! way) and the *next* run re-authenticates. There is no mid-run
//! re-login.
//!
//! Individual collection steps are independent: a step that fails for any
//! other reason is logged with its call name and skipped, and the pass
//! carries on.

pub mod dell;
pub mod huawei;
pub mod ibm;

use sanpoll_api::{Error, Session};
use serde_json::Value;
use tracing::warn;

use crate::error::CoreError;

pub use dell::DellDriver;
pub use huawei::HuaweiDriver;
pub use ibm::IbmDriver;

// ── Business-code classification ─────────────────────────────────────

/// Map a vendor business code to the transport-layer taxonomy.
///
/// Only the vendor's documented authorization-failure code invalidates
/// the session; every other non-zero code is a business error and leaves
/// the cached token alone.
pub(crate) async fn classify_business(
    session: &Session,
    auth_code: &str,
    code: &str,
    message: String,
) -> Error {
    if code == auth_code {
        if let Err(e) = session.invalidate().await {
            warn!(error = %e, "failed to invalidate session store");
        }
        Error::SessionExpired
    } else {
        Error::Business {
            code: code.to_owned(),
            message,
        }
    }
}

/// Login-call failures are authentication failures whatever their
/// transport-level shape — except unreachability, which stays distinct
/// so the operator can tell "bad credentials" from "console down".
pub(crate) fn login_error(err: Error) -> CoreError {
    if err.is_unreachable() {
        return CoreError::from(err);
    }
    match err {
        Error::Authentication { message } => CoreError::AuthenticationFailed { message },
        other => CoreError::AuthenticationFailed {
            message: other.to_string(),
        },
    }
}

// ── JSON field helpers ───────────────────────────────────────────────
//
// The consoles are loose with types: numbers arrive as JSON numbers or
// as decimal strings depending on endpoint and firmware. These helpers
// accept both.

pub(crate) fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer)?.as_str()
}

pub(crate) fn string_at(value: &Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn i64_at(value: &Value, pointer: &str) -> Option<i64> {
    match value.pointer(pointer)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn f64_at(value: &Value, pointer: &str) -> Option<f64> {
    match value.pointer(pointer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// The array under `pointer`, or an empty slice when absent — a missing
/// list and an empty list read the same during accumulation.
pub(crate) fn array_at<'a>(value: &'a Value, pointer: &str) -> &'a [Value] {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .map_or(&[], Vec::as_slice)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use sanpoll_api::{SessionStore, SessionToken};
    use serde_json::json;

    #[test]
    fn i64_at_accepts_numbers_and_numeric_strings() {
        let v = json!({ "data": { "a": 512, "b": "1024", "c": "x" } });
        assert_eq!(i64_at(&v, "/data/a"), Some(512));
        assert_eq!(i64_at(&v, "/data/b"), Some(1024));
        assert_eq!(i64_at(&v, "/data/c"), None);
        assert_eq!(i64_at(&v, "/data/missing"), None);
    }

    #[test]
    fn string_at_stringifies_numbers() {
        let v = json!({ "error": { "code": -401 } });
        assert_eq!(string_at(&v, "/error/code").as_deref(), Some("-401"));
    }

    #[test]
    fn array_at_tolerates_missing_lists() {
        let v = json!({ "data": [1, 2] });
        assert_eq!(array_at(&v, "/data").len(), 2);
        assert!(array_at(&v, "/nope").is_empty());
        assert!(array_at(&v, "/data/0").is_empty());
    }

    #[tokio::test]
    async fn auth_code_invalidates_session() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(SessionStore::new(dir.path().join("s")));
        session
            .establish(SessionToken::new("SID=x"))
            .await
            .unwrap();

        let err = classify_business(&session, "-401", "-401", "expired".into()).await;
        assert!(matches!(err, Error::SessionExpired));
        assert!(!session.is_authenticated().await);
        assert!(session.store().load().unwrap().is_none());
    }

    #[tokio::test]
    async fn other_codes_leave_the_session_alone() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(SessionStore::new(dir.path().join("s")));
        session
            .establish(SessionToken::new("SID=x"))
            .await
            .unwrap();

        let err = classify_business(&session, "-401", "-1077949061", "busy".into()).await;
        match err {
            Error::Business { code, message } => {
                assert_eq!(code, "-1077949061");
                assert_eq!(message, "busy");
            }
            other => panic!("expected Business, got {other:?}"),
        }
        assert!(session.is_authenticated().await);
    }
}
