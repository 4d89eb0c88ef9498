//! Session-token caching.
//!
//! Each backend keeps exactly one authentication token — the cookie header
//! value its console handed back at login — in a small file, so a later
//! process run can skip the login call entirely. A token is absent, valid,
//! or expired; expiry is only ever discovered reactively, when a call
//! comes back unauthorized, at which point the file is deleted and the
//! next run logs in fresh.

use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Error;

// ── SessionToken ─────────────────────────────────────────────────────

/// An opaque session credential, attached verbatim as a `Cookie` header.
///
/// The contents are console-specific (`"SID=abc123"`,
/// `"_auth=...;JSESSIONID=..."`); nothing here inspects them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ── SessionStore ─────────────────────────────────────────────────────

/// File-backed persistence for one backend's session token.
///
/// A missing file, or a file holding only whitespace, means "not
/// authenticated" — that is a normal state, not an error. Real I/O
/// failures (permissions, disk) are surfaced to the caller.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted token, if one exists.
    pub fn load(&self) -> Result<Option<SessionToken>, Error> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(SessionToken::new(trimmed)))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Persist a token, creating the parent directory if needed and
    /// overwriting any previous value.
    pub fn save(&self, token: &SessionToken) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, token.as_str())?;
        Ok(())
    }

    /// Delete the persisted token. Deleting an already-absent token is
    /// success — the end state is the same.
    pub fn invalidate(&self) -> Result<(), Error> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

// ── Session ──────────────────────────────────────────────────────────

/// Shared in-memory session state backed by a [`SessionStore`].
///
/// Many calls read the token concurrently; login and invalidation take
/// the write lock and complete fully — including the file write — before
/// any dependent call can observe the new state.
#[derive(Debug)]
pub struct Session {
    store: SessionStore,
    token: RwLock<Option<SessionToken>>,
}

impl Session {
    pub fn new(store: SessionStore) -> Self {
        Self {
            store,
            token: RwLock::new(None),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Load the persisted token into memory. Returns whether one was found.
    pub async fn restore(&self) -> Result<bool, Error> {
        let mut guard = self.token.write().await;
        let loaded = self.store.load()?;
        let found = loaded.is_some();
        if found {
            debug!(path = %self.store.path().display(), "restored cached session");
        }
        *guard = loaded;
        Ok(found)
    }

    /// Adopt a freshly obtained token: persist it, then publish it.
    pub async fn establish(&self, token: SessionToken) -> Result<(), Error> {
        let mut guard = self.token.write().await;
        self.store.save(&token)?;
        *guard = Some(token);
        Ok(())
    }

    /// Drop the token from memory and disk. Called when the console
    /// reports an authorization failure; the next run re-authenticates.
    pub async fn invalidate(&self) -> Result<(), Error> {
        let mut guard = self.token.write().await;
        self.store.invalidate()?;
        *guard = None;
        Ok(())
    }

    /// The current token, if any.
    pub async fn current(&self) -> Option<SessionToken> {
        self.token.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> SessionStore {
        SessionStore::new(dir.path().join("array.session"))
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.save(&SessionToken::new("SID=abc123")).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, Some(SessionToken::new("SID=abc123")));
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("deep/nested/array.session"));

        store.save(&SessionToken::new("tok")).unwrap();
        assert_eq!(store.load().unwrap(), Some(SessionToken::new("tok")));
    }

    #[test]
    fn invalidate_then_load_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.save(&SessionToken::new("SID=abc123")).unwrap();
        store.invalidate().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn invalidate_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.invalidate().unwrap();
        store.invalidate().unwrap();
    }

    #[test]
    fn whitespace_only_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("array.session");
        std::fs::write(&path, "  \n").unwrap();

        let store = SessionStore::new(path);
        assert!(store.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn token_survives_a_new_process_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("array.session");

        // First run: login produced a cookie, session saved it.
        let first = Session::new(SessionStore::new(&path));
        first.establish(SessionToken::new("SID=abc123")).await.unwrap();

        // Second run: a fresh Session over the same file finds the token
        // without any login.
        let second = Session::new(SessionStore::new(&path));
        assert!(second.restore().await.unwrap());
        assert_eq!(
            second.current().await,
            Some(SessionToken::new("SID=abc123"))
        );
    }

    #[tokio::test]
    async fn invalidate_clears_memory_and_disk() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(store_in(&dir));

        session.establish(SessionToken::new("tok")).await.unwrap();
        assert!(session.is_authenticated().await);

        session.invalidate().await.unwrap();
        assert!(!session.is_authenticated().await);
        assert!(session.store().load().unwrap().is_none());
    }

    #[tokio::test]
    async fn restore_without_file_reports_absent() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(store_in(&dir));

        assert!(!session.restore().await.unwrap());
        assert!(session.current().await.is_none());
    }
}
