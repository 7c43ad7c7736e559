//! Session store
//!
//! The session (profile plus tokens) lives in an explicit [`SessionStore`]
//! handed to every collaborator. Memory and persistent storage change
//! together: storage is written first and memory only follows on success,
//! and both are cleared as one unit. Every change to the session runs under
//! one write lock, so a cleared session is never written back.

pub mod claims;
pub mod storage;

use crate::config::TOKEN_EXPIRY_LEEWAY;
use crate::events::Subscription;
use arc_swap::ArcSwapOption;
use claims::TokenClaims;
use safawinet_core::types::{LoginSuccess, TokenPair, UserProfile};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use storage::{SessionStorage, StorageError, StoredSession};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// A signed-in user and their credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: UserProfile,
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        !self.access_token.is_empty()
    }

    fn to_record(&self) -> Result<StoredSession, StorageError> {
        Ok(StoredSession {
            user: Some(serde_json::to_string(&self.user)?),
            auth_token: Some(self.access_token.clone()),
            refresh_token: self.refresh_token.clone(),
        })
    }

    fn from_record(record: StoredSession) -> Option<Self> {
        let (Some(user), Some(access_token)) = (record.user, record.auth_token) else {
            return None;
        };
        let user = serde_json::from_str(&user).ok()?;
        Some(Self {
            user,
            access_token,
            refresh_token: record.refresh_token,
        })
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignOutReason {
    UserLogout,
    Inactivity,
    RefreshFailed,
    Unauthorized,
    Expired,
}

/// Session lifecycle notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn { user_id: String },
    TokensRefreshed,
    ProfileUpdated,
    SignedOut { reason: SignOutReason },
}

struct Inner {
    current: ArcSwapOption<Session>,
    storage: Arc<dyn SessionStorage>,
    events: broadcast::Sender<SessionEvent>,
    write: Mutex<()>,
    /// Held for the duration of a token refresh
    refresh: tokio::sync::Mutex<()>,
    refreshes: AtomicU64,
}

/// Shared handle to the current session
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("authenticated", &self.is_authenticated())
            .field("storage", &self.inner.storage)
            .finish()
    }
}

impl SessionStore {
    /// Empty store backed by `storage`. Call [`SessionStore::restore`] to
    /// pick up a persisted session.
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            inner: Arc::new(Inner {
                current: ArcSwapOption::empty(),
                storage,
                events,
                write: Mutex::new(()),
                refresh: tokio::sync::Mutex::new(()),
                refreshes: AtomicU64::new(0),
            }),
        }
    }

    /// Store with in-memory storage only
    pub fn in_memory() -> Self {
        Self::new(Arc::new(storage::MemoryStorage::new()))
    }

    /// Load the persisted session, if it is complete and still usable.
    ///
    /// Unreadable records, partial records (a user without a token or the
    /// reverse) and records whose tokens have all expired are wiped.
    pub fn restore(&self) -> Result<Option<Session>, StorageError> {
        let _write = self.write_lock();
        let record = match self.inner.storage.load() {
            Ok(record) => record,
            Err(StorageError::Corrupt(err)) => {
                warn!(error = %err, "Discarding unreadable stored session");
                self.inner.storage.clear()?;
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        if record.is_empty() {
            return Ok(None);
        }
        let Some(session) = Session::from_record(record) else {
            warn!("Discarding incomplete stored session");
            self.inner.storage.clear()?;
            return Ok(None);
        };
        if !is_usable(&session) {
            info!("Stored session has expired");
            self.inner.storage.clear()?;
            return Ok(None);
        }
        debug!(user_id = %session.user.id, "Restored session");
        self.inner.current.store(Some(Arc::new(session.clone())));
        Ok(Some(session))
    }

    /// Start a session from a successful login
    pub fn login(&self, success: LoginSuccess) -> Result<(), StorageError> {
        let session = Session {
            user: success.user,
            access_token: success.access_token,
            refresh_token: success.refresh_token,
        };
        let user_id = session.user.id.clone();
        {
            let _write = self.write_lock();
            self.commit(session)?;
        }
        info!(%user_id, "Signed in");
        self.emit(SessionEvent::SignedIn { user_id });
        Ok(())
    }

    /// Swap in refreshed tokens, keeping the refresh token unless rotated
    pub fn replace_tokens(&self, tokens: TokenPair) -> Result<(), StorageError> {
        let updated = self.update(|current| Session {
            user: current.user.clone(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token.or_else(|| current.refresh_token.clone()),
        })?;
        if updated {
            self.emit(SessionEvent::TokensRefreshed);
        } else {
            warn!("Ignoring refreshed tokens for a cleared session");
        }
        Ok(())
    }

    /// Replace the stored profile
    pub fn update_user(&self, user: UserProfile) -> Result<(), StorageError> {
        let updated = self.update(|current| Session {
            user,
            access_token: current.access_token.clone(),
            refresh_token: current.refresh_token.clone(),
        })?;
        if updated {
            self.emit(SessionEvent::ProfileUpdated);
        }
        Ok(())
    }

    /// End the session. Memory is cleared even if storage cannot be.
    pub fn clear(&self, reason: SignOutReason) {
        let previous = {
            let _write = self.write_lock();
            if let Err(e) = self.inner.storage.clear() {
                warn!(error = %e, "Failed to clear stored session");
            }
            self.inner.current.swap(None)
        };
        if previous.is_some() {
            info!(?reason, "Signed out");
            self.emit(SessionEvent::SignedOut { reason });
        }
    }

    pub fn current(&self) -> Option<Arc<Session>> {
        self.inner.current.load_full()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current().is_some_and(|s| s.is_authenticated())
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.current().map(|s| s.user.clone())
    }

    pub fn access_token(&self) -> Option<String> {
        self.current().map(|s| s.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.current().and_then(|s| s.refresh_token.clone())
    }

    /// Receive every lifecycle event from now on
    pub fn subscribe(&self) -> Subscription<SessionEvent> {
        Subscription::new(self.inner.events.subscribe())
    }

    /// Refresh calls sent for this session, across every client sharing it
    pub fn refresh_count(&self) -> u64 {
        self.inner.refreshes.load(Ordering::Relaxed)
    }

    /// Wait for exclusive use of the refresh token
    pub(crate) async fn refresh_lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.inner.refresh.lock().await
    }

    pub(crate) fn record_refresh(&self) {
        self.inner.refreshes.fetch_add(1, Ordering::Relaxed);
    }

    fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.inner
            .write
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Derive and commit the next session from the current one. Returns
    /// `false` when signed out.
    fn update(&self, next: impl FnOnce(&Session) -> Session) -> Result<bool, StorageError> {
        let _write = self.write_lock();
        let Some(current) = self.current() else {
            return Ok(false);
        };
        self.commit(next(&current))?;
        Ok(true)
    }

    /// Callers hold the write lock
    fn commit(&self, session: Session) -> Result<(), StorageError> {
        self.inner.storage.save(&session.to_record()?)?;
        self.inner.current.store(Some(Arc::new(session)));
        Ok(())
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine
        let _ = self.inner.events.send(event);
    }
}

fn is_usable(session: &Session) -> bool {
    let now = chrono::Utc::now();
    let expired = |token: &str| {
        TokenClaims::decode_unverified(token)
            .map(|c| c.is_expired(now, TOKEN_EXPIRY_LEEWAY))
            .unwrap_or(false)
    };
    if !expired(&session.access_token) {
        return true;
    }
    session
        .refresh_token
        .as_deref()
        .is_some_and(|refresh| !expired(refresh))
}

#[cfg(test)]
mod tests {
    use super::claims::encode_test_token;
    use super::storage::MemoryStorage;
    use super::*;
    use serde_json::json;

    fn user(id: &str) -> UserProfile {
        serde_json::from_value(json!({ "id": id, "email": "ops@safawinet.com" })).unwrap()
    }

    fn success(access: &str, refresh: Option<&str>) -> LoginSuccess {
        LoginSuccess {
            user: user("u1"),
            access_token: access.into(),
            refresh_token: refresh.map(Into::into),
        }
    }

    #[test]
    fn test_login_writes_all_keys() {
        let storage = Arc::new(MemoryStorage::new());
        let store = SessionStore::new(storage.clone());
        store.login(success("a1", Some("r1"))).unwrap();

        let record = storage.load().unwrap();
        assert!(record.is_complete());
        assert_eq!(record.auth_token.as_deref(), Some("a1"));
        assert_eq!(record.refresh_token.as_deref(), Some("r1"));
        assert!(store.is_authenticated());
        assert_eq!(store.user().unwrap().id, "u1");
    }

    #[test]
    fn test_clear_removes_all_keys() {
        let storage = Arc::new(MemoryStorage::new());
        let store = SessionStore::new(storage.clone());
        store.login(success("a1", Some("r1"))).unwrap();
        store.clear(SignOutReason::UserLogout);

        assert!(storage.load().unwrap().is_empty());
        assert!(store.current().is_none());
        assert!(store.access_token().is_none());
    }

    #[test]
    fn test_replace_tokens_keeps_unrotated_refresh_token() {
        let store = SessionStore::in_memory();
        store.login(success("a1", Some("r1"))).unwrap();
        store
            .replace_tokens(TokenPair {
                access_token: "a2".into(),
                refresh_token: None,
            })
            .unwrap();
        assert_eq!(store.access_token().as_deref(), Some("a2"));
        assert_eq!(store.refresh_token().as_deref(), Some("r1"));

        store
            .replace_tokens(TokenPair {
                access_token: "a3".into(),
                refresh_token: Some("r2".into()),
            })
            .unwrap();
        assert_eq!(store.refresh_token().as_deref(), Some("r2"));
    }

    #[test]
    fn test_replace_tokens_after_clear_does_not_resurrect() {
        let storage = Arc::new(MemoryStorage::new());
        let store = SessionStore::new(storage.clone());
        store.login(success("a1", Some("r1"))).unwrap();
        store.clear(SignOutReason::RefreshFailed);
        store
            .replace_tokens(TokenPair {
                access_token: "a2".into(),
                refresh_token: None,
            })
            .unwrap();
        assert!(store.current().is_none());
        assert!(storage.load().unwrap().is_empty());
    }

    #[test]
    fn test_restore_discards_partial_record() {
        let storage = Arc::new(MemoryStorage::with_record(StoredSession {
            user: None,
            auth_token: Some("orphan".into()),
            refresh_token: Some("r1".into()),
        }));
        let store = SessionStore::new(storage.clone());
        assert!(store.restore().unwrap().is_none());
        assert!(storage.load().unwrap().is_empty());

        let storage = Arc::new(MemoryStorage::with_record(StoredSession {
            user: Some(serde_json::to_string(&user("u1")).unwrap()),
            auth_token: None,
            refresh_token: None,
        }));
        let store = SessionStore::new(storage.clone());
        assert!(store.restore().unwrap().is_none());
        assert!(storage.load().unwrap().is_empty());
    }

    #[test]
    fn test_restore_discards_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"user": "trunc"#).unwrap();

        let store = SessionStore::new(Arc::new(storage::FileStorage::new(&path)));
        assert_eq!(store.restore().unwrap(), None);
        assert!(!path.exists());

        // The store is usable again
        store.login(success("a1", Some("r1"))).unwrap();
        assert!(store.is_authenticated());
    }

    #[test]
    fn test_restore_complete_record() {
        let storage = Arc::new(MemoryStorage::new());
        SessionStore::new(storage.clone())
            .login(success("a1", Some("r1")))
            .unwrap();

        let store = SessionStore::new(storage);
        let session = store.restore().unwrap().unwrap();
        assert_eq!(session.user.id, "u1");
        assert!(store.is_authenticated());
    }

    #[test]
    fn test_restore_drops_fully_expired_session() {
        let past = chrono::Utc::now().timestamp() - 3600;
        let access = encode_test_token(&json!({ "exp": past }));
        let refresh = encode_test_token(&json!({ "exp": past }));
        let storage = Arc::new(MemoryStorage::new());
        SessionStore::new(storage.clone())
            .login(success(&access, Some(&refresh)))
            .unwrap();

        let store = SessionStore::new(storage.clone());
        assert!(store.restore().unwrap().is_none());
        assert!(storage.load().unwrap().is_empty());
    }

    #[test]
    fn test_restore_keeps_session_with_live_refresh_token() {
        let now = chrono::Utc::now().timestamp();
        let access = encode_test_token(&json!({ "exp": now - 60 }));
        let refresh = encode_test_token(&json!({ "exp": now + 86_400 }));
        let storage = Arc::new(MemoryStorage::new());
        SessionStore::new(storage.clone())
            .login(success(&access, Some(&refresh)))
            .unwrap();

        assert!(SessionStore::new(storage).restore().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_events_are_published() {
        let store = SessionStore::in_memory();
        let mut events = store.subscribe();
        store.login(success("a1", Some("r1"))).unwrap();
        store.clear(SignOutReason::Inactivity);

        assert_eq!(
            events.recv().await,
            Some(SessionEvent::SignedIn {
                user_id: "u1".into()
            })
        );
        assert_eq!(
            events.recv().await,
            Some(SessionEvent::SignedOut {
                reason: SignOutReason::Inactivity
            })
        );
    }
}
