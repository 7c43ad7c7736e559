//! Session persistence across restarts and storage failures

use safawinet_client::session::storage::StoredSession;
use safawinet_client::{
    AutoLogout, FileStorage, IdleState, SessionStorage, SessionStore, SignOutReason,
    StorageError,
};
use safawinet_core::types::{LoginSuccess, TokenPair};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use tempfile::TempDir;

fn success(access: &str) -> LoginSuccess {
    LoginSuccess {
        user: serde_json::from_value(json!({
            "id": "u1",
            "username": "admin",
            "preferences": { "autoLogoutMinutes": 1 }
        }))
        .unwrap(),
        access_token: access.to_string(),
        refresh_token: Some("refresh-1".to_string()),
    }
}

/// Storage whose writes can be switched off
#[derive(Debug, Default)]
struct FlakyStorage {
    failing: AtomicBool,
    inner: safawinet_client::MemoryStorage,
}

impl FlakyStorage {
    fn check(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("disk full")));
        }
        Ok(())
    }
}

impl SessionStorage for FlakyStorage {
    fn load(&self) -> Result<StoredSession, StorageError> {
        self.inner.load()
    }

    fn save(&self, record: &StoredSession) -> Result<(), StorageError> {
        self.check()?;
        self.inner.save(record)
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.check()?;
        self.inner.clear()
    }
}

/// Storage whose next write blocks until released
#[derive(Debug)]
struct PausingStorage {
    armed: AtomicBool,
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
    inner: safawinet_client::MemoryStorage,
}

impl SessionStorage for PausingStorage {
    fn load(&self) -> Result<StoredSession, StorageError> {
        self.inner.load()
    }

    fn save(&self, record: &StoredSession) -> Result<(), StorageError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
        }
        self.inner.save(record)
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.inner.clear()
    }
}

#[test]
fn test_clear_during_token_write_stays_signed_out() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let storage = Arc::new(PausingStorage {
        armed: AtomicBool::new(false),
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
        inner: safawinet_client::MemoryStorage::default(),
    });
    let store = SessionStore::new(storage.clone());
    store.login(success("access-1")).unwrap();
    storage.armed.store(true, Ordering::SeqCst);

    let refreshing = {
        let store = store.clone();
        thread::spawn(move || {
            store.replace_tokens(TokenPair {
                access_token: "access-2".into(),
                refresh_token: None,
            })
        })
    };
    entered_rx.recv().unwrap();

    let clearing = {
        let store = store.clone();
        thread::spawn(move || store.clear(SignOutReason::Inactivity))
    };
    release_tx.send(()).unwrap();

    refreshing.join().unwrap().unwrap();
    clearing.join().unwrap();

    assert!(!store.is_authenticated());
    assert!(storage.load().unwrap().is_empty());
}

#[test]
fn test_session_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");

    let store = SessionStore::new(Arc::new(FileStorage::new(&path)));
    store.login(success("access-1")).unwrap();

    let restarted = SessionStore::new(Arc::new(FileStorage::new(&path)));
    let session = restarted.restore().unwrap().expect("session restored");
    assert_eq!(session.access_token, "access-1");
    assert_eq!(session.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(restarted.user().unwrap().username.as_deref(), Some("admin"));

    restarted.clear(SignOutReason::UserLogout);
    let again = SessionStore::new(Arc::new(FileStorage::new(&path)));
    assert_eq!(again.restore().unwrap(), None);
}

#[test]
fn test_failed_write_leaves_memory_untouched() {
    let storage = Arc::new(FlakyStorage::default());
    let store = SessionStore::new(storage.clone());
    store.login(success("access-1")).unwrap();

    storage.failing.store(true, Ordering::SeqCst);
    assert!(store.login(success("access-2")).is_err());
    assert!(
        store
            .replace_tokens(TokenPair {
                access_token: "access-3".into(),
                refresh_token: None,
            })
            .is_err()
    );
    assert_eq!(store.access_token().as_deref(), Some("access-1"));

    let stored = storage.load().unwrap();
    assert_eq!(stored.auth_token.as_deref(), Some("access-1"));
    assert!(stored.is_complete());

    // Clearing still ends the in-memory session
    store.clear(SignOutReason::UserLogout);
    assert!(!store.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn test_inactivity_clears_session() {
    let store = SessionStore::in_memory();
    store.login(success("access-1")).unwrap();

    let mut timer = AutoLogout::for_session(&store).expect("signed in");
    assert_eq!(timer.timeout(), std::time::Duration::from_secs(60));
    assert_eq!(timer.finished().await, IdleState::Expired);
    assert!(!store.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn test_timer_stops_when_user_changes() {
    let store = SessionStore::in_memory();
    store.login(success("access-1")).unwrap();
    let mut timer = AutoLogout::for_session(&store).expect("signed in");

    let mut other = success("access-other");
    other.user.id = "u2".into();
    store.login(other).unwrap();

    assert_eq!(timer.finished().await, IdleState::Stopped);
    // The new user's session is not touched by the old timer
    tokio::time::sleep(std::time::Duration::from_secs(120)).await;
    assert!(store.is_authenticated());
}
