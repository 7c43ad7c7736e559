//! Activity-based automatic logout
//!
//! One tokio task per timer sleeps until the current deadline. Qualifying
//! activity pushes the deadline forward; if it passes untouched the
//! expiry callback runs exactly once. Dropping the [`AutoLogout`] handle,
//! signing out, or a different user signing in tears the task down.

use crate::config::DEFAULT_AUTO_LOGOUT;
use crate::events::Subscription;
use crate::session::{SessionEvent, SessionStore, SignOutReason};
use safawinet_core::types::UserProfile;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// User interactions that may count as activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityEvent {
    MouseMove,
    MouseDown,
    Click,
    KeyPress,
    Scroll,
    TouchStart,
    /// A command issued from a non-pointer front end
    Command,
}

impl ActivityEvent {
    pub const ALL: [Self; 7] = [
        Self::MouseMove,
        Self::MouseDown,
        Self::Click,
        Self::KeyPress,
        Self::Scroll,
        Self::TouchStart,
        Self::Command,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleState {
    /// Counting down
    Active,
    /// Deadline passed, logout fired
    Expired,
    /// Torn down without firing
    Stopped,
}

#[derive(Debug, Clone)]
pub struct AutoLogoutConfig {
    pub timeout: Duration,
    pub events: HashSet<ActivityEvent>,
}

impl Default for AutoLogoutConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_AUTO_LOGOUT,
            events: ActivityEvent::ALL.into_iter().collect(),
        }
    }
}

impl AutoLogoutConfig {
    /// Default events with the user's preferred timeout
    pub fn for_user(user: &UserProfile) -> Self {
        let timeout = user
            .preferences
            .auto_logout_minutes
            .filter(|m| *m > 0)
            .map_or(DEFAULT_AUTO_LOGOUT, |m| Duration::from_secs(u64::from(m) * 60));
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn with_events(mut self, events: impl IntoIterator<Item = ActivityEvent>) -> Self {
        self.events = events.into_iter().collect();
        self
    }
}

/// Handle to a running auto-logout timer
#[derive(Debug)]
pub struct AutoLogout {
    config: AutoLogoutConfig,
    deadline: watch::Sender<Instant>,
    state: watch::Receiver<IdleState>,
    task: JoinHandle<()>,
}

impl AutoLogout {
    /// Start counting down; `on_expire` runs once if the deadline passes
    pub fn start<F>(config: AutoLogoutConfig, on_expire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::spawn(config, on_expire, None)
    }

    /// Timer bound to the current session: expiry clears the session, and
    /// the timer stops when that user signs out or someone else signs in.
    pub fn for_session(store: &SessionStore) -> Option<Self> {
        let user = store.user()?;
        let config = AutoLogoutConfig::for_user(&user);
        let events = store.subscribe();
        let store = store.clone();
        Some(Self::spawn(
            config,
            move || store.clear(SignOutReason::Inactivity),
            Some((events, user.id)),
        ))
    }

    fn spawn<F>(
        config: AutoLogoutConfig,
        on_expire: F,
        session: Option<(Subscription<SessionEvent>, String)>,
    ) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let (deadline_tx, deadline_rx) = watch::channel(Instant::now() + config.timeout);
        let (state_tx, state_rx) = watch::channel(IdleState::Active);
        let task = tokio::spawn(run(deadline_rx, state_tx, on_expire, session));
        debug!(timeout = ?config.timeout, "Auto-logout timer started");
        Self {
            config,
            deadline: deadline_tx,
            state: state_rx,
            task,
        }
    }

    /// Register user activity. Returns whether the countdown was reset.
    pub fn record(&self, event: ActivityEvent) -> bool {
        if self.state() != IdleState::Active || !self.config.events.contains(&event) {
            return false;
        }
        self.deadline.send_replace(Instant::now() + self.config.timeout);
        true
    }

    pub fn state(&self) -> IdleState {
        *self.state.borrow()
    }

    /// When logout fires if nothing else happens
    pub fn deadline(&self) -> Instant {
        *self.deadline.borrow()
    }

    pub fn remaining(&self) -> Duration {
        self.deadline().saturating_duration_since(Instant::now())
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Wait until the timer expires or stops
    pub async fn finished(&mut self) -> IdleState {
        let _ = self
            .state
            .wait_for(|state| *state != IdleState::Active)
            .await;
        self.state()
    }

    /// Tear the timer down without firing
    pub fn stop(self) {}
}

impl Drop for AutoLogout {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum Exit {
    Expired,
    Stopped,
}

async fn run<F>(
    mut deadline: watch::Receiver<Instant>,
    state: watch::Sender<IdleState>,
    on_expire: F,
    mut session: Option<(Subscription<SessionEvent>, String)>,
) where
    F: FnOnce() + Send + 'static,
{
    let exit = loop {
        let current = *deadline.borrow_and_update();
        tokio::select! {
            () = tokio::time::sleep_until(current) => {
                if deadline.has_changed().unwrap_or(false) {
                    continue;
                }
                break Exit::Expired;
            }
            changed = deadline.changed() => {
                if changed.is_err() {
                    break Exit::Stopped;
                }
            }
            event = next_session_event(&mut session) => {
                if ends_timer(event.as_ref(), session.as_ref().map(|(_, id)| id.as_str())) {
                    break Exit::Stopped;
                }
            }
        }
    };

    match exit {
        Exit::Expired => {
            info!("No activity before deadline, logging out");
            state.send_replace(IdleState::Expired);
            on_expire();
        }
        Exit::Stopped => {
            debug!("Auto-logout timer stopped");
            state.send_replace(IdleState::Stopped);
        }
    }
}

async fn next_session_event(
    session: &mut Option<(Subscription<SessionEvent>, String)>,
) -> Option<SessionEvent> {
    match session {
        Some((events, _)) => events.recv().await,
        None => std::future::pending().await,
    }
}

fn ends_timer(event: Option<&SessionEvent>, owner: Option<&str>) -> bool {
    match event {
        // Publisher gone: the store no longer exists
        None => true,
        Some(SessionEvent::SignedOut { .. }) => true,
        Some(SessionEvent::SignedIn { user_id }) => owner != Some(user_id.as_str()),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const MINUTE: Duration = Duration::from_secs(60);

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let fired = Arc::new(AtomicUsize::new(0));
        let hook = {
            let fired = fired.clone();
            move || {
                fired.fetch_add(1, Ordering::SeqCst);
            }
        };
        (fired, hook)
    }

    fn config(minutes: u64) -> AutoLogoutConfig {
        AutoLogoutConfig {
            timeout: MINUTE * u32::try_from(minutes).unwrap(),
            ..AutoLogoutConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_timeout() {
        let (fired, hook) = counter();
        let timer = AutoLogout::start(config(30), hook);

        tokio::time::sleep(MINUTE * 29).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(timer.state(), IdleState::Active);

        tokio::time::sleep(MINUTE * 2).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(timer.state(), IdleState::Expired);

        tokio::time::sleep(MINUTE * 60).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.record(ActivityEvent::KeyPress));
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_pushes_deadline_forward() {
        let (fired, hook) = counter();
        let timer = AutoLogout::start(config(30), hook);

        tokio::time::sleep(MINUTE * 20).await;
        let before = timer.deadline();
        assert!(timer.record(ActivityEvent::MouseMove));
        assert_eq!(timer.deadline() - before, MINUTE * 20);

        // 40 minutes since start, 20 since activity
        tokio::time::sleep(MINUTE * 20).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(MINUTE * 11).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfigured_events_are_ignored() {
        let (fired, hook) = counter();
        let timer = AutoLogout::start(
            config(10).with_events([ActivityEvent::KeyPress]),
            hook,
        );

        tokio::time::sleep(MINUTE * 9).await;
        assert!(!timer.record(ActivityEvent::MouseMove));
        tokio::time::sleep(MINUTE * 2).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_tears_down_without_firing() {
        let (fired, hook) = counter();
        let timer = AutoLogout::start(config(1), hook);
        drop(timer);
        tokio::time::sleep(MINUTE * 5).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_config_for_user_preference() {
        let mut user: UserProfile =
            serde_json::from_value(serde_json::json!({ "id": "u1" })).unwrap();
        assert_eq!(AutoLogoutConfig::for_user(&user).timeout, DEFAULT_AUTO_LOGOUT);
        user.preferences.auto_logout_minutes = Some(5);
        assert_eq!(AutoLogoutConfig::for_user(&user).timeout, MINUTE * 5);
        user.preferences.auto_logout_minutes = Some(0);
        assert_eq!(AutoLogoutConfig::for_user(&user).timeout, DEFAULT_AUTO_LOGOUT);
    }

    #[test]
    fn test_session_events_that_end_timer() {
        let signed_out = SessionEvent::SignedOut {
            reason: SignOutReason::UserLogout,
        };
        let same_user = SessionEvent::SignedIn {
            user_id: "u1".into(),
        };
        let other_user = SessionEvent::SignedIn {
            user_id: "u2".into(),
        };
        assert!(ends_timer(Some(&signed_out), Some("u1")));
        assert!(!ends_timer(Some(&same_user), Some("u1")));
        assert!(ends_timer(Some(&other_user), Some("u1")));
        assert!(!ends_timer(Some(&SessionEvent::TokensRefreshed), Some("u1")));
        assert!(ends_timer(None, Some("u1")));
    }
}
