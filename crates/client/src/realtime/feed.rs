//! Live dashboard state
//!
//! A background task keeps [`DashboardState`] current. While the socket is
//! up the first pushed update answers the snapshot request and replaces the
//! data, and later ones are merged into it by key; while it is down
//! it polls full snapshots through a [`PollGate`] and retries the socket
//! every `reconnect_interval`.

use super::gate::{PollDecision, PollGate};
use super::notifications::NotificationCenter;
use super::{ClientEvent, RealtimeConnection, RealtimeTransport, ServerEvent, SnapshotSource};
use crate::client::error::ClientError;
use crate::config::RealtimeConfig;
use chrono::{DateTime, Utc};
use safawinet_core::types::DashboardData;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// What a dashboard view renders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardState {
    pub data: DashboardData,
    /// Whether updates currently arrive over the socket
    pub connected: bool,
    pub last_updated: Option<DateTime<Utc>>,
    /// User-facing warning, e.g. while rate limited
    pub warning: Option<String>,
    /// Automatic fetches are suppressed until this instant
    pub cooldown_until: Option<Instant>,
}

impl DashboardState {
    fn replace(&mut self, snapshot: DashboardData) {
        self.data = snapshot;
        self.last_updated = Some(Utc::now());
    }

    fn merge(&mut self, partial: DashboardData) {
        self.data.extend(partial);
        self.last_updated = Some(Utc::now());
    }
}

struct Shared {
    source: Arc<dyn SnapshotSource>,
    gate: Mutex<PollGate>,
    state: watch::Sender<DashboardState>,
}

impl Shared {
    fn gate(&self) -> MutexGuard<'_, PollGate> {
        self.gate
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// One gated full fetch
    async fn poll(&self, manual: bool) -> PollDecision {
        let decision = self.gate().try_begin(Instant::now(), manual);
        if decision != PollDecision::Proceed {
            trace!(?decision, manual, "Dashboard fetch skipped");
            return decision;
        }

        let mut attempt = Attempt {
            shared: self,
            settled: false,
        };
        let result = self.source.fetch_snapshot().await;
        attempt.settled = true;

        match result {
            Ok(data) => {
                self.gate().finish();
                self.state.send_modify(|state| {
                    state.replace(data);
                    state.warning = None;
                    state.cooldown_until = None;
                });
            }
            Err(ClientError::RateLimited { retry_after, .. }) => {
                let now = Instant::now();
                let until = self.gate().finish_rate_limited(now, retry_after);
                let seconds = until.saturating_duration_since(now).as_secs();
                warn!(seconds, "Dashboard fetch rate limited, pausing automatic refresh");
                self.state.send_modify(|state| {
                    state.warning = Some(format!(
                        "Too many requests. Automatic refresh paused for {seconds}s"
                    ));
                    state.cooldown_until = Some(until);
                });
            }
            Err(err) => {
                self.gate().finish();
                warn!(error = %err, "Dashboard fetch failed");
                self.state.send_modify(|state| {
                    state.warning = Some(format!("Failed to load dashboard data: {err}"));
                });
            }
        }
        PollDecision::Proceed
    }

    fn set_connected(&self, connected: bool) {
        self.state.send_if_modified(|state| {
            let changed = state.connected != connected;
            state.connected = connected;
            changed
        });
    }
}

/// Releases the in-flight slot if a fetch is cancelled mid-flight
struct Attempt<'a> {
    shared: &'a Shared,
    settled: bool,
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.shared.gate().finish();
        }
    }
}

pub struct DashboardFeedBuilder {
    source: Arc<dyn SnapshotSource>,
    transport: Option<Arc<dyn RealtimeTransport>>,
    notifications: Option<NotificationCenter>,
    config: RealtimeConfig,
}

impl DashboardFeedBuilder {
    pub fn new(source: Arc<dyn SnapshotSource>) -> Self {
        Self {
            source,
            transport: None,
            notifications: None,
            config: RealtimeConfig::default(),
        }
    }

    /// Without a transport the feed only polls
    pub fn transport(mut self, transport: Arc<dyn RealtimeTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Receives pushed notification events
    pub fn notifications(mut self, center: NotificationCenter) -> Self {
        self.notifications = Some(center);
        self
    }

    pub fn config(mut self, config: RealtimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Start the background task. Must be called inside a tokio runtime.
    pub fn spawn(self) -> DashboardFeed {
        let (state, receiver) = watch::channel(DashboardState::default());
        let shared = Arc::new(Shared {
            source: self.source,
            gate: Mutex::new(PollGate::new(
                self.config.poll_interval,
                self.config.rate_limit_cooldown,
            )),
            state,
        });
        let task = tokio::spawn(run(
            shared.clone(),
            self.transport,
            self.notifications,
            self.config,
        ));
        DashboardFeed {
            shared,
            receiver,
            task,
        }
    }
}

/// Handle to a running dashboard updater. Dropping it stops the task.
pub struct DashboardFeed {
    shared: Arc<Shared>,
    receiver: watch::Receiver<DashboardState>,
    task: JoinHandle<()>,
}

impl DashboardFeed {
    pub fn builder(source: Arc<dyn SnapshotSource>) -> DashboardFeedBuilder {
        DashboardFeedBuilder::new(source)
    }

    pub fn state(&self) -> DashboardState {
        self.receiver.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardState> {
        self.receiver.clone()
    }

    /// Fetch a full snapshot now. Skips the debounce but still honours
    /// the in-flight guard and any rate-limit cool-down.
    pub async fn refresh_now(&self) -> PollDecision {
        self.shared.poll(true).await
    }

    pub fn shutdown(self) {}
}

impl Drop for DashboardFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    shared: Arc<Shared>,
    transport: Option<Arc<dyn RealtimeTransport>>,
    notifications: Option<NotificationCenter>,
    config: RealtimeConfig,
) {
    loop {
        if let Some(transport) = &transport {
            match tokio::time::timeout(config.connect_timeout, transport.connect()).await {
                Ok(Ok(connection)) => {
                    info!("Real-time channel connected");
                    shared.set_connected(true);
                    stream(&shared, connection, notifications.as_ref()).await;
                    shared.set_connected(false);
                    info!("Real-time channel disconnected, falling back to polling");
                }
                Ok(Err(err)) => debug!(error = %err, "Real-time connection failed"),
                Err(_) => debug!("Real-time connection timed out"),
            }
        }
        poll_until_reconnect(&shared, &config, transport.is_some()).await;
    }
}

/// Apply pushed events until the connection closes
async fn stream(
    shared: &Shared,
    mut connection: Box<dyn RealtimeConnection>,
    notifications: Option<&NotificationCenter>,
) {
    if let Err(err) = connection.send(ClientEvent::RequestDashboardData).await {
        warn!(error = %err, "Failed to request dashboard snapshot");
        return;
    }

    let mut awaiting_snapshot = true;
    while let Some(event) = connection.next_event().await {
        match event {
            Ok(ServerEvent::DashboardData(data)) => {
                let snapshot = std::mem::take(&mut awaiting_snapshot);
                shared.state.send_modify(|state| {
                    if snapshot {
                        state.replace(data);
                    } else {
                        state.merge(data);
                    }
                });
            }
            Ok(ServerEvent::Notification(notification)) => {
                if let Some(center) = notifications {
                    center.push(notification);
                }
            }
            Ok(ServerEvent::NotificationUpdate(update)) => {
                if let Some(center) = notifications {
                    center.apply(&update);
                }
            }
            Ok(ServerEvent::Other(frame)) => trace!(event = %frame.event, "Ignoring event"),
            Err(err) => warn!(error = %err, "Dropping malformed real-time frame"),
        }
    }
}

/// Poll on the configured interval; returns when it is time to retry the
/// socket, or never when there is no socket to retry
async fn poll_until_reconnect(shared: &Shared, config: &RealtimeConfig, reconnect: bool) {
    let reconnect_at = Instant::now() + config.reconnect_interval;
    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                shared.poll(false).await;
            }
            () = tokio::time::sleep_until(reconnect_at), if reconnect => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SafawiClient;
    use crate::realtime::MockSnapshotSource;
    use crate::session::SessionStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    const SECOND: Duration = Duration::from_secs(1);

    fn snapshot(value: serde_json::Value) -> DashboardData {
        serde_json::from_value(value).unwrap()
    }

    fn counting_source(
        responses: impl Fn(usize) -> Result<DashboardData, ClientError> + Send + 'static,
    ) -> (Arc<AtomicUsize>, Arc<dyn SnapshotSource>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut source = MockSnapshotSource::new();
        let counter = calls.clone();
        source.expect_fetch_snapshot().returning(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            responses(n)
        });
        (calls, Arc::new(source))
    }

    /// Transport handing out pre-arranged connections, refusing once empty
    #[derive(Default)]
    struct ScriptedTransport {
        connections: Mutex<Vec<mpsc::Receiver<ServerEvent>>>,
        sent: Arc<Mutex<Vec<ClientEvent>>>,
    }

    struct ScriptedConnection {
        events: mpsc::Receiver<ServerEvent>,
        sent: Arc<Mutex<Vec<ClientEvent>>>,
    }

    #[async_trait]
    impl RealtimeTransport for ScriptedTransport {
        async fn connect(&self) -> Result<Box<dyn RealtimeConnection>, ClientError> {
            let events = self
                .connections
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| ClientError::WebSocket("connection refused".into()))?;
            Ok(Box::new(ScriptedConnection {
                events,
                sent: self.sent.clone(),
            }))
        }
    }

    #[async_trait]
    impl RealtimeConnection for ScriptedConnection {
        async fn send(&mut self, event: ClientEvent) -> Result<(), ClientError> {
            self.sent.lock().unwrap().push(event);
            Ok(())
        }

        async fn next_event(&mut self) -> Option<Result<ServerEvent, ClientError>> {
            self.events.recv().await.map(Ok)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_on_interval_without_transport() {
        let (calls, source) = counting_source(|n| Ok(snapshot(json!({ "tick": n }))));
        let feed = DashboardFeed::builder(source).spawn();

        tokio::time::sleep(SECOND / 10).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let state = feed.state();
        assert_eq!(state.data["tick"], json!(0));
        assert!(!state.connected);
        assert!(state.last_updated.is_some());

        // Fetches at 5s and 10s
        tokio::time::sleep(SECOND * 12).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(feed.state().data["tick"], json!(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_refresh_skips_debounce_only() {
        let (calls, source) = counting_source(|_| Ok(DashboardData::new()));
        let feed = DashboardFeed::builder(source).spawn();
        tokio::time::sleep(SECOND / 10).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(feed.refresh_now().await, PollDecision::Proceed);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_suppresses_fetches_and_warns() {
        let (calls, source) = counting_source(|n| {
            if n == 0 {
                Err(ClientError::RateLimited {
                    message: "Too many requests".into(),
                    retry_after: None,
                })
            } else {
                Ok(snapshot(json!({ "ok": true })))
            }
        });
        let feed = DashboardFeed::builder(source).spawn();

        tokio::time::sleep(SECOND / 10).await;
        let state = feed.state();
        assert_eq!(
            state.warning.as_deref(),
            Some("Too many requests. Automatic refresh paused for 60s")
        );
        assert!(state.cooldown_until.is_some());

        tokio::time::sleep(SECOND * 55).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            feed.refresh_now().await,
            PollDecision::CoolingDown { .. }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(SECOND * 10).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let state = feed.state();
        assert_eq!(state.warning, None);
        assert_eq!(state.cooldown_until, None);
        assert_eq!(state.data["ok"], json!(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_sets_cooldown_length() {
        let (calls, source) = counting_source(|n| {
            if n == 0 {
                Err(ClientError::RateLimited {
                    message: "slow down".into(),
                    retry_after: Some(SECOND * 12),
                })
            } else {
                Ok(DashboardData::new())
            }
        });
        let feed = DashboardFeed::builder(source).spawn();
        tokio::time::sleep(SECOND / 10).await;
        assert_eq!(
            feed.state().warning.as_deref(),
            Some("Too many requests. Automatic refresh paused for 12s")
        );

        tokio::time::sleep(SECOND * 11).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        tokio::time::sleep(SECOND * 5).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_socket_updates_merge_then_fall_back_to_polling() {
        let (tx, rx) = mpsc::channel(8);
        let transport = Arc::new(ScriptedTransport::default());
        transport.connections.lock().unwrap().push(rx);
        let sent = transport.sent.clone();

        let (calls, source) = counting_source(|_| Ok(snapshot(json!({ "polled": true }))));
        let client = SafawiClient::new("http://localhost:9", SessionStore::in_memory()).unwrap();
        let center = NotificationCenter::new(client);

        let feed = DashboardFeed::builder(source)
            .transport(transport)
            .notifications(center.clone())
            .spawn();
        let mut state = feed.subscribe();

        tx.send(ServerEvent::DashboardData(snapshot(json!({ "a": 1, "b": 2 }))))
            .await
            .unwrap();
        tx.send(ServerEvent::DashboardData(snapshot(json!({ "b": 3 }))))
            .await
            .unwrap();
        tx.send(ServerEvent::Notification(
            serde_json::from_value(json!({
                "id": "n1",
                "title": "Login from new device",
                "createdAt": "2024-06-01T12:00:00Z"
            }))
                .unwrap(),
        ))
        .await
        .unwrap();

        let merged = state
            .wait_for(|s| s.data.get("b") == Some(&json!(3)))
            .await
            .unwrap()
            .clone();
        assert!(merged.connected);
        assert_eq!(merged.data["a"], json!(1));
        assert_eq!(sent.lock().unwrap().as_slice(), &[ClientEvent::RequestDashboardData]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(SECOND / 10).await;
        assert_eq!(center.unread_count(), 1);

        // Server goes away
        drop(tx);
        let polled = state
            .wait_for(|s| !s.connected && s.data.contains_key("polled"))
            .await
            .unwrap()
            .clone();
        assert_eq!(polled.data.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_socket_snapshot_replaces_polled_data() {
        let transport = Arc::new(ScriptedTransport::default());
        let (calls, source) = counting_source(|_| Ok(snapshot(json!({ "staleMetric": 1 }))));
        let feed = DashboardFeed::builder(source)
            .transport(transport.clone())
            .spawn();
        let mut state = feed.subscribe();

        tokio::time::sleep(SECOND / 10).await;
        assert_eq!(feed.state().data["staleMetric"], json!(1));

        // The socket comes up on the next reconnect attempt
        let (tx, rx) = mpsc::channel(8);
        transport.connections.lock().unwrap().push(rx);
        tx.send(ServerEvent::DashboardData(snapshot(json!({ "activeUsers": 3 }))))
            .await
            .unwrap();
        tx.send(ServerEvent::DashboardData(snapshot(json!({ "sessions": 2 }))))
            .await
            .unwrap();

        let live = state
            .wait_for(|s| s.connected && s.data.contains_key("sessions"))
            .await
            .unwrap()
            .clone();
        assert!(!live.data.contains_key("staleMetric"));
        assert_eq!(live.data["activeUsers"], json!(3));
        assert_eq!(live.data.len(), 2);
        assert!(calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_polling() {
        let (calls, source) = counting_source(|_| Ok(DashboardData::new()));
        let feed = DashboardFeed::builder(source).spawn();
        tokio::time::sleep(SECOND / 10).await;
        feed.shutdown();

        tokio::time::sleep(SECOND * 30).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
