//! Real-time dashboard and notification updates
//!
//! Server pushes arrive as named events over a WebSocket. When the socket
//! is down the dashboard falls back to gated REST polling.

pub mod feed;
pub mod gate;
pub mod notifications;
pub mod websocket;

use crate::client::error::ClientError;
use async_trait::async_trait;
use safawinet_core::types::{DashboardData, Notification, NotificationUpdate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use feed::{DashboardFeed, DashboardFeedBuilder, DashboardState};
pub use gate::{PollDecision, PollGate};
pub use notifications::{NotificationCenter, NotificationEvent};
pub use websocket::WebSocketTransport;

pub const EVENT_DASHBOARD_UPDATE: &str = "dashboard-data-update";
pub const EVENT_NOTIFICATION: &str = "notification";
pub const EVENT_NOTIFICATION_UPDATE: &str = "notification-update";
pub const EVENT_REQUEST_DASHBOARD: &str = "request-dashboard-data";

/// Raw `{ "event": ..., "data": ... }` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    /// Parse a text frame. Besides the plain JSON object form, Socket.IO
    /// style event packets (`42["name", data]`) are accepted.
    pub fn parse(text: &str) -> Result<Self, ClientError> {
        let text = text.trim();
        if text.starts_with('{') {
            return Ok(serde_json::from_str(text)?);
        }
        let Some(start) = text.find('[') else {
            return Err(ClientError::WebSocket(format!("unrecognised frame: {text}")));
        };
        let mut parts: Vec<Value> = serde_json::from_str(&text[start..])?;
        if parts.is_empty() {
            return Err(ClientError::WebSocket("empty event packet".into()));
        }
        let data = if parts.len() > 1 {
            parts.swap_remove(1)
        } else {
            Value::Null
        };
        match parts.swap_remove(0) {
            Value::String(event) => Ok(Self { event, data }),
            other => Err(ClientError::WebSocket(format!(
                "event name must be a string, got {other}"
            ))),
        }
    }
}

/// Events pushed by the server
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Full or partial dashboard data, merged by key
    DashboardData(DashboardData),
    Notification(Notification),
    NotificationUpdate(NotificationUpdate),
    /// Anything this client does not handle
    Other(Frame),
}

impl TryFrom<Frame> for ServerEvent {
    type Error = ClientError;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        Ok(match frame.event.as_str() {
            EVENT_DASHBOARD_UPDATE => Self::DashboardData(serde_json::from_value(frame.data)?),
            EVENT_NOTIFICATION => Self::Notification(serde_json::from_value(frame.data)?),
            EVENT_NOTIFICATION_UPDATE => {
                Self::NotificationUpdate(serde_json::from_value(frame.data)?)
            }
            _ => Self::Other(frame),
        })
    }
}

/// Events sent to the server
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    RequestDashboardData,
}

impl ClientEvent {
    pub fn to_frame(&self) -> Frame {
        match self {
            Self::RequestDashboardData => Frame {
                event: EVENT_REQUEST_DASHBOARD.to_string(),
                data: Value::Null,
            },
        }
    }
}

/// Opens real-time connections
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn RealtimeConnection>, ClientError>;
}

/// One open real-time connection
#[async_trait]
pub trait RealtimeConnection: Send {
    async fn send(&mut self, event: ClientEvent) -> Result<(), ClientError>;

    /// Next server event; `None` once the connection has closed
    async fn next_event(&mut self) -> Option<Result<ServerEvent, ClientError>>;
}

/// Full-snapshot source used while the socket is down
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<DashboardData, ClientError>;
}
