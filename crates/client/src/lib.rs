//! SafawiNet admin client
//!
//! Session-aware access to the SafawiNet administrative API:
//! - [`session::SessionStore`] holds the signed-in user and tokens
//! - [`SafawiClient`] attaches the bearer token and refreshes it once on a 401
//! - [`idle::AutoLogout`] ends the session after a period of inactivity
//! - [`realtime::DashboardFeed`] keeps dashboard data live over a WebSocket,
//!   polling while the socket is down

pub mod client;
pub mod config;
pub mod events;
pub mod idle;
pub mod realtime;
pub mod session;

pub use client::error::ClientError;
pub use client::notifications::NotificationFilter;
pub use client::{ClientBuilder, PublicClient, SafawiClient};
pub use config::RealtimeConfig;
pub use events::Subscription;
pub use idle::{ActivityEvent, AutoLogout, AutoLogoutConfig, IdleState};
pub use realtime::{
    DashboardFeed, DashboardState, NotificationCenter, NotificationEvent, PollDecision,
    WebSocketTransport,
};
pub use session::storage::{FileStorage, MemoryStorage, SessionStorage, StorageError};
pub use session::{Session, SessionEvent, SessionStore, SignOutReason};

/// Result type alias
pub type Result<T> = std::result::Result<T, ClientError>;
