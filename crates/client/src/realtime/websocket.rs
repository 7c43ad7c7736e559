//! WebSocket transport for the real-time channel

use super::{ClientEvent, Frame, RealtimeConnection, RealtimeTransport, ServerEvent};
use crate::client::error::ClientError;
use crate::session::SessionStore;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};
use url::Url;

/// Path of the event socket relative to the API base URL
pub const DEFAULT_SOCKET_PATH: &str = "/ws";

/// Connects to the dashboard event socket, authenticating with the
/// session's current access token as a `token` query parameter
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: Url,
    session: SessionStore,
    connect_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new(url: Url, session: SessionStore) -> Self {
        Self {
            url,
            session,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Derive the socket URL from an `http(s)` API base URL
    pub fn from_base_url(
        base_url: &str,
        path: &str,
        session: SessionStore,
    ) -> Result<Self, ClientError> {
        let mut url = Url::parse(base_url)
            .map_err(|e| ClientError::Configuration(format!("Invalid base URL: {e}")))?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(ClientError::Configuration(format!(
                    "Unsupported URL scheme: {other}"
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|()| ClientError::Configuration("Cannot set socket scheme".into()))?;
        url.set_path(path);
        Ok(Self::new(url, session))
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// URL for the next connection attempt, with the token attached
    pub fn connect_url(&self) -> Result<Url, ClientError> {
        let token = self
            .session
            .access_token()
            .ok_or(ClientError::NotAuthenticated)?;
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("token", &token);
        Ok(url)
    }
}

#[async_trait]
impl RealtimeTransport for WebSocketTransport {
    async fn connect(&self) -> Result<Box<dyn RealtimeConnection>, ClientError> {
        let url = self.connect_url()?;
        debug!(host = ?url.host_str(), "Opening real-time socket");

        let (stream, _response) =
            tokio::time::timeout(self.connect_timeout, connect_async(url.as_str()))
                .await
                .map_err(|_| ClientError::WebSocket("connect timed out".into()))?
                .map_err(|e| ClientError::WebSocket(e.to_string()))?;

        Ok(Box::new(WebSocketConnection { stream }))
    }
}

struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl RealtimeConnection for WebSocketConnection {
    async fn send(&mut self, event: ClientEvent) -> Result<(), ClientError> {
        let text = serde_json::to_string(&event.to_frame())?;
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| ClientError::WebSocket(e.to_string()))
    }

    async fn next_event(&mut self) -> Option<Result<ServerEvent, ClientError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => {
                    debug!(error = %e, "Real-time socket failed");
                    return None;
                }
            };
            match message {
                Message::Text(text) => {
                    return Some(Frame::parse(&text).and_then(ServerEvent::try_from));
                }
                Message::Binary(bytes) => {
                    let parsed = std::str::from_utf8(&bytes)
                        .map_err(|e| ClientError::WebSocket(e.to_string()))
                        .and_then(Frame::parse)
                        .and_then(ServerEvent::try_from);
                    return Some(parsed);
                }
                Message::Close(frame) => {
                    debug!(?frame, "Real-time socket closed by server");
                    return None;
                }
                // tungstenite answers pings itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                    trace!("Control frame");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safawinet_core::types::LoginSuccess;

    fn signed_in_store() -> SessionStore {
        let store = SessionStore::in_memory();
        store
            .login(LoginSuccess {
                user: serde_json::from_value(serde_json::json!({ "id": "u1" })).unwrap(),
                access_token: "abc.def".into(),
                refresh_token: None,
            })
            .unwrap();
        store
    }

    #[test]
    fn test_socket_url_from_base_url() {
        let transport = WebSocketTransport::from_base_url(
            "https://api.safawinet.com/",
            DEFAULT_SOCKET_PATH,
            signed_in_store(),
        )
        .unwrap();
        assert_eq!(
            transport.connect_url().unwrap().as_str(),
            "wss://api.safawinet.com/ws?token=abc.def"
        );

        let plain = WebSocketTransport::from_base_url(
            "http://localhost:3000",
            "/socket",
            signed_in_store(),
        )
        .unwrap();
        assert_eq!(
            plain.connect_url().unwrap().as_str(),
            "ws://localhost:3000/socket?token=abc.def"
        );
    }

    #[test]
    fn test_connect_url_requires_session() {
        let transport = WebSocketTransport::from_base_url(
            "http://localhost:3000",
            DEFAULT_SOCKET_PATH,
            SessionStore::in_memory(),
        )
        .unwrap();
        assert!(matches!(
            transport.connect_url(),
            Err(ClientError::NotAuthenticated)
        ));
        assert!(
            WebSocketTransport::from_base_url("ftp://x", "/ws", SessionStore::in_memory()).is_err()
        );
    }
}
