//! Public and session-backed API clients
//!
//! [`PublicClient`] only reaches endpoints that need no credentials.
//! [`SafawiClient`] reads the bearer token from a [`SessionStore`] on every
//! call and recovers from an expired access token with a single refresh.

use super::refresh::TokenRefresher;
use super::{HttpCore, RequestSpec};
use crate::client::error::ClientError;
use crate::config::TOKEN_EXPIRY_LEEWAY;
use crate::session::claims::TokenClaims;
use crate::session::SessionStore;
use safawinet_core::types::ApiResponse;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

/// Client for public endpoints that don't require authentication
#[derive(Clone)]
pub struct PublicClient {
    core: HttpCore,
}

impl PublicClient {
    pub(crate) fn from_core(core: HttpCore) -> Self {
        Self { core }
    }

    /// Create a new public client
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        super::ClientBuilder::new().base_url(base_url).build_public()
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        self.core.base_url()
    }

    pub(crate) async fn call<T: DeserializeOwned>(
        &self,
        spec: &RequestSpec,
    ) -> Result<ApiResponse<T>, ClientError> {
        self.core.execute(self.core.request(spec, None)).await
    }

    /// Attach credentials to this client's connection
    pub fn authenticate(self, session: SessionStore) -> SafawiClient {
        SafawiClient::from_core(self.core, session)
    }
}

/// Client for endpoints that require a signed-in session
#[derive(Clone)]
pub struct SafawiClient {
    core: HttpCore,
    session: SessionStore,
    refresher: Arc<TokenRefresher>,
}

impl SafawiClient {
    pub(crate) fn from_core(core: HttpCore, session: SessionStore) -> Self {
        let refresher = Arc::new(TokenRefresher::new(
            PublicClient::from_core(core.clone()),
            session.clone(),
        ));
        Self {
            core,
            session,
            refresher,
        }
    }

    /// Create a new session-backed client
    pub fn new(base_url: impl Into<String>, session: SessionStore) -> Result<Self, ClientError> {
        super::ClientBuilder::new().base_url(base_url).build(session)
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        self.core.base_url()
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// A client for the unauthenticated endpoints on the same connection
    pub fn to_public(&self) -> PublicClient {
        PublicClient::from_core(self.core.clone())
    }

    /// Number of refresh calls sent for this client's session
    pub fn refresh_count(&self) -> u64 {
        self.session.refresh_count()
    }

    /// Send an authenticated call.
    ///
    /// On a 401 the token is refreshed once (shared with any concurrent
    /// callers that failed with the same token) and the call is replayed
    /// once. A second 401 is returned as is.
    pub(crate) async fn call<T: DeserializeOwned>(
        &self,
        spec: RequestSpec,
    ) -> Result<ApiResponse<T>, ClientError> {
        let mut token = self
            .session
            .access_token()
            .ok_or(ClientError::NotAuthenticated)?;

        if spec.allows_refresh() && self.is_expired(&token) && self.session.refresh_token().is_some()
        {
            debug!(path = %spec.path, "Access token expired locally, refreshing before send");
            token = self.refresher.refresh_after_failure(&token).await?;
        }

        match self.core.execute(self.core.request(&spec, Some(&token))).await {
            Err(err) if err.is_auth_expired() && spec.allows_refresh() => {
                debug!(path = %spec.path, "Access token rejected, attempting refresh");
                let fresh = self.refresher.refresh_after_failure(&token).await?;
                self.core
                    .execute(self.core.request(&spec, Some(&fresh)))
                    .await
            }
            other => other,
        }
    }

    /// Authenticated call that must carry `data`
    pub(crate) async fn fetch<T: DeserializeOwned>(
        &self,
        spec: RequestSpec,
    ) -> Result<T, ClientError> {
        self.call(spec).await?.data.ok_or(ClientError::MissingData)
    }

    /// Authenticated call whose `data` is ignored
    pub(crate) async fn send(&self, spec: RequestSpec) -> Result<Option<String>, ClientError> {
        let envelope: ApiResponse<serde_json::Value> = self.call(spec).await?;
        Ok(envelope.message)
    }

    fn is_expired(&self, token: &str) -> bool {
        TokenClaims::decode_unverified(token)
            .map(|claims| claims.is_expired(chrono::Utc::now(), TOKEN_EXPIRY_LEEWAY))
            .unwrap_or(false)
    }
}
