//! Single-flight access token refresh

use super::typed::PublicClient;
use crate::client::error::ClientError;
use crate::session::{SessionStore, SignOutReason};
use tracing::{info, warn};

/// Serializes refresh attempts for one session.
///
/// The lock lives in the [`SessionStore`], so every client built on the
/// same store shares it. Callers pass the token that was rejected. Whoever
/// takes the lock first refreshes; everyone queued behind it sees that the
/// session already holds a different token and reuses it instead of
/// refreshing again.
pub(crate) struct TokenRefresher {
    public: PublicClient,
    session: SessionStore,
}

impl TokenRefresher {
    pub(crate) fn new(public: PublicClient, session: SessionStore) -> Self {
        Self { public, session }
    }

    /// Return an access token newer than `failed_token`, refreshing if
    /// nobody else has. Clears the session when no refresh is possible.
    pub(crate) async fn refresh_after_failure(
        &self,
        failed_token: &str,
    ) -> Result<String, ClientError> {
        let _guard = self.session.refresh_lock().await;

        match self.session.access_token() {
            None => {
                return Err(ClientError::SessionExpired("signed out".into()));
            }
            Some(current) if current != failed_token => return Ok(current),
            Some(_) => {}
        }

        let Some(refresh_token) = self.session.refresh_token() else {
            warn!("Access token rejected and no refresh token is available");
            self.session.clear(SignOutReason::Unauthorized);
            return Err(ClientError::AuthenticationFailed(
                "access token rejected and no refresh token available".into(),
            ));
        };

        self.session.record_refresh();
        match self.public.refresh(&refresh_token).await {
            Ok(tokens) => {
                let access = tokens.access_token.clone();
                self.session.replace_tokens(tokens)?;
                if self.session.access_token().as_deref() != Some(access.as_str()) {
                    return Err(ClientError::SessionExpired(
                        "signed out during token refresh".into(),
                    ));
                }
                info!("Access token refreshed");
                Ok(access)
            }
            Err(err) => {
                warn!(error = %err, "Token refresh failed, clearing session");
                self.session.clear(SignOutReason::RefreshFailed);
                Err(ClientError::SessionExpired(err.to_string()))
            }
        }
    }
}
