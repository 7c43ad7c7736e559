//! Authentication endpoints

use super::RequestSpec;
use super::typed::{PublicClient, SafawiClient};
use crate::client::error::ClientError;
use crate::session::SignOutReason;
use safawinet_core::types::{
    LoginOutcome, LoginRequest, RefreshRequest, TokenPair, TwoFactorRequest, UserProfile,
};
use safawinet_core::validation::{validate_login, validate_two_factor_code};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ForgotPasswordRequest<'a> {
    identifier: &'a str,
}

/// Authentication endpoints for the public client
impl PublicClient {
    /// Exchange credentials for tokens, or learn that a second factor is due
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginOutcome, ClientError> {
        let spec = RequestSpec::post("/api/auth/login").json(request)?;
        self.call(&spec).await?.data.ok_or(ClientError::MissingData)
    }

    /// Complete a login that required a second factor
    pub async fn verify_two_factor(
        &self,
        request: &TwoFactorRequest,
    ) -> Result<LoginOutcome, ClientError> {
        let spec = RequestSpec::post("/api/auth/verify-2fa").json(request)?;
        self.call(&spec).await?.data.ok_or(ClientError::MissingData)
    }

    /// Mint a new access token
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ClientError> {
        let spec = RequestSpec::post("/api/auth/refresh").json(&RefreshRequest {
            refresh_token: refresh_token.to_string(),
        })?;
        self.call(&spec).await?.data.ok_or(ClientError::MissingData)
    }

    /// Ask the server to send a password reset link
    pub async fn forgot_password(&self, identifier: &str) -> Result<Option<String>, ClientError> {
        let spec = RequestSpec::post("/api/auth/forgot-password")
            .json(&ForgotPasswordRequest { identifier })?;
        let envelope: safawinet_core::ApiResponse<serde_json::Value> = self.call(&spec).await?;
        Ok(envelope.message)
    }
}

/// Session lifecycle for the authenticated client
impl SafawiClient {
    /// Validate, log in and store the session on success.
    ///
    /// Returns the outcome so callers can prompt for a second factor.
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<LoginOutcome, ClientError> {
        let kind = validate_login(identifier, password)?;
        let request = LoginRequest {
            identifier: identifier.trim().to_string(),
            password: password.to_string(),
            remember_me,
        };
        let outcome = self.to_public().login(&request).await?;
        self.accept(&outcome)?;
        let two_factor = matches!(outcome, LoginOutcome::TwoFactorRequired { .. });
        info!(identifier_kind = ?kind, two_factor, "Login completed");
        Ok(outcome)
    }

    /// Submit the second-factor code for a pending login
    pub async fn verify_two_factor(
        &self,
        user_id: &str,
        code: &str,
    ) -> Result<LoginOutcome, ClientError> {
        validate_two_factor_code(code)?;
        let request = TwoFactorRequest {
            user_id: user_id.to_string(),
            code: code.trim().to_string(),
        };
        let outcome = self.to_public().verify_two_factor(&request).await?;
        self.accept(&outcome)?;
        Ok(outcome)
    }

    fn accept(&self, outcome: &LoginOutcome) -> Result<(), ClientError> {
        if let LoginOutcome::Authenticated(success) = outcome {
            self.session().login(success.clone())?;
        }
        Ok(())
    }

    /// Current user as the server sees it; the stored profile is updated
    pub async fn me(&self) -> Result<UserProfile, ClientError> {
        let user: UserProfile = self.fetch(RequestSpec::get("/api/auth/me")).await?;
        self.session().update_user(user.clone())?;
        Ok(user)
    }

    /// Revoke the refresh token server-side and clear the local session.
    ///
    /// The local session is cleared even when the server call fails.
    pub async fn logout(&self) -> Result<(), ClientError> {
        if self.session().current().is_none() {
            return Ok(());
        }
        let spec = match self.session().refresh_token() {
            Some(refresh_token) => {
                RequestSpec::post("/api/auth/logout").json(&RefreshRequest { refresh_token })?
            }
            None => RequestSpec::post("/api/auth/logout"),
        };
        if let Err(err) = self.send(spec).await {
            warn!(error = %err, "Server logout failed, clearing local session anyway");
        }
        self.session().clear(SignOutReason::UserLogout);
        Ok(())
    }
}
