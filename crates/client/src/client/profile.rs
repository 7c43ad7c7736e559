//! Profile management endpoints

use super::RequestSpec;
use super::typed::SafawiClient;
use crate::client::error::ClientError;
use safawinet_core::types::{ChangePasswordRequest, ProfileUpdate, UserPreferences, UserProfile};
use safawinet_core::validation::{validate_auto_logout_minutes, validate_password_change};

impl SafawiClient {
    /// Update identity fields; the stored profile follows the server's copy
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, ClientError> {
        let spec = RequestSpec::put("/api/users/profile").json(update)?;
        let user: UserProfile = self.fetch(spec).await?;
        self.session().update_user(user.clone())?;
        Ok(user)
    }

    /// Update theme, timezone, language or auto-logout preferences
    pub async fn update_preferences(
        &self,
        preferences: &UserPreferences,
    ) -> Result<UserProfile, ClientError> {
        if let Some(minutes) = preferences.auto_logout_minutes {
            validate_auto_logout_minutes(minutes)?;
        }
        let spec = RequestSpec::put("/api/users/preferences").json(preferences)?;
        let user: UserProfile = self.fetch(spec).await?;
        self.session().update_user(user.clone())?;
        Ok(user)
    }

    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<Option<String>, ClientError> {
        validate_password_change(current_password, new_password, confirm_password)?;
        let spec = RequestSpec::put("/api/users/change-password").json(&ChangePasswordRequest {
            current_password: current_password.to_string(),
            new_password: new_password.to_string(),
            confirm_password: confirm_password.to_string(),
        })?;
        self.send(spec).await
    }
}
