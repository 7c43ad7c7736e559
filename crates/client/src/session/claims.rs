//! Unverified JWT claim inspection
//!
//! The client never validates signatures; it only reads `exp` to avoid
//! sending a token it already knows is stale.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use safawinet_core::{CoreError, CoreResult};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Expiry, seconds since the epoch
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
}

impl TokenClaims {
    /// Decode the payload segment of a JWT without checking its signature
    pub fn decode_unverified(token: &str) -> CoreResult<Self> {
        let mut parts = token.split('.');
        let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => return Err(CoreError::invalid_token("expected three segments")),
        };
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| CoreError::invalid_token(e.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }

    /// Whether the token expires within `leeway` of `now`. Tokens without
    /// `exp` never expire locally.
    pub fn is_expired(&self, now: DateTime<Utc>, leeway: Duration) -> bool {
        let leeway = chrono::Duration::from_std(leeway).unwrap_or_else(|_| chrono::Duration::zero());
        self.expires_at().is_some_and(|exp| exp <= now + leeway)
    }
}

#[cfg(test)]
pub(crate) fn encode_test_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}
