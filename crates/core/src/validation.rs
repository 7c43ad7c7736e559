//! Input validation for login and profile forms
//!
//! Failures land in the validation category: they are collected per field
//! and shown inline, never sent to the server.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9][0-9\s\-()]{6,18}[0-9]$").expect("valid phone regex"));
static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]{3,32}$").expect("valid username regex"));
static TWO_FACTOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{6}$").expect("valid code regex"));

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_AUTO_LOGOUT_MINUTES: u32 = 24 * 60;

/// A single failed field check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// All field failures of one form submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("Validation failed: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(ValidationError::new(field, message));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First message reported for `field`
    pub fn for_field(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }

    fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

/// What kind of account identifier the user typed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginIdentifier {
    Email,
    Phone,
    Username,
}

impl LoginIdentifier {
    /// Classify a raw identifier, or `None` if it matches no accepted shape
    pub fn classify(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.contains('@') {
            return EMAIL_RE.is_match(input).then_some(Self::Email);
        }
        if PHONE_RE.is_match(input) {
            return Some(Self::Phone);
        }
        USERNAME_RE.is_match(input).then_some(Self::Username)
    }
}

pub fn validate_login(identifier: &str, password: &str) -> Result<LoginIdentifier, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    let kind = if identifier.trim().is_empty() {
        errors.push("identifier", "Username, email or phone is required");
        None
    } else {
        let kind = LoginIdentifier::classify(identifier);
        if kind.is_none() {
            errors.push("identifier", "Enter a valid username, email or phone number");
        }
        kind
    };
    if password.is_empty() {
        errors.push("password", "Password is required");
    }
    match kind {
        Some(kind) if errors.is_empty() => Ok(kind),
        _ => Err(errors),
    }
}

pub fn validate_two_factor_code(code: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    if !TWO_FACTOR_RE.is_match(code.trim()) {
        errors.push("code", "Enter the 6-digit code from your authenticator");
    }
    errors.into_result()
}

pub fn validate_password_change(
    current: &str,
    new: &str,
    confirm: &str,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    if current.is_empty() {
        errors.push("currentPassword", "Current password is required");
    }
    if new.chars().count() < MIN_PASSWORD_LEN {
        errors.push(
            "newPassword",
            format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        );
    }
    if !new.chars().any(|c| c.is_ascii_uppercase())
        || !new.chars().any(|c| c.is_ascii_lowercase())
        || !new.chars().any(|c| c.is_ascii_digit())
    {
        errors.push(
            "newPassword",
            "Password must contain upper and lower case letters and a digit",
        );
    }
    if !current.is_empty() && new == current {
        errors.push("newPassword", "New password must differ from the current one");
    }
    if new != confirm {
        errors.push("confirmPassword", "Passwords do not match");
    }
    errors.into_result()
}

pub fn validate_auto_logout_minutes(minutes: u32) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    if minutes == 0 || minutes > MAX_AUTO_LOGOUT_MINUTES {
        errors.push(
            "autoLogoutMinutes",
            format!("Auto-logout must be between 1 and {MAX_AUTO_LOGOUT_MINUTES} minutes"),
        );
    }
    errors.into_result()
}
