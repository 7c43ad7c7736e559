//! SafawiNet core types and utilities
//!
//! Everything in this crate is transport-agnostic: the wire model of the
//! admin API, permission gating, input validation and the client-side
//! formatting of audit records.

pub mod access;
pub mod audit;
pub mod error;
pub mod types;
pub mod validation;

pub use access::{NavItem, PermissionSet, visible_navigation};
pub use audit::{AuditLogQuery, export_csv};
pub use error::{CoreError, CoreResult, ErrorCategory};
pub use types::{
    ApiResponse, AuditLogEntry, AuditLogPage, DashboardData, LoginOutcome, LoginRequest,
    LoginSuccess, Notification, NotificationList, NotificationUpdate, Permission, TokenPair,
    UserPreferences, UserProfile,
};
pub use validation::{LoginIdentifier, ValidationError, ValidationErrors};
