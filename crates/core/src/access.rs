//! Page/action permission gating
//!
//! Permissions come from the server with the user profile and are only used
//! to decide what to show. The server enforces them again on every call.

use crate::types::{Permission, UserProfile};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Actions the dashboard gates on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    View,
    Create,
    Edit,
    Delete,
    Export,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Create => "create",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::Export => "export",
        }
    }
}

/// Lookup table built from a user's permission list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    super_admin: bool,
    pages: BTreeMap<String, BTreeSet<String>>,
}

impl PermissionSet {
    pub fn new(permissions: &[Permission], super_admin: bool) -> Self {
        let mut pages: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        // Duplicate page entries are unioned
        for permission in permissions {
            pages
                .entry(permission.page.clone())
                .or_default()
                .extend(permission.actions.iter().cloned());
        }
        Self { super_admin, pages }
    }

    pub fn from_user(user: &UserProfile) -> Self {
        Self::new(&user.permissions, user.is_super_admin)
    }

    /// Whether `action` is allowed on `page`. Super admins pass every check.
    pub fn can(&self, page: &str, action: &str) -> bool {
        self.super_admin
            || self
                .pages
                .get(page)
                .is_some_and(|actions| actions.contains(action))
    }

    pub fn can_do(&self, page: &str, action: Action) -> bool {
        self.can(page, action.as_str())
    }

    pub fn is_super_admin(&self) -> bool {
        self.super_admin
    }

    /// Pages with at least one granted action
    pub fn pages(&self) -> impl Iterator<Item = &str> {
        self.pages
            .iter()
            .filter(|(_, actions)| !actions.is_empty())
            .map(|(page, _)| page.as_str())
    }
}

/// Entry in the dashboard navigation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavItem {
    pub page: &'static str,
    pub label: &'static str,
    pub action: Action,
}

pub const NAVIGATION: &[NavItem] = &[
    NavItem {
        page: "dashboard",
        label: "Dashboard",
        action: Action::View,
    },
    NavItem {
        page: "users",
        label: "Users",
        action: Action::View,
    },
    NavItem {
        page: "audit-logs",
        label: "Audit Logs",
        action: Action::View,
    },
    NavItem {
        page: "security",
        label: "Security",
        action: Action::View,
    },
    NavItem {
        page: "notifications",
        label: "Notifications",
        action: Action::View,
    },
    NavItem {
        page: "settings",
        label: "Settings",
        action: Action::View,
    },
];

/// Navigation entries the user may see
pub fn visible_navigation(user: &UserProfile) -> Vec<&'static NavItem> {
    let set = PermissionSet::from_user(user);
    NAVIGATION
        .iter()
        .filter(|item| set.can_do(item.page, item.action))
        .collect()
}
