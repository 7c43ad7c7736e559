//! Audit log filters and client-side formatting

use crate::types::{AuditLogEntry, Severity};
use chrono::{DateTime, Utc};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Filters for the audit log listing. Unset filters are left out of the
/// query string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditLogQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub action: Option<String>,
    pub user_id: Option<String>,
    pub severity: Option<Severity>,
    pub status: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

impl AuditLogQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page.max(1));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit.clamp(1, MAX_PAGE_SIZE));
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    /// Query-string pairs in the server's parameter names
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("page", self.page.unwrap_or(1).to_string()),
            ("limit", self.limit.unwrap_or(DEFAULT_PAGE_SIZE).to_string()),
        ];
        let text = [
            ("action", &self.action),
            ("userId", &self.user_id),
            ("status", &self.status),
            ("search", &self.search),
        ];
        for (key, value) in text {
            if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                pairs.push((key, value.to_string()));
            }
        }
        if let Some(severity) = self.severity {
            pairs.push(("severity", severity.to_string()));
        }
        if let Some(start) = self.start_date {
            pairs.push(("startDate", start.to_rfc3339()));
        }
        if let Some(end) = self.end_date {
            pairs.push(("endDate", end.to_rfc3339()));
        }
        pairs
    }
}

impl AuditLogEntry {
    /// `action` with underscores turned into words, first letter capitalised
    pub fn action_label(&self) -> String {
        let words = self.action.replace(['_', '-'], " ").to_lowercase();
        let mut chars = words.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    /// One-line rendering used in listings
    pub fn summary(&self) -> String {
        let who = self
            .username
            .as_deref()
            .or(self.user_id.as_deref())
            .unwrap_or("system");
        let mut line = format!(
            "{} [{}] {} by {}",
            self.created_at.format("%Y-%m-%d %H:%M:%S"),
            self.severity,
            self.action_label(),
            who
        );
        if let Some(resource) = &self.resource {
            line.push_str(&format!(" on {resource}"));
        }
        if let Some(ip) = &self.ip_address {
            line.push_str(&format!(" from {ip}"));
        }
        if self.status != "success" {
            line.push_str(&format!(" ({})", self.status));
        }
        line
    }
}

const CSV_HEADER: &[&str] = &[
    "Timestamp",
    "User",
    "Action",
    "Resource",
    "Severity",
    "Status",
    "IP Address",
    "User Agent",
    "Details",
];

/// Render entries as CSV (RFC 4180 quoting, CRLF line endings)
pub fn export_csv(entries: &[AuditLogEntry]) -> String {
    let mut out = String::new();
    write_row(&mut out, CSV_HEADER.iter().copied());
    for entry in entries {
        let details = entry
            .details
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        let timestamp = entry.created_at.to_rfc3339();
        let severity = entry.severity.to_string();
        let user = entry
            .username
            .as_deref()
            .or(entry.user_id.as_deref())
            .unwrap_or("");
        write_row(
            &mut out,
            [
                timestamp.as_str(),
                user,
                entry.action.as_str(),
                entry.resource.as_deref().unwrap_or(""),
                severity.as_str(),
                entry.status.as_str(),
                entry.ip_address.as_deref().unwrap_or(""),
                entry.user_agent.as_deref().unwrap_or(""),
                details.as_str(),
            ],
        );
    }
    out
}

fn write_row<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push_str("\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn entry() -> AuditLogEntry {
        AuditLogEntry {
            id: "a1".into(),
            user_id: Some("u1".into()),
            username: Some("admin".into()),
            action: "LOGIN_FAILED".into(),
            resource: Some("auth".into()),
            details: Some(json!({ "reason": "bad password, locked" })),
            ip_address: Some("10.0.0.5".into()),
            user_agent: None,
            severity: Severity::High,
            status: "failure".into(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 2, 8, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_query_omits_empty_filters() {
        let query = AuditLogQuery::new().search("  ").action("login");
        let pairs = query.to_query();
        assert_eq!(
            pairs,
            vec![
                ("page", "1".to_string()),
                ("limit", "20".to_string()),
                ("action", "login".to_string()),
            ]
        );
    }

    #[test]
    fn test_query_clamps_and_formats() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        let pairs = AuditLogQuery::new()
            .page(0)
            .limit(500)
            .severity(Severity::Critical)
            .between(start, end)
            .to_query();
        assert!(pairs.contains(&("page", "1".to_string())));
        assert!(pairs.contains(&("limit", "100".to_string())));
        assert!(pairs.contains(&("severity", "critical".to_string())));
        assert!(pairs.contains(&("startDate", "2024-01-01T00:00:00+00:00".to_string())));
    }

    #[test]
    fn test_summary() {
        assert_eq!(
            entry().summary(),
            "2024-05-02 08:30:00 [high] Login failed by admin on auth from 10.0.0.5 (failure)"
        );
    }

    #[test]
    fn test_export_csv_quotes_fields() {
        let csv = export_csv(&[entry()]);
        let mut lines = csv.split("\r\n");
        assert!(lines.next().unwrap().starts_with("Timestamp,User,Action"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("2024-05-02T08:30:00+00:00,admin,LOGIN_FAILED,auth,high,failure"));
        assert!(row.ends_with(r#""{""reason"":""bad password, locked""}""#));
    }
}
