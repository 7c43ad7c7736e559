//! Notification endpoints

use super::RequestSpec;
use super::typed::SafawiClient;
use crate::client::error::ClientError;
use safawinet_core::types::NotificationList;

/// Which notifications to list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NotificationFilter {
    #[default]
    All,
    Unread,
    Archived,
}

impl NotificationFilter {
    fn as_query(self) -> Option<&'static str> {
        match self {
            Self::All => None,
            Self::Unread => Some("unread"),
            Self::Archived => Some("archived"),
        }
    }
}

impl SafawiClient {
    pub async fn notifications(
        &self,
        filter: NotificationFilter,
        page: u32,
        limit: u32,
    ) -> Result<NotificationList, ClientError> {
        let mut query = vec![("page", page.max(1).to_string()), ("limit", limit.to_string())];
        if let Some(status) = filter.as_query() {
            query.push(("status", status.to_string()));
        }
        self.fetch(RequestSpec::get("/api/notifications").query(query))
            .await
    }

    pub async fn mark_notification_read(&self, id: &str) -> Result<(), ClientError> {
        self.send(RequestSpec::put(format!("/api/notifications/{id}/read")))
            .await
            .map(|_| ())
    }

    pub async fn mark_all_notifications_read(&self) -> Result<(), ClientError> {
        self.send(RequestSpec::put("/api/notifications/read-all"))
            .await
            .map(|_| ())
    }

    pub async fn dismiss_notification(&self, id: &str) -> Result<(), ClientError> {
        self.send(RequestSpec::put(format!("/api/notifications/{id}/dismiss")))
            .await
            .map(|_| ())
    }

    pub async fn archive_notification(&self, id: &str) -> Result<(), ClientError> {
        self.send(RequestSpec::put(format!("/api/notifications/{id}/archive")))
            .await
            .map(|_| ())
    }
}
