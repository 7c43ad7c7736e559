//! Notification bell state
//!
//! The client never invents notifications. It keeps the server's list,
//! applies pushed additions and flag changes, and mutates the read,
//! dismissed and archived flags through the API.

use crate::client::SafawiClient;
use crate::client::error::ClientError;
use crate::client::notifications::NotificationFilter;
use crate::events::Subscription;
use safawinet_core::types::{Notification, NotificationUpdate};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::debug;

/// Notifications kept locally until a load sets the page size
pub const DEFAULT_CAPACITY: usize = 50;

/// Changes observable by notification subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    Received(Notification),
    Updated(NotificationUpdate),
    /// The whole list was reloaded from the server
    Synced { unread: u64 },
}

struct CenterInner {
    client: SafawiClient,
    items: Mutex<Vec<Notification>>,
    /// Oldest entries beyond this are dropped on push
    capacity: AtomicUsize,
    events: broadcast::Sender<NotificationEvent>,
}

#[derive(Clone)]
pub struct NotificationCenter {
    inner: Arc<CenterInner>,
}

impl NotificationCenter {
    pub fn new(client: SafawiClient) -> Self {
        Self::with_capacity(client, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(client: SafawiClient, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(CenterInner {
                client,
                items: Mutex::new(Vec::new()),
                capacity: AtomicUsize::new(capacity.max(1)),
                events,
            }),
        }
    }

    fn items(&self) -> MutexGuard<'_, Vec<Notification>> {
        // The list is plain data; a panic mid-update cannot leave it torn
        self.inner
            .items
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Reload the first page from the server. The page size becomes the
    /// local capacity.
    pub async fn load(&self, limit: u32) -> Result<u64, ClientError> {
        let list = self
            .inner
            .client
            .notifications(NotificationFilter::All, 1, limit)
            .await?;
        self.inner
            .capacity
            .store((limit as usize).max(1), Ordering::Relaxed);
        *self.items() = list.notifications;
        let unread = self.unread_count();
        self.emit(NotificationEvent::Synced { unread });
        Ok(unread)
    }

    /// Add a pushed notification; duplicates replace the older copy
    pub fn push(&self, notification: Notification) {
        {
            let mut items = self.items();
            items.retain(|n| n.id != notification.id);
            items.insert(0, notification.clone());
            items.truncate(self.inner.capacity.load(Ordering::Relaxed));
        }
        debug!(id = %notification.id, "Notification received");
        self.emit(NotificationEvent::Received(notification));
    }

    /// Apply a flag change. Returns false for unknown ids.
    pub fn apply(&self, update: &NotificationUpdate) -> bool {
        let found = {
            let mut items = self.items();
            match items.iter_mut().find(|n| n.id == update.id) {
                Some(item) => {
                    item.apply(update);
                    true
                }
                None => false,
            }
        };
        if found {
            self.emit(NotificationEvent::Updated(update.clone()));
        }
        found
    }

    pub async fn mark_read(&self, id: &str) -> Result<(), ClientError> {
        self.inner.client.mark_notification_read(id).await?;
        self.apply(&NotificationUpdate {
            id: id.to_string(),
            is_read: Some(true),
            ..Default::default()
        });
        Ok(())
    }

    pub async fn mark_all_read(&self) -> Result<(), ClientError> {
        self.inner.client.mark_all_notifications_read().await?;
        let unread: Vec<String> = self
            .items()
            .iter()
            .filter(|n| !n.is_read)
            .map(|n| n.id.clone())
            .collect();
        for id in unread {
            self.apply(&NotificationUpdate {
                id,
                is_read: Some(true),
                ..Default::default()
            });
        }
        Ok(())
    }

    pub async fn dismiss(&self, id: &str) -> Result<(), ClientError> {
        self.inner.client.dismiss_notification(id).await?;
        self.apply(&NotificationUpdate {
            id: id.to_string(),
            is_dismissed: Some(true),
            ..Default::default()
        });
        Ok(())
    }

    pub async fn archive(&self, id: &str) -> Result<(), ClientError> {
        self.inner.client.archive_notification(id).await?;
        self.apply(&NotificationUpdate {
            id: id.to_string(),
            is_archived: Some(true),
            ..Default::default()
        });
        Ok(())
    }

    /// Notifications shown in the bell, newest first
    pub fn visible(&self) -> Vec<Notification> {
        self.items()
            .iter()
            .filter(|n| n.is_visible())
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<Notification> {
        self.items().clone()
    }

    pub fn unread_count(&self) -> u64 {
        self.items()
            .iter()
            .filter(|n| n.is_visible() && !n.is_read)
            .count() as u64
    }

    pub fn subscribe(&self) -> Subscription<NotificationEvent> {
        Subscription::new(self.inner.events.subscribe())
    }

    fn emit(&self, event: NotificationEvent) {
        let _ = self.inner.events.send(event);
    }
}
