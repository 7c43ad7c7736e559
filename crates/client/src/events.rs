//! Typed event subscriptions

use tokio::sync::broadcast;
use tracing::warn;

/// Receiving end of an event stream.
///
/// Dropping the subscription (or calling [`Subscription::unsubscribe`])
/// detaches it from the publisher.
#[derive(Debug)]
pub struct Subscription<T> {
    receiver: broadcast::Receiver<T>,
}

impl<T: Clone> Subscription<T> {
    pub(crate) fn new(receiver: broadcast::Receiver<T>) -> Self {
        Self { receiver }
    }

    /// Next event, or `None` once the publisher is gone. Events missed by a
    /// slow subscriber are skipped.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unsubscribe_detaches_receiver() {
        let (tx, _) = broadcast::channel::<u32>(4);
        let sub = Subscription::new(tx.subscribe());
        assert_eq!(tx.receiver_count(), 1);
        sub.unsubscribe();
        assert_eq!(tx.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_recv_skips_lagged_events() {
        let (tx, _) = broadcast::channel::<u32>(2);
        let mut sub = Subscription::new(tx.subscribe());
        for i in 0..5 {
            tx.send(i).unwrap();
        }
        assert_eq!(sub.recv().await, Some(3));
        assert_eq!(sub.try_recv(), Some(4));
        assert_eq!(sub.try_recv(), None);
        drop(tx);
        assert_eq!(sub.recv().await, None);
    }
}
