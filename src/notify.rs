//! Fire-and-forget notifications
//!
//! Workflow code hands messages to a [`Notifier`] and moves on. The queue
//! implementation pushes onto a bounded channel; a dispatcher task drains it
//! through a [`NotificationTransport`]. Delivery failures are logged and
//! dropped, never reported back to the transition that caused them.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Phone number or email
    pub recipient: String,
    pub message: String,
    pub queued_at: DateTime<Utc>,
}

pub trait Notifier: Send + Sync {
    /// Must not block and must not fail the caller
    fn send(&self, recipient: &str, message: &str);
}

/// Outbound delivery (SMS gateway, mailer, ...)
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

/// Transport that only writes the notification to the log
#[derive(Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl NotificationTransport for LogTransport {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        info!(
            recipient = %mask_recipient(&notification.recipient),
            message = %notification.message,
            "Notification delivered to log transport"
        );
        Ok(())
    }
}

/// Producer half handed to the engines
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    sender: mpsc::Sender<Notification>,
}

impl NotificationQueue {
    /// Create the queue and spawn its dispatcher on the current runtime
    pub fn spawn(
        capacity: usize,
        transport: Arc<dyn NotificationTransport>,
    ) -> (Self, JoinHandle<usize>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_dispatcher(receiver, transport));
        (Self { sender }, handle)
    }
}

impl Notifier for NotificationQueue {
    fn send(&self, recipient: &str, message: &str) {
        let notification = Notification {
            recipient: recipient.to_string(),
            message: message.to_string(),
            queued_at: Utc::now(),
        };
        if let Err(e) = self.sender.try_send(notification) {
            warn!(
                recipient = %mask_recipient(recipient),
                error = %e,
                "Dropping notification, queue unavailable"
            );
        }
    }
}

/// Drain the channel until every sender is dropped. Returns the number of
/// notifications delivered successfully.
async fn run_dispatcher(
    mut receiver: mpsc::Receiver<Notification>,
    transport: Arc<dyn NotificationTransport>,
) -> usize {
    let mut delivered = 0;
    while let Some(notification) = receiver.recv().await {
        match transport.deliver(&notification).await {
            Ok(()) => {
                delivered += 1;
                debug!(recipient = %mask_recipient(&notification.recipient), "Notification sent");
            }
            Err(e) => {
                warn!(
                    recipient = %mask_recipient(&notification.recipient),
                    error = %e,
                    "Notification delivery failed"
                );
            }
        }
    }
    info!(delivered, "Notification dispatcher stopped");
    delivered
}

/// Keep only the edges of a phone number or email for logs
pub fn mask_recipient(recipient: &str) -> String {
    let chars: Vec<char> = recipient.chars().collect();
    if chars.len() <= 6 {
        return "***".to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}***{}", head, tail)
}

/// In-memory notifier that keeps everything it was asked to send
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, recipient: &str, message: &str) {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((recipient.to_string(), message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingTransport;

    #[async_trait]
    impl NotificationTransport for FailingTransport {
        async fn deliver(&self, _notification: &Notification) -> Result<()> {
            Err(anyhow::anyhow!("gateway unreachable"))
        }
    }

    #[test]
    fn test_mask_recipient() {
        assert_eq!(mask_recipient("+254700000001"), "+25***01");
        assert_eq!(mask_recipient("a@b.c"), "***");
    }

    #[tokio::test]
    async fn test_dispatcher_delivers_queued_messages() {
        let (queue, handle) = NotificationQueue::spawn(8, Arc::new(LogTransport));
        queue.send("+254700000001", "approved");
        queue.send("farmer@example.com", "rejected");
        drop(queue);

        assert_eq!(handle.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delivery_failures_are_swallowed() {
        let (queue, handle) = NotificationQueue::spawn(8, Arc::new(FailingTransport));
        queue.send("+254700000001", "approved");
        drop(queue);

        assert_eq!(handle.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (sender, mut receiver) = mpsc::channel(1);
        let queue = NotificationQueue { sender };
        queue.send("+254700000001", "first");
        queue.send("+254700000001", "second");
        drop(queue);

        let mut queued = Vec::new();
        while let Some(notification) = receiver.recv().await {
            queued.push(notification.message);
        }
        assert_eq!(queued, vec!["first".to_string()]);
    }
}
