//! Notification hub — fans state-transition events out to subscribers.

use std::sync::Arc;

use tokio::sync::broadcast;

use super::events::{Event, Notification, Recipient};

/// Broadcasts addressed notifications to all subscribers. The transport
/// glue (one subscriber per socket server) filters by recipient; this side
/// only decides *who* an event is for.
#[derive(Clone)]
pub struct NotificationHub {
    sender: Arc<broadcast::Sender<Notification>>,
}

impl NotificationHub {
    /// Creates a new hub with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Creates a new subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Publishes a notification to all subscribers.
    pub fn send(&self, notification: Notification) {
        // Ignore errors - no active receivers is fine
        let _ = self.sender.send(notification);
    }

    /// Addresses an event to one student.
    pub fn to_student(&self, student_id: &str, event: Event) {
        self.send(Notification {
            recipient: Recipient::Student(student_id.to_string()),
            event,
        });
    }

    /// Addresses an event to one teacher.
    pub fn to_teacher(&self, teacher_id: &str, event: Event) {
        self.send(Notification {
            recipient: Recipient::Teacher(teacher_id.to_string()),
            event,
        });
    }

    /// Addresses an event to every connected teacher.
    pub fn to_teachers(&self, event: Event) {
        self.send(Notification {
            recipient: Recipient::Teachers,
            event,
        });
    }

    /// Addresses an event to everyone.
    pub fn broadcast(&self, event: Event) {
        self.send(Notification {
            recipient: Recipient::Broadcast,
            event,
        });
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(100)
    }
}
