//! Delivery-layer boundary: per-message subscriptions and notification marshaling.
//!
//! The delivery layer runs in its own execution context and publishes
//! notifications through a [`DeliveryHub`]. Only messages with a live
//! [`Subscription`] get their notifications forwarded; everything else is
//! dropped at the hub. Forwarded notifications travel over a channel and are
//! applied on the timeline's owning thread by draining the [`NotificationPump`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::{Address, MessageId, MessageState};

/// Notification emitted by the delivery layer for a single message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeliveryNotification {
    StateChanged {
        message_id: MessageId,
        state: MessageState,
    },
    FileTransferProgress {
        message_id: MessageId,
        offset: u64,
        total: u64,
    },
    ParticipantImdnStateChanged {
        message_id: MessageId,
        participant: Address,
        state: MessageState,
        timestamp: DateTime<Utc>,
    },
}

impl DeliveryNotification {
    pub fn message_id(&self) -> MessageId {
        match self {
            DeliveryNotification::StateChanged { message_id, .. }
            | DeliveryNotification::FileTransferProgress { message_id, .. }
            | DeliveryNotification::ParticipantImdnStateChanged { message_id, .. } => *message_id,
        }
    }
}

struct HubInner {
    // message id -> id of the subscription currently bound to it
    listeners: Mutex<HashMap<MessageId, Uuid>>,
    tx: mpsc::UnboundedSender<DeliveryNotification>,
}

impl HubInner {
    fn listeners(&self) -> MutexGuard<'_, HashMap<MessageId, Uuid>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Subscription registry shared with the delivery layer. Cheap to clone, usable from any thread.
#[derive(Clone)]
pub struct DeliveryHub {
    inner: Arc<HubInner>,
}

impl DeliveryHub {
    /// Create a hub and the pump that receives its forwarded notifications
    pub fn new() -> (Self, NotificationPump) {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = DeliveryHub {
            inner: Arc::new(HubInner {
                listeners: Mutex::new(HashMap::new()),
                tx,
            }),
        };
        (hub, NotificationPump { rx })
    }

    /// Bind a new subscription to `message_id`. A previous binding for the same
    /// message stops receiving anything, and releasing it later is a no-op.
    pub fn subscribe(&self, message_id: MessageId) -> Subscription {
        let id = Uuid::new_v4();
        if self.inner.listeners().insert(message_id, id).is_some() {
            debug!("Replacing existing subscription for message {}", message_id);
        }
        Subscription {
            id,
            message_id,
            hub: Arc::downgrade(&self.inner),
        }
    }

    pub fn is_subscribed(&self, message_id: MessageId) -> bool {
        self.inner.listeners().contains_key(&message_id)
    }

    pub fn active_subscriptions(&self) -> usize {
        self.inner.listeners().len()
    }

    /// Forward a notification to the owning thread. Returns false when it was dropped.
    pub fn publish(&self, notification: DeliveryNotification) -> bool {
        let message_id = notification.message_id();
        if !self.is_subscribed(message_id) {
            debug!("No listener for message {}, dropping {:?}", message_id, notification);
            return false;
        }
        match self.inner.tx.send(notification) {
            Ok(()) => true,
            Err(e) => {
                warn!("Notification pump closed, dropping notification: {:?}", e.0);
                false
            }
        }
    }
}

/// Live binding between a message and the hub. Released exactly once:
/// explicitly through [`Subscription::release`] or implicitly on drop.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    message_id: MessageId,
    hub: Weak<HubInner>,
}

impl Subscription {
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn release(self) {
        // Drop does the work
    }

    fn unbind(&self) {
        let Some(hub) = self.hub.upgrade() else {
            return;
        };
        let mut listeners = hub.listeners();
        // Only remove our own binding; the message may have been rebound since
        if listeners.get(&self.message_id) == Some(&self.id) {
            listeners.remove(&self.message_id);
            debug!("Released subscription for message {}", self.message_id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unbind();
    }
}

impl std::fmt::Debug for HubInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubInner").finish_non_exhaustive()
    }
}

/// Receiving end of the hub, drained on the timeline's owning thread
pub struct NotificationPump {
    rx: mpsc::UnboundedReceiver<DeliveryNotification>,
}

impl NotificationPump {
    /// Everything forwarded so far, without waiting
    pub fn drain(&mut self) -> Vec<DeliveryNotification> {
        let mut pending = Vec::new();
        while let Ok(notification) = self.rx.try_recv() {
            pending.push(notification);
        }
        pending
    }

    /// Wait for the next notification
    pub async fn recv(&mut self) -> Option<DeliveryNotification> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_changed(message_id: MessageId) -> DeliveryNotification {
        DeliveryNotification::StateChanged {
            message_id,
            state: MessageState::Delivered,
        }
    }

    #[test]
    fn test_publish_requires_subscription() {
        let (hub, mut pump) = DeliveryHub::new();
        let message_id = MessageId::new();

        assert!(!hub.publish(state_changed(message_id)));
        assert!(pump.drain().is_empty());

        let subscription = hub.subscribe(message_id);
        assert!(hub.publish(state_changed(message_id)));
        assert_eq!(pump.drain(), vec![state_changed(message_id)]);

        subscription.release();
        assert!(!hub.is_subscribed(message_id));
        assert!(!hub.publish(state_changed(message_id)));
    }

    #[test]
    fn test_stale_handle_does_not_unbind_newer_subscription() {
        let (hub, _pump) = DeliveryHub::new();
        let message_id = MessageId::new();

        let first = hub.subscribe(message_id);
        let second = hub.subscribe(message_id);
        assert_eq!(hub.active_subscriptions(), 1);

        drop(first);
        assert!(hub.is_subscribed(message_id));

        drop(second);
        assert_eq!(hub.active_subscriptions(), 0);
    }

    #[test]
    fn test_subscription_outliving_hub() {
        let (hub, pump) = DeliveryHub::new();
        let subscription = hub.subscribe(MessageId::new());
        drop(hub);
        drop(pump);
        // Hub gone, release must be a silent no-op
        subscription.release();
    }

    #[test]
    fn test_publish_from_other_thread() {
        let (hub, mut pump) = DeliveryHub::new();
        let message_id = MessageId::new();
        let _subscription = hub.subscribe(message_id);

        let remote = hub.clone();
        std::thread::spawn(move || {
            for offset in [10, 20, 30] {
                remote.publish(DeliveryNotification::FileTransferProgress {
                    message_id,
                    offset,
                    total: 30,
                });
            }
        })
        .join()
        .unwrap();

        let received = pump.drain();
        assert_eq!(received.len(), 3);
        assert!(received.iter().all(|n| n.message_id() == message_id));
    }

    #[test]
    fn test_notification_json_shape() {
        let message_id = MessageId::new();
        let json = serde_json::to_value(state_changed(message_id)).unwrap();
        assert_eq!(json["type"], "state_changed");
        assert_eq!(json["state"], "delivered");
        assert_eq!(json["message_id"], message_id.to_string());
    }
}
