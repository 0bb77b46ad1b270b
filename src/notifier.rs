use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

use crate::types::TokenRecord;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ListingEvent {
    New,
    Update,
}

/// Push-notification seam. The transport behind it (websocket, queue, ...)
/// is not part of the core.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, event: ListingEvent, record: &TokenRecord);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingNotification {
    pub event: ListingEvent,
    pub record: TokenRecord,
}

/// Broadcast-channel notifier: subscribers receive every published delta
/// entry. Slow subscribers drop messages rather than blocking the cycle.
pub struct BroadcastNotifier {
    sender: broadcast::Sender<ListingNotification>,
}

impl BroadcastNotifier {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ListingNotification> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn publish(&self, event: ListingEvent, record: &TokenRecord) {
        let notification = ListingNotification {
            event,
            record: record.clone(),
        };
        if self.sender.send(notification).is_err() {
            // No subscribers attached; nothing to deliver.
            warn!("listing notification dropped: no active subscribers");
        }
    }
}
