//! Per-group broadcast channels used to tell connected clients that a group
//! or its bills changed. Messages carry no data; receivers refetch.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::schemas::GroupId;

const CHANNEL_CAPACITY: usize = 64;
const BROADCAST: &str = "broadcast";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RealtimeEvent {
    GroupUpdated,
    BillUpdated,
}

impl fmt::Display for RealtimeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RealtimeEvent::GroupUpdated => write!(f, "GROUP_UPDATED"),
            RealtimeEvent::BillUpdated => write!(f, "BILL_UPDATED"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct BroadcastMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub event: RealtimeEvent,
    pub payload: serde_json::Value,
}

impl BroadcastMessage {
    pub fn new(event: RealtimeEvent) -> Self {
        BroadcastMessage {
            kind: BROADCAST.to_string(),
            event,
            payload: serde_json::json!({}),
        }
    }
}

#[derive(Default)]
pub struct RealtimeHub {
    channels: Mutex<HashMap<GroupId, broadcast::Sender<BroadcastMessage>>>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// The group's channel, opened on first use. Meant for sending right
    /// away; subscribe through [`RealtimeHub::subscribe`].
    pub fn channel(&self, group_id: &str) -> RealtimeChannel {
        let sender = self.with_sender(group_id, Clone::clone);
        RealtimeChannel {
            group_id: group_id.to_string(),
            sender,
        }
    }

    /// Dropping the subscription unsubscribes.
    pub fn subscribe(&self, group_id: &str) -> Subscription {
        let receiver = self.with_sender(group_id, broadcast::Sender::subscribe);
        Subscription {
            group_id: group_id.to_string(),
            receiver,
        }
    }

    /// Runs `f` on the group's sender with the map locked. Channels nobody
    /// listens to any more are dropped on the way, so receivers must be
    /// created under the same lock.
    fn with_sender<T>(
        &self,
        group_id: &str,
        f: impl FnOnce(&broadcast::Sender<BroadcastMessage>) -> T,
    ) -> T {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels.retain(|id, sender| id == group_id || sender.receiver_count() > 0);
        let sender = channels
            .entry(group_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        f(sender)
    }

    pub fn open_channels(&self) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[derive(Clone)]
pub struct RealtimeChannel {
    group_id: GroupId,
    sender: broadcast::Sender<BroadcastMessage>,
}

impl RealtimeChannel {
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Returns how many subscribers the message reached.
    pub fn send(&self, event: RealtimeEvent) -> usize {
        let delivered = self.sender.send(BroadcastMessage::new(event)).unwrap_or(0);
        debug!(group_id = %self.group_id, %event, delivered, "Broadcast sent");
        delivered
    }

    pub fn group_updated(&self) -> usize {
        self.send(RealtimeEvent::GroupUpdated)
    }

    pub fn bill_updated(&self) -> usize {
        self.send(RealtimeEvent::BillUpdated)
    }
}

pub struct Subscription {
    group_id: GroupId,
    receiver: broadcast::Receiver<BroadcastMessage>,
}

impl Subscription {
    /// The next message, or `None` once the channel is gone. Messages lost
    /// to a slow receiver are skipped; the next one still means "refetch".
    pub async fn recv(&mut self) -> Option<BroadcastMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(group_id = %self.group_id, skipped, "Realtime subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Waits for the next message carrying `event`.
    pub async fn recv_event(&mut self, event: RealtimeEvent) -> Option<BroadcastMessage> {
        loop {
            let message = self.recv().await?;
            if message.event == event {
                return Some(message);
            }
        }
    }
}
