//! EventBus (spec §4.12): named pub/sub channels plus per-subscriber
//! dedup against a bounded 10-minute LRU of seen event ids. Publisher and
//! subscriber each hold independent handles, mirroring the decoupled
//! publish/subscribe connections the spec calls for.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::ids::JobId;

pub const CHANNEL_AGGREGATION_DONE: &str = "aggregation:done";
pub const CHANNEL_FLOW2_START: &str = "flow2:start";
pub const CHANNEL_FLOW2_DONE: &str = "flow2:done";
pub const CHANNEL_JOB_COMPLETED: &str = "job:completed";
pub const CHANNEL_JOB_FAILED: &str = "job:failed";
pub const CHANNEL_COST_LIMIT: &str = "cost:limit";

const DEDUP_WINDOW: chrono::Duration = chrono::Duration::minutes(10);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusMessage {
    pub event_id: String,
    pub channel: String,
    pub job_id: JobId,
    pub payload: serde_json::Value,
}

impl BusMessage {
    pub fn new(channel: &str, job_id: JobId, payload: serde_json::Value) -> Self {
        let event_id = format!("{channel}:{job_id}:{}", Utc::now().timestamp_millis());
        Self {
            event_id,
            channel: channel.to_string(),
            job_id,
            payload,
        }
    }
}

/// Bounded dedup window: drop any event id seen in the last 10 minutes.
struct SeenIds {
    seen: VecDeque<(String, chrono::DateTime<Utc>)>,
}

impl SeenIds {
    fn new() -> Self {
        Self { seen: VecDeque::new() }
    }

    /// Returns `true` if this id is new (and records it); `false` if it's
    /// a duplicate within the dedup window.
    fn observe(&mut self, id: &str) -> bool {
        let now = Utc::now();
        while let Some((_, seen_at)) = self.seen.front() {
            if now.signed_duration_since(*seen_at) > DEDUP_WINDOW {
                self.seen.pop_front();
            } else {
                break;
            }
        }
        if self.seen.iter().any(|(seen_id, _)| seen_id == id) {
            return false;
        }
        self.seen.push_back((id.to_string(), now));
        true
    }
}

/// In-process event bus. A production deployment would back this with a
/// real pub/sub (Redis, NATS); this crate only depends on the channel
/// shape, so swapping backends means rewriting this one file.
pub struct EventBus {
    sender: broadcast::Sender<BusMessage>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self { sender }
    }

    pub fn publish(&self, message: BusMessage) -> Result<()> {
        // A send with no subscribers is not an error (spec §7: best-effort
        // side effects log and return, never fail the caller).
        let _ = self.sender.send(message);
        Ok(())
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
            seen: Mutex::new(SeenIds::new()),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct EventSubscriber {
    receiver: broadcast::Receiver<BusMessage>,
    seen: Mutex<SeenIds>,
}

impl EventSubscriber {
    /// Await the next message on any channel, skipping duplicates already
    /// seen within the dedup window and lagged messages.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(msg) => {
                    let is_new = self.seen.lock().unwrap().observe(&msg.event_id);
                    if is_new {
                        return Some(msg);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_subscribe_roundtrips() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        let job_id = JobId::new();
        bus.publish(BusMessage::new(
            CHANNEL_JOB_COMPLETED,
            job_id,
            serde_json::json!({"ok": true}),
        ))
        .unwrap();

        let msg = sub.recv().await.unwrap();
        assert_eq!(msg.channel, CHANNEL_JOB_COMPLETED);
        assert_eq!(msg.job_id, job_id);
    }

    #[test]
    fn dedup_drops_repeat_ids_within_window() {
        let mut seen = SeenIds::new();
        assert!(seen.observe("a"));
        assert!(!seen.observe("a"));
        assert!(seen.observe("b"));
    }
}
