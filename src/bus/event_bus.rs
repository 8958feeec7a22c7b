use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::event_types::{CATEGORY_AGENT, CATEGORY_FANOUT};

const BUS_CAPACITY: usize = 1024;

/// Which fan-out member an event is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRef {
    pub index: usize,
    pub service_name: String,
    pub model: String,
}

/// One progress notification from a fan-out session. Session-wide events carry no
/// `member`; per-member events always do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    pub id: String,
    pub session_id: String,
    pub seq: i64,
    pub category: String,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<MemberRef>,
    pub payload: serde_json::Value,
    pub created_at: String,
}

impl BusEvent {
    pub fn is_for_session(&self, session_id: &str) -> bool {
        self.session_id == session_id
    }
}

/// Broadcast channel for fan-out progress. Any number of observers may subscribe;
/// slow ones lag and skip rather than block the session.
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
    seq: AtomicI64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            tx,
            seq: AtomicI64::new(0),
        }
    }

    /// Session-wide lifecycle event (`fanout.*`).
    pub fn emit_session(
        &self,
        session_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> BusEvent {
        self.publish(CATEGORY_FANOUT, session_id, event_type, None, payload)
    }

    /// Event about one member of a session (`agent.*`).
    pub fn emit_member(
        &self,
        session_id: &str,
        member: MemberRef,
        event_type: &str,
        payload: serde_json::Value,
    ) -> BusEvent {
        self.publish(CATEGORY_AGENT, session_id, event_type, Some(member), payload)
    }

    fn publish(
        &self,
        category: &str,
        session_id: &str,
        event_type: &str,
        member: Option<MemberRef>,
        payload: serde_json::Value,
    ) -> BusEvent {
        let event = BusEvent {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            category: category.to_string(),
            event_type: event_type.to_string(),
            member,
            payload,
            created_at: Utc::now().to_rfc3339(),
        };
        if self.tx.send(event.clone()).is_err() {
            tracing::trace!("event bus has no receivers");
        }
        event
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }

    /// Receiver that only yields events for one session.
    pub fn subscribe_session(&self, session_id: impl Into<String>) -> SessionEvents {
        SessionEvents {
            session_id: session_id.into(),
            rx: self.tx.subscribe(),
        }
    }
}

pub struct SessionEvents {
    session_id: String,
    rx: broadcast::Receiver<BusEvent>,
}

impl SessionEvents {
    /// Next event for this session. `None` once the bus is gone. Lagging skips ahead.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.is_for_session(&self.session_id) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "session {} observer lagged, skipped {skipped} events",
                        self.session_id
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::event_types::{
        EVENT_AGENT_MESSAGE_DELTA, EVENT_FANOUT_COMPLETED, EVENT_FANOUT_STARTED,
    };

    fn member(index: usize) -> MemberRef {
        MemberRef {
            index,
            service_name: "GPT".to_string(),
            model: "gpt-4o".to_string(),
        }
    }

    #[tokio::test]
    async fn subscribers_see_events_in_sequence() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit_session("s1", EVENT_FANOUT_STARTED, serde_json::json!({}));
        bus.emit_member("s1", member(0), EVENT_AGENT_MESSAGE_DELTA, serde_json::json!({"text": "hi"}));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.category, CATEGORY_FANOUT);
        assert_eq!(first.member, None);
        assert_eq!(second.category, CATEGORY_AGENT);
        assert_eq!(second.member, Some(member(0)));
        assert_eq!(second.seq, first.seq + 1);
        assert_eq!(second.payload["text"], "hi");
    }

    #[tokio::test]
    async fn session_receiver_skips_other_sessions() {
        let bus = EventBus::new();
        let mut events = bus.subscribe_session("mine");

        bus.emit_session("other", EVENT_FANOUT_STARTED, serde_json::Value::Null);
        bus.emit_member("mine", member(2), EVENT_AGENT_MESSAGE_DELTA, serde_json::Value::Null);
        bus.emit_session("mine", EVENT_FANOUT_COMPLETED, serde_json::Value::Null);

        let first = events.recv().await.unwrap();
        assert_eq!(first.member.map(|member| member.index), Some(2));
        assert_eq!(events.recv().await.unwrap().event_type, EVENT_FANOUT_COMPLETED);

        drop(bus);
        assert!(events.recv().await.is_none());
    }

    #[test]
    fn emitting_without_subscribers_is_fine() {
        let bus = EventBus::new();
        let event = bus.emit_session("s1", EVENT_FANOUT_COMPLETED, serde_json::Value::Null);
        assert_eq!(event.seq, 0);
    }
}
