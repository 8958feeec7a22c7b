//! Event category and type constants.

use super::event_bus::BusEvent;

pub const CATEGORY_FANOUT: &str = "fanout";
pub const CATEGORY_AGENT: &str = "agent";

pub const EVENT_FANOUT_STARTED: &str = "fanout.started";
pub const EVENT_FANOUT_TRUNCATED: &str = "fanout.truncated";
pub const EVENT_FANOUT_COMPLETED: &str = "fanout.completed";
pub const EVENT_FANOUT_CANCELLED: &str = "fanout.cancelled";

pub const EVENT_AGENT_MESSAGE_STREAM_STARTED: &str = "agent.message_stream_started";
pub const EVENT_AGENT_MESSAGE_DELTA: &str = "agent.message_delta";
pub const EVENT_AGENT_MESSAGE_STREAM_COMPLETED: &str = "agent.message_stream_completed";
pub const EVENT_AGENT_MESSAGE_STREAM_FAILED: &str = "agent.message_stream_failed";
pub const EVENT_AGENT_MESSAGE_STREAM_CANCELLED: &str = "agent.message_stream_cancelled";

/// Everything except per-fragment deltas. Listeners that only log lifecycle use this.
pub fn is_lifecycle_event(event: &BusEvent) -> bool {
    event.event_type != EVENT_AGENT_MESSAGE_DELTA
}
