//! Progress events for fan-out sessions.
//!
//! Snapshots of member state travel over the session's watch channel; the bus
//! carries the discrete lifecycle events (member started, delta, completed, failed,
//! cancelled, session truncated) for any number of listeners such as loggers.

mod event_bus;
pub mod event_types;

pub use event_bus::{BusEvent, EventBus, MemberRef, SessionEvents};
