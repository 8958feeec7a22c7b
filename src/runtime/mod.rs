//! Runtime coordination on top of the inference layer.

pub mod fanout;

pub use fanout::{
    AgentRun, AgentStatus, FanOutOrchestrator, FanOutRequest, FanOutSession, FanOutSnapshot,
    SessionState, CANCELLED_MESSAGE, MAX_FANOUT_MEMBERS,
};
