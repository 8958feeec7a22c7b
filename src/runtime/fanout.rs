//! Concurrent fan-out of one user turn to several providers.
//!
//! A session dispatches every member at once, each member streaming into its own
//! [`AgentRun`] slot. Observers read whole-session snapshots from a watch channel;
//! every write happens under the channel's lock, so a reader never sees a member
//! half-updated.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::bus::event_types::{
    EVENT_AGENT_MESSAGE_DELTA,
    EVENT_AGENT_MESSAGE_STREAM_CANCELLED, EVENT_AGENT_MESSAGE_STREAM_COMPLETED,
    EVENT_AGENT_MESSAGE_STREAM_FAILED, EVENT_AGENT_MESSAGE_STREAM_STARTED,
    EVENT_FANOUT_CANCELLED, EVENT_FANOUT_COMPLETED, EVENT_FANOUT_STARTED, EVENT_FANOUT_TRUNCATED,
};
use crate::bus::{EventBus, MemberRef};
use crate::config::ServiceConfig;
use crate::model::{
    adapter_for_service, ChatMessage, ChatStream, GenerationSettings, RequestEngine, StreamEvent,
};

pub const MAX_FANOUT_MEMBERS: usize = 3;

/// Error text recorded on members stopped by a session cancel.
pub const CANCELLED_MESSAGE: &str = "Request cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Pending,
    Streaming,
    Complete,
    Failed,
    Cancelled,
}

impl AgentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Streaming => "streaming",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Progress of one fan-out member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRun {
    pub service_name: String,
    pub service_type: String,
    pub model: String,
    pub text: String,
    pub status: AgentStatus,
    pub is_complete: bool,
    pub error: Option<String>,
    pub updated_at: String,
}

impl AgentRun {
    fn pending(service: &ServiceConfig) -> Self {
        Self {
            service_name: service.name.clone(),
            service_type: service.provider.clone(),
            model: service.model.clone(),
            text: String::new(),
            status: AgentStatus::Pending,
            is_complete: false,
            error: None,
            updated_at: Utc::now().to_rfc3339(),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now().to_rfc3339();
    }

    /// Moves a non-terminal member into `status`. Terminal members never move again.
    fn settle(&mut self, status: AgentStatus, error: Option<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.is_complete = status.is_terminal();
        self.error = error;
        self.touch();
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Dispatching,
    Complete,
    Cancelled,
}

/// Consistent view of a whole session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanOutSnapshot {
    pub session_id: String,
    pub state: SessionState,
    pub members: Vec<AgentRun>,
    /// Selected services dropped because the session was full.
    pub truncated: usize,
}

impl FanOutSnapshot {
    pub fn all_terminal(&self) -> bool {
        self.members.iter().all(|member| member.status.is_terminal())
    }
}

/// One logical user turn sent to several services.
#[derive(Debug, Clone)]
pub struct FanOutRequest {
    pub services: Vec<ServiceConfig>,
    pub messages: Vec<ChatMessage>,
    pub settings: GenerationSettings,
}

impl FanOutRequest {
    pub fn new(services: Vec<ServiceConfig>, messages: Vec<ChatMessage>) -> Self {
        Self {
            services,
            messages,
            settings: GenerationSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// State shared between the session handle and its member tasks.
struct SessionShared {
    id: String,
    snapshot: watch::Sender<FanOutSnapshot>,
    bus: Option<Arc<EventBus>>,
}

impl SessionShared {
    fn emit(&self, event_type: &str, payload: serde_json::Value) {
        if let Some(bus) = &self.bus {
            bus.emit_session(&self.id, event_type, payload);
        }
    }

    fn emit_member(&self, index: usize, event_type: &str, payload: serde_json::Value) {
        let Some(bus) = &self.bus else {
            return;
        };
        let member = self
            .snapshot
            .borrow()
            .members
            .get(index)
            .map(|member| MemberRef {
                index,
                service_name: member.service_name.clone(),
                model: member.model.clone(),
            });
        if let Some(member) = member {
            bus.emit_member(&self.id, member, event_type, payload);
        }
    }

    fn append_text(&self, index: usize, fragment: &str) {
        self.snapshot.send_if_modified(|snapshot| {
            let Some(member) = snapshot.members.get_mut(index) else {
                return false;
            };
            if member.status.is_terminal() {
                return false;
            }
            member.status = AgentStatus::Streaming;
            member.text.push_str(fragment);
            member.touch();
            true
        });
    }

    /// Settles one member and, if it was the last one running, the session.
    fn finish_member(&self, index: usize, status: AgentStatus, error: Option<String>) {
        let mut settled = false;
        let mut session_complete = false;
        self.snapshot.send_if_modified(|snapshot| {
            let Some(member) = snapshot.members.get_mut(index) else {
                return false;
            };
            settled = member.settle(status, error.clone());
            if settled
                && snapshot.state == SessionState::Dispatching
                && snapshot.all_terminal()
            {
                snapshot.state = SessionState::Complete;
                session_complete = true;
            }
            settled
        });
        if !settled {
            return;
        }

        let event_type = match status {
            AgentStatus::Complete => EVENT_AGENT_MESSAGE_STREAM_COMPLETED,
            AgentStatus::Cancelled => EVENT_AGENT_MESSAGE_STREAM_CANCELLED,
            _ => EVENT_AGENT_MESSAGE_STREAM_FAILED,
        };
        self.emit_member(index, event_type, json!({ "error": error }));
        if session_complete {
            self.complete_session();
        }
    }

    fn complete_session(&self) {
        let snapshot = self.snapshot.borrow().clone();
        let failed = snapshot
            .members
            .iter()
            .filter(|member| member.status == AgentStatus::Failed)
            .count();
        tracing::info!(
            "fan-out session {} complete ({} members, {failed} failed)",
            self.id,
            snapshot.members.len()
        );
        self.emit(
            EVENT_FANOUT_COMPLETED,
            json!({ "members": snapshot.members.len(), "failed": failed }),
        );
    }
}

/// A running (or finished) fan-out. Cancelling or dropping the session stops every
/// member that is still streaming.
pub struct FanOutSession {
    shared: Arc<SessionShared>,
    token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl FanOutSession {
    /// Dispatches every selected service, truncating the selection to
    /// [`MAX_FANOUT_MEMBERS`]. Must be called inside a tokio runtime.
    pub fn start(
        engine: &RequestEngine,
        request: FanOutRequest,
        bus: Option<Arc<EventBus>>,
    ) -> Self {
        let FanOutRequest {
            mut services,
            messages,
            settings,
        } = request;

        let truncated = services.len().saturating_sub(MAX_FANOUT_MEMBERS);
        services.truncate(MAX_FANOUT_MEMBERS);

        let id = Uuid::new_v4().to_string();
        let (snapshot, _) = watch::channel(FanOutSnapshot {
            session_id: id.clone(),
            state: if services.is_empty() {
                SessionState::Complete
            } else {
                SessionState::Dispatching
            },
            members: services.iter().map(AgentRun::pending).collect(),
            truncated,
        });
        let shared = Arc::new(SessionShared { id, snapshot, bus });
        let token = CancellationToken::new();

        tracing::info!(
            "fan-out session {} dispatching {} members",
            shared.id,
            services.len()
        );
        shared.emit(
            EVENT_FANOUT_STARTED,
            json!({
                "members": services.iter().map(|service| json!({
                    "service_name": service.name,
                    "service_type": service.provider,
                    "model": service.model,
                })).collect::<Vec<_>>(),
            }),
        );
        if truncated > 0 {
            tracing::warn!(
                "fan-out session {} dropped {truncated} services beyond the limit of {MAX_FANOUT_MEMBERS}",
                shared.id
            );
            shared.emit(
                EVENT_FANOUT_TRUNCATED,
                json!({ "dropped": truncated, "limit": MAX_FANOUT_MEMBERS }),
            );
        }

        // Open every stream before spawning any consumer so all requests start together.
        let mut streams = Vec::with_capacity(services.len());
        for (index, service) in services.into_iter().enumerate() {
            match adapter_for_service(&service) {
                Ok(adapter) => {
                    let stream = engine.stream(
                        adapter,
                        service,
                        messages.clone(),
                        None,
                        settings,
                        token.clone(),
                    );
                    streams.push((index, stream));
                }
                Err(error) => {
                    tracing::warn!("fan-out member {} has no adapter: {error}", service.name);
                    shared.finish_member(index, AgentStatus::Failed, Some(error.to_string()));
                }
            }
        }

        let tasks = streams
            .into_iter()
            .map(|(index, stream)| tokio::spawn(run_member(shared.clone(), index, stream)))
            .collect();

        Self {
            shared,
            token,
            tasks: Mutex::new(tasks),
        }
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn truncated(&self) -> usize {
        self.shared.snapshot.borrow().truncated
    }

    pub fn state(&self) -> SessionState {
        self.shared.snapshot.borrow().state
    }

    pub fn snapshot(&self) -> FanOutSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    pub fn members(&self) -> Vec<AgentRun> {
        self.shared.snapshot.borrow().members.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FanOutSnapshot> {
        self.shared.snapshot.subscribe()
    }

    /// Stops every member still running and marks it cancelled. Members that already
    /// finished keep their result.
    pub fn cancel(&self) {
        self.token.cancel();
        for task in self.lock_tasks().iter() {
            task.abort();
        }

        let mut cancelled = Vec::new();
        let mut session_cancelled = false;
        self.shared.snapshot.send_if_modified(|snapshot| {
            for (index, member) in snapshot.members.iter_mut().enumerate() {
                if member.settle(AgentStatus::Cancelled, Some(CANCELLED_MESSAGE.to_string())) {
                    cancelled.push(index);
                }
            }
            if snapshot.state == SessionState::Dispatching {
                snapshot.state = SessionState::Cancelled;
                session_cancelled = true;
            }
            !cancelled.is_empty() || session_cancelled
        });

        for index in &cancelled {
            self.shared.emit_member(
                *index,
                EVENT_AGENT_MESSAGE_STREAM_CANCELLED,
                json!({ "error": CANCELLED_MESSAGE }),
            );
        }
        if session_cancelled {
            tracing::info!(
                "fan-out session {} cancelled ({} members stopped)",
                self.shared.id,
                cancelled.len()
            );
            self.shared.emit(
                EVENT_FANOUT_CANCELLED,
                json!({ "cancelled_members": cancelled.len() }),
            );
        }
    }

    /// Waits for every member task to end, whether it finished or was aborted.
    pub async fn wait(&self) {
        let tasks = std::mem::take(&mut *self.lock_tasks());
        for task in tasks {
            if let Err(error) = task.await {
                if !error.is_cancelled() {
                    tracing::warn!("fan-out member task panicked: {error}");
                }
            }
        }
    }

    /// Whether no member task is still running.
    pub fn is_finished(&self) -> bool {
        self.lock_tasks().iter().all(JoinHandle::is_finished)
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for FanOutSession {
    fn drop(&mut self) {
        self.token.cancel();
        for task in self.lock_tasks().iter() {
            task.abort();
        }
    }
}

async fn run_member(shared: Arc<SessionShared>, index: usize, mut stream: ChatStream) {
    shared.emit_member(index, EVENT_AGENT_MESSAGE_STREAM_STARTED, json!({}));

    while let Some(event) = stream.next_event().await {
        match event {
            StreamEvent::Delta(chunk) => {
                if let Some(fragment) = chunk.text {
                    shared.append_text(index, &fragment);
                    shared.emit_member(index, EVENT_AGENT_MESSAGE_DELTA, json!({ "text": fragment }));
                }
                if let Some(calls) = chunk.tool_calls {
                    tracing::debug!("fan-out member {index} ignored {} tool calls", calls.len());
                }
            }
            StreamEvent::Completed => {
                shared.finish_member(index, AgentStatus::Complete, None);
                return;
            }
            StreamEvent::Failed(error) => {
                tracing::warn!("fan-out member {index} failed: {error}");
                shared.finish_member(index, AgentStatus::Failed, Some(error.to_string()));
                return;
            }
            StreamEvent::Cancelled => {
                shared.finish_member(
                    index,
                    AgentStatus::Cancelled,
                    Some(CANCELLED_MESSAGE.to_string()),
                );
                return;
            }
        }
    }
}

/// Owns the one active fan-out session. Starting a new session cancels the old one.
#[derive(Clone)]
pub struct FanOutOrchestrator {
    engine: RequestEngine,
    bus: Option<Arc<EventBus>>,
    active: Arc<Mutex<Option<Arc<FanOutSession>>>>,
}

impl FanOutOrchestrator {
    pub fn new(engine: RequestEngine) -> Self {
        Self {
            engine,
            bus: None,
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn start(&self, request: FanOutRequest) -> Arc<FanOutSession> {
        let session = Arc::new(FanOutSession::start(&self.engine, request, self.bus.clone()));
        let previous = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(session.clone());
        if let Some(previous) = previous {
            tracing::debug!("fan-out session {} replaced by {}", previous.id(), session.id());
            previous.cancel();
        }
        session
    }

    pub fn active(&self) -> Option<Arc<FanOutSession>> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cancels and forgets the active session, if any.
    pub fn cancel_active(&self) {
        let active = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(session) = active {
            session.cancel();
        }
    }
}
