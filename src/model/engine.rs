//! Generic request engine.
//!
//! Every provider shares this one execution path: build the request through the
//! adapter, execute it over the injected transport, map the status, then parse. The
//! streaming path runs in its own task and writes into a bounded channel; the
//! channel closing marks the end of the stream.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::config::{EngineConfig, ServiceConfig};
use crate::model::error::ModelError;
use crate::model::reasoning::{bracket_complete, ReasoningBracket};
use crate::model::retry::should_retry_without_reasoning;
use crate::model::sse::{SseEvent, SseFramer};
use crate::model::tool_calls::{filter_complete, ToolCallAccumulator};
use crate::model::traits::ProviderAdapter;
use crate::model::transport::{HttpResponse, HttpTransport, ReqwestTransport};
use crate::model::types::{
    ChatChunk, ChatMessage, ChatResponse, GenerationSettings, ModelDescriptor, ToolCall,
    ToolDescriptor,
};

/// What a streaming caller observes. Exactly one terminal variant ends a stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Delta(ChatChunk),
    Completed,
    Failed(ModelError),
    /// The request was cancelled. Not an error.
    Cancelled,
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Delta(_))
    }
}

#[derive(Clone)]
pub struct RequestEngine {
    transport: Arc<dyn HttpTransport>,
    config: EngineConfig,
}

impl RequestEngine {
    pub fn new(transport: Arc<dyn HttpTransport>, config: EngineConfig) -> Self {
        Self { transport, config }
    }

    /// Engine over a shared `reqwest::Client` configured from `config`.
    pub fn with_reqwest(config: EngineConfig) -> Result<Self, ModelError> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Non-streaming call, with the single reasoning-off retry.
    pub async fn complete(
        &self,
        adapter: &dyn ProviderAdapter,
        service: &ServiceConfig,
        messages: &[ChatMessage],
        tools: Option<&[ToolDescriptor]>,
        settings: &GenerationSettings,
    ) -> Result<ChatResponse, ModelError> {
        match self
            .complete_once(adapter, service, messages, tools, settings)
            .await
        {
            Err(error) if should_retry_without_reasoning(settings, &error) => {
                tracing::warn!(
                    "{} rejected reasoning parameters ({error}); retrying once without reasoning",
                    adapter.id()
                );
                let retry = settings.without_reasoning();
                self.complete_once(adapter, service, messages, tools, &retry)
                    .await
            }
            other => other,
        }
    }

    async fn complete_once(
        &self,
        adapter: &dyn ProviderAdapter,
        service: &ServiceConfig,
        messages: &[ChatMessage],
        tools: Option<&[ToolDescriptor]>,
        settings: &GenerationSettings,
    ) -> Result<ChatResponse, ModelError> {
        let request = adapter.build_request(service, messages, tools, settings, false)?;
        tracing::debug!("{} request: {} {}", adapter.id(), service.model, request.url);

        let response = self.transport.execute(request).await?;
        let response = self.ensure_success(adapter, response).await?;
        let body = response.read_to_end(self.config.max_response_bytes).await?;

        let parsed = adapter.parse_response(&body).ok_or_else(|| {
            ModelError::Decode(format!(
                "{} response did not match the expected shape",
                adapter.id()
            ))
        })?;

        let text = bracket_complete(parsed.reasoning.as_deref(), parsed.text.as_deref());
        let tool_calls = filter_complete(parsed.tool_calls);
        Ok(ChatResponse {
            text,
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        })
    }

    pub async fn list_models(
        &self,
        adapter: &dyn ProviderAdapter,
        service: &ServiceConfig,
    ) -> Result<Vec<ModelDescriptor>, ModelError> {
        let request = adapter.build_models_request(service)?;
        let response = self.transport.execute(request).await?;
        let response = self.ensure_success(adapter, response).await?;
        let body = response.read_to_end(self.config.max_response_bytes).await?;
        adapter.parse_models(&body).ok_or_else(|| {
            ModelError::Decode(format!("{} model listing was not understood", adapter.id()))
        })
    }

    /// Starts a streaming call in its own task.
    ///
    /// Cancelling `cancel` (or any parent of it) or dropping the returned
    /// [`ChatStream`] stops byte consumption. Dropping the stream never cancels `cancel`
    /// itself, so a token shared by several streams stays usable.
    pub fn stream(
        &self,
        adapter: Arc<dyn ProviderAdapter>,
        service: ServiceConfig,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDescriptor>>,
        settings: GenerationSettings,
        cancel: CancellationToken,
    ) -> ChatStream {
        let token = cancel.child_token();
        let (tx, rx) = mpsc::channel(self.config.stream_buffer.max(1));
        let engine = self.clone();
        let job = StreamJob {
            adapter,
            service,
            messages,
            tools,
        };

        let task_token = token.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = task_token.cancelled() => Outcome::Cancelled,
                outcome = engine.run_stream(&job, settings, &tx) => outcome,
            };

            match outcome {
                Outcome::Cancelled => {
                    tracing::debug!("{} stream cancelled", job.adapter.id());
                    // Receiver may already be gone; a closed channel reads as cancelled too.
                    let _ = tx.try_send(StreamEvent::Cancelled);
                }
                Outcome::ReceiverClosed => {
                    tracing::debug!("{} stream receiver dropped", job.adapter.id());
                }
                Outcome::Completed => {
                    deliver(&tx, &task_token, StreamEvent::Completed).await;
                }
                Outcome::Failed(error) => {
                    tracing::debug!("{} stream failed: {error}", job.adapter.id());
                    deliver(&tx, &task_token, StreamEvent::Failed(error)).await;
                }
            }
        });

        ChatStream {
            events: rx,
            _guard: token.clone().drop_guard(),
            token,
            terminated: false,
        }
    }

    async fn run_stream(
        &self,
        job: &StreamJob,
        settings: GenerationSettings,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Outcome {
        let mut forwarded = false;
        match self.stream_attempt(job, &settings, tx, &mut forwarded).await {
            Outcome::Failed(error)
                if !forwarded && should_retry_without_reasoning(&settings, &error) =>
            {
                tracing::warn!(
                    "{} rejected reasoning parameters ({error}); retrying stream once without reasoning",
                    job.adapter.id()
                );
                let retry = settings.without_reasoning();
                self.stream_attempt(job, &retry, tx, &mut forwarded).await
            }
            other => other,
        }
    }

    async fn stream_attempt(
        &self,
        job: &StreamJob,
        settings: &GenerationSettings,
        tx: &mpsc::Sender<StreamEvent>,
        forwarded: &mut bool,
    ) -> Outcome {
        let adapter = job.adapter.as_ref();
        let request = match adapter.build_request(
            &job.service,
            &job.messages,
            job.tools.as_deref(),
            settings,
            true,
        ) {
            Ok(request) => request,
            Err(error) => return Outcome::Failed(error),
        };
        tracing::debug!(
            "{} stream request: {} {}",
            adapter.id(),
            job.service.model,
            request.url
        );

        let response = match self.transport.execute(request).await {
            Ok(response) => response,
            Err(error) => return Outcome::Failed(error),
        };
        let response = match self.ensure_success(adapter, response).await {
            Ok(response) => response,
            Err(error) => return Outcome::Failed(error),
        };

        let mut framer = SseFramer::new(adapter.stream_format());
        let mut state = AttemptState::default();
        let mut body = response.body;

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(error) => return state.close(tx, Outcome::Failed(error), forwarded).await,
            };
            for event in framer.push(&chunk) {
                if let Some(outcome) = state.apply(adapter, event, tx, forwarded).await {
                    return state.close(tx, outcome, forwarded).await;
                }
            }
        }
        for event in framer.finish() {
            if let Some(outcome) = state.apply(adapter, event, tx, forwarded).await {
                return state.close(tx, outcome, forwarded).await;
            }
        }

        tracing::debug!("{} stream ended without a final event", adapter.id());
        state.close(tx, Outcome::Completed, forwarded).await
    }

    async fn ensure_success(
        &self,
        adapter: &dyn ProviderAdapter,
        response: HttpResponse,
    ) -> Result<HttpResponse, ModelError> {
        let status = response.status;
        tracing::debug!("{} response status={status}", adapter.id());
        if response.is_success() {
            return Ok(response);
        }
        let body = response.drain_lossy(self.config.error_body_cap).await;
        Err(ModelError::from_status(status, &body).unwrap_or(ModelError::Unknown(body)))
    }
}

struct StreamJob {
    adapter: Arc<dyn ProviderAdapter>,
    service: ServiceConfig,
    messages: Vec<ChatMessage>,
    tools: Option<Vec<ToolDescriptor>>,
}

enum Outcome {
    Completed,
    Failed(ModelError),
    Cancelled,
    ReceiverClosed,
}

/// Per-attempt accumulation. Owned by one request task, never shared.
#[derive(Default)]
struct AttemptState {
    bracket: ReasoningBracket,
    tool_calls: ToolCallAccumulator,
}

impl AttemptState {
    /// Applies one framed event. Returns an outcome when the stream should stop.
    async fn apply(
        &mut self,
        adapter: &dyn ProviderAdapter,
        event: SseEvent,
        tx: &mpsc::Sender<StreamEvent>,
        forwarded: &mut bool,
    ) -> Option<Outcome> {
        let parsed = match &event {
            SseEvent::Done => adapter.parse_delta(None),
            SseEvent::Data(payload) => adapter.parse_delta(Some(payload)),
        };

        if let Some(error) = parsed.error {
            return Some(Outcome::Failed(error));
        }
        for fragment in parsed.tool_calls {
            self.tool_calls.merge(fragment);
        }

        let mut pieces = Vec::new();
        if let Some(reasoning) = parsed.reasoning.as_deref() {
            pieces.extend(self.bracket.reasoning(reasoning));
        }
        if let Some(text) = parsed.text.as_deref() {
            pieces.extend(self.bracket.content(text));
        }
        for piece in pieces {
            if tx.send(StreamEvent::Delta(ChatChunk::text(piece))).await.is_err() {
                return Some(Outcome::ReceiverClosed);
            }
            *forwarded = true;
        }

        parsed.is_final.then_some(Outcome::Completed)
    }

    /// Emits the closing marker if reasoning is still open and, on success, the
    /// accumulated tool calls.
    async fn close(
        self,
        tx: &mpsc::Sender<StreamEvent>,
        outcome: Outcome,
        forwarded: &mut bool,
    ) -> Outcome {
        let AttemptState {
            mut bracket,
            tool_calls,
        } = self;

        if let Some(close) = bracket.finish() {
            if tx.send(StreamEvent::Delta(ChatChunk::text(close))).await.is_err() {
                return Outcome::ReceiverClosed;
            }
            *forwarded = true;
        }

        if matches!(outcome, Outcome::Completed) && !tool_calls.is_empty() {
            let calls = tool_calls.finish();
            if !calls.is_empty() {
                let chunk = ChatChunk {
                    text: None,
                    tool_calls: Some(calls),
                };
                if tx.send(StreamEvent::Delta(chunk)).await.is_err() {
                    return Outcome::ReceiverClosed;
                }
                *forwarded = true;
            }
        }

        outcome
    }
}

async fn deliver(tx: &mpsc::Sender<StreamEvent>, token: &CancellationToken, event: StreamEvent) {
    tokio::select! {
        _ = token.cancelled() => {
            let _ = tx.try_send(StreamEvent::Cancelled);
        }
        _ = tx.send(event) => {}
    }
}

/// Receiving half of a streaming call.
///
/// Yields [`StreamEvent`]s in arrival order and ends after the first terminal event.
/// Dropping it cancels the request task.
pub struct ChatStream {
    events: mpsc::Receiver<StreamEvent>,
    token: CancellationToken,
    _guard: DropGuard,
    terminated: bool,
}

/// A fully drained stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedResponse {
    pub response: ChatResponse,
    pub cancelled: bool,
}

impl ChatStream {
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        StreamExt::next(self).await
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Drains the stream, concatenating text fragments and collecting tool calls.
    pub async fn collect(mut self) -> Result<CollectedResponse, ModelError> {
        let mut text = String::new();
        let mut saw_text = false;
        let mut tool_calls: Vec<ToolCall> = Vec::new();

        while let Some(event) = self.next_event().await {
            match event {
                StreamEvent::Delta(chunk) => {
                    if let Some(fragment) = chunk.text {
                        saw_text = true;
                        text.push_str(&fragment);
                    }
                    if let Some(calls) = chunk.tool_calls {
                        tool_calls.extend(calls);
                    }
                }
                StreamEvent::Failed(error) => return Err(error),
                StreamEvent::Completed | StreamEvent::Cancelled => {
                    let cancelled = matches!(event, StreamEvent::Cancelled);
                    return Ok(CollectedResponse {
                        response: ChatResponse {
                            text: saw_text.then_some(text),
                            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                        },
                        cancelled,
                    });
                }
            }
        }

        Err(ModelError::Transport(
            "stream ended without a terminal event".to_string(),
        ))
    }
}

impl Stream for ChatStream {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.terminated {
            return Poll::Ready(None);
        }
        match this.events.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    this.terminated = true;
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                this.terminated = true;
                // The task only closes without a terminal event when it was cancelled
                // or torn down.
                if this.token.is_cancelled() {
                    Poll::Ready(Some(StreamEvent::Cancelled))
                } else {
                    Poll::Ready(Some(StreamEvent::Failed(ModelError::Transport(
                        "stream task ended unexpectedly".to_string(),
                    ))))
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
