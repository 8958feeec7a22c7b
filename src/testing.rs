//! Scripted HTTP transport for engine and fan-out tests.
//!
//! Routes are matched by URL substring. Each route holds a queue of replies; the last
//! reply repeats once the queue is down to one.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use crate::model::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::model::ModelError;

#[derive(Debug, Clone)]
pub enum Reply {
    /// Status plus body chunks, then end of body.
    Body { status: u16, chunks: Vec<Bytes> },
    /// Status plus body chunks, then a body that never ends.
    Hang { status: u16, chunks: Vec<Bytes> },
    /// The request never gets a response.
    Fail(ModelError),
}

impl Reply {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self::Body {
            status,
            chunks: vec![Bytes::from(body.to_string())],
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self::Body {
            status,
            chunks: vec![Bytes::copy_from_slice(body.as_bytes())],
        }
    }

    /// One chunk per element, so tests decide where reads split.
    pub fn chunks(status: u16, chunks: &[&str]) -> Self {
        Self::Body {
            status,
            chunks: chunks
                .iter()
                .map(|chunk| Bytes::copy_from_slice(chunk.as_bytes()))
                .collect(),
        }
    }

    pub fn hang(chunks: &[&str]) -> Self {
        Self::Hang {
            status: 200,
            chunks: chunks
                .iter()
                .map(|chunk| Bytes::copy_from_slice(chunk.as_bytes()))
                .collect(),
        }
    }
}

/// SSE body from JSON payloads, terminated by `[DONE]`.
pub fn sse(payloads: &[serde_json::Value]) -> Vec<String> {
    let mut events: Vec<String> = payloads
        .iter()
        .map(|payload| format!("data: {payload}\n\n"))
        .collect();
    events.push("data: [DONE]\n\n".to_string());
    events
}

/// Chat-completions delta event carrying `content`.
pub fn content_delta(content: &str) -> serde_json::Value {
    serde_json::json!({ "choices": [{ "index": 0, "delta": { "content": content } }] })
}

struct BodyGuard(Arc<AtomicUsize>);

impl Drop for BodyGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<(String, VecDeque<Reply>)>>,
    requests: Mutex<Vec<HttpRequest>>,
    open_bodies: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, url_fragment: impl Into<String>, replies: Vec<Reply>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .push((url_fragment.into(), replies.into()));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Response bodies handed out and not yet dropped.
    pub fn open_bodies(&self) -> usize {
        self.open_bodies.load(Ordering::SeqCst)
    }

    fn next_reply(&self, url: &str) -> Option<Reply> {
        let mut routes = self.routes.lock().unwrap();
        let (_, replies) = routes
            .iter_mut()
            .find(|(fragment, _)| url.contains(fragment.as_str()))?;
        if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ModelError> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);

        let reply = self
            .next_reply(&url)
            .ok_or_else(|| ModelError::Transport(format!("no scripted route for {url}")))?;
        let (status, chunks, hang) = match reply {
            Reply::Body { status, chunks } => (status, chunks, false),
            Reply::Hang { status, chunks } => (status, chunks, true),
            Reply::Fail(error) => return Err(error),
        };

        self.open_bodies.fetch_add(1, Ordering::SeqCst);
        let guard = BodyGuard(self.open_bodies.clone());
        let chunks = futures::stream::iter(chunks.into_iter().map(Ok::<_, ModelError>));
        let body = if hang {
            chunks.chain(futures::stream::pending()).boxed()
        } else {
            chunks.boxed()
        };
        let body = body
            .map(move |chunk| {
                let _open = &guard;
                chunk
            })
            .boxed();

        Ok(HttpResponse { status, body })
    }
}
