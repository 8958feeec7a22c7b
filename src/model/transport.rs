//! HTTP transport seam.
//!
//! The engine talks to providers only through [`HttpTransport`], so tests can swap
//! the shared `reqwest::Client` for a scripted fake.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::config::EngineConfig;
use crate::model::error::ModelError;

const REDACTED_HEADERS: &[&str] = &["authorization", "x-api-key", "api-key"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Provider-specific request produced by an adapter.
#[derive(Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(name, value)| {
                if REDACTED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                    (name.as_str(), "<redacted>")
                } else {
                    (name.as_str(), value.as_str())
                }
            })
            .collect();
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &headers)
            .field("body", &self.body)
            .finish()
    }
}

impl HttpRequest {
    pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(body),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds `Authorization: Bearer <key>` unless the key is blank (local servers).
    pub fn bearer(self, api_key: &str) -> Self {
        if api_key.trim().is_empty() {
            return self;
        }
        self.header("Authorization", format!("Bearer {}", api_key.trim()))
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

pub type ByteStream = BoxStream<'static, Result<Bytes, ModelError>>;

/// Status plus a lazily consumed body.
pub struct HttpResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Reads the whole body, failing once it grows past `limit` bytes.
    pub async fn read_to_end(mut self, limit: usize) -> Result<Vec<u8>, ModelError> {
        let mut out = Vec::new();
        while let Some(chunk) = self.body.next().await {
            let chunk = chunk?;
            if out.len() + chunk.len() > limit {
                return Err(ModelError::Decode(format!(
                    "response body exceeded {limit} bytes"
                )));
            }
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    /// Reads at most `cap` bytes of an error body and lossily decodes them.
    /// Read failures are tolerated: whatever arrived so far is returned.
    pub async fn drain_lossy(mut self, cap: usize) -> String {
        let mut out = Vec::new();
        while out.len() < cap {
            match self.body.next().await {
                Some(Ok(chunk)) => {
                    let room = cap - out.len();
                    out.extend_from_slice(&chunk[..chunk.len().min(room)]);
                }
                Some(Err(error)) => {
                    tracing::debug!("error body read interrupted: {error}");
                    break;
                }
                None => break,
            }
        }
        String::from_utf8_lossy(&out).into_owned()
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ModelError>;
}

/// Production transport over one shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &EngineConfig) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|error| ModelError::Configuration(error.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ModelError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ModelError::from))
            .boxed();

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(chunks: Vec<&'static str>) -> HttpResponse {
        HttpResponse {
            status: 500,
            body: futures::stream::iter(
                chunks
                    .into_iter()
                    .map(|chunk| Ok(Bytes::from_static(chunk.as_bytes()))),
            )
            .boxed(),
        }
    }

    #[tokio::test]
    async fn drain_lossy_stops_at_cap() {
        let body = response(vec!["0123456789", "abcdefghij", "never read"])
            .drain_lossy(15)
            .await;
        assert_eq!(body, "0123456789abcde");
    }

    #[tokio::test]
    async fn read_to_end_rejects_oversized_bodies() {
        let result = response(vec!["0123456789", "abcdefghij"]).read_to_end(12).await;
        assert!(matches!(result, Err(ModelError::Decode(_))));
    }

    #[test]
    fn debug_redacts_credentials() {
        let request = HttpRequest::post("https://api.example.com", serde_json::json!({}))
            .bearer("sk-live")
            .header("x-api-key", "ant-key");
        let rendered = format!("{request:?}");
        assert!(!rendered.contains("sk-live"));
        assert!(!rendered.contains("ant-key"));
        assert_eq!(request.header_value("authorization"), Some("Bearer sk-live"));
    }

    #[test]
    fn bearer_skipped_for_blank_keys() {
        let request = HttpRequest::get("http://localhost:11434/api/tags").bearer("  ");
        assert_eq!(request.header_value("Authorization"), None);
    }
}
