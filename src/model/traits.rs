//! The provider adapter contract.

use serde::Deserialize;

use crate::config::ServiceConfig;
use crate::model::error::ModelError;
use crate::model::provider::ProviderId;
use crate::model::sse::StreamFormat;
use crate::model::transport::HttpRequest;
use crate::model::types::{
    ChatMessage, DeltaParse, GenerationSettings, ModelDescriptor, ParsedResponse, ToolDescriptor,
};

/// Request construction and response parsing for one provider family.
///
/// Implementations hold no per-request state: one instance is shared across every
/// concurrent request for that family. Transport, status mapping, retry, reasoning
/// bracketing and tool-call accumulation all live in the
/// [`RequestEngine`](crate::model::RequestEngine).
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    fn stream_format(&self) -> StreamFormat {
        StreamFormat::ServerSentEvents
    }

    /// Builds the provider request. Fails with [`ModelError::Configuration`] when the
    /// service has no usable endpoint.
    fn build_request(
        &self,
        service: &ServiceConfig,
        messages: &[ChatMessage],
        tools: Option<&[ToolDescriptor]>,
        settings: &GenerationSettings,
        streaming: bool,
    ) -> Result<HttpRequest, ModelError>;

    /// Parses a complete response body. `None` means the body did not have this
    /// provider's shape.
    fn parse_response(&self, body: &[u8]) -> Option<ParsedResponse>;

    /// Parses one framed stream event. `None` is the end-of-stream sentinel.
    fn parse_delta(&self, payload: Option<&str>) -> DeltaParse;

    fn build_models_request(&self, service: &ServiceConfig) -> Result<HttpRequest, ModelError> {
        let base = service.resolved_base_url(self.id().default_base_url())?;
        Ok(HttpRequest::get(format!("{base}/models")).bearer(&service.api_key))
    }

    /// Parses the `{"data": [{"id": ...}]}` listing most providers return.
    fn parse_models(&self, body: &[u8]) -> Option<Vec<ModelDescriptor>> {
        #[derive(Deserialize)]
        struct Listing {
            data: Vec<Entry>,
        }
        #[derive(Deserialize)]
        struct Entry {
            id: String,
        }

        let listing: Listing = serde_json::from_slice(body).ok()?;
        Some(
            listing
                .data
                .into_iter()
                .map(|entry| ModelDescriptor::new(entry.id))
                .collect(),
        )
    }
}
