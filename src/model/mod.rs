//! Unified inference layer over AI provider HTTP APIs.
//!
//! ## Structure
//!
//! - `types`, `error`: Value types and the failure taxonomy
//! - `traits`: The `ProviderAdapter` contract
//! - `sse`: Provider-agnostic event framing
//! - `engine`: Shared request execution, streaming, and the reasoning-off retry
//! - `provider`, `factory`: Provider identity and adapter selection
//! - `catalog`: Reasoning-model detection and defaults
//! - `providers/`: Provider-specific adapters

mod shared;

pub mod catalog;
pub mod engine;
pub mod error;
pub mod factory;
pub mod provider;
pub mod reasoning;
pub mod retry;
pub mod sse;
pub mod tool_calls;
pub mod traits;
pub mod transport;
pub mod types;

// Provider implementations
pub mod providers;

pub use catalog::ModelCatalog;
pub use engine::{ChatStream, CollectedResponse, RequestEngine, StreamEvent};
pub use error::ModelError;
pub use factory::{adapter_for, adapter_for_service, create_adapter};
pub use provider::ProviderId;
pub use reasoning::{REASONING_CLOSE, REASONING_OPEN};
pub use traits::ProviderAdapter;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use types::{
    ChatChunk, ChatMessage, ChatResponse, GenerationSettings, ModelDescriptor, ReasoningEffort,
    Role, ToolCall, ToolDescriptor,
};
