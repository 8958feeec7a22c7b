// tests/common/mod.rs
//! Common test utilities for inference integration tests.

pub mod mock_provider;
pub mod mock_transport;

pub use mock_provider::MockProvider;
pub use mock_transport::MockTransport;
