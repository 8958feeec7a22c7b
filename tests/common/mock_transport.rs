// tests/common/mock_transport.rs
//! Mock transport that routes engine requests to a `MockProvider`.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::Mutex;

use chorus_lib::model::{HttpRequest, HttpResponse, HttpTransport, ModelError};

use super::mock_provider::MockProvider;

pub struct MockTransport {
    provider: Arc<MockProvider>,
    should_fail_connection: Arc<Mutex<bool>>,
    connection_error_message: Arc<Mutex<String>>,
}

impl MockTransport {
    pub fn new(provider: Arc<MockProvider>) -> Self {
        Self {
            provider,
            should_fail_connection: Arc::new(Mutex::new(false)),
            connection_error_message: Arc::new(Mutex::new("connection refused".to_string())),
        }
    }

    /// Set whether every request should fail before reaching the provider.
    pub async fn set_should_fail_connection(&self, should_fail: bool, message: impl Into<String>) {
        *self.should_fail_connection.lock().await = should_fail;
        *self.connection_error_message.lock().await = message.into();
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ModelError> {
        if *self.should_fail_connection.lock().await {
            return Err(ModelError::Transport(
                self.connection_error_message.lock().await.clone(),
            ));
        }

        let reply = self.provider.handle(&request.url, request.body.as_ref());
        let body = futures::stream::iter(
            reply
                .chunks
                .into_iter()
                .map(|chunk| Ok::<_, ModelError>(Bytes::from(chunk))),
        )
        .boxed();

        Ok(HttpResponse {
            status: reply.status,
            body,
        })
    }
}
