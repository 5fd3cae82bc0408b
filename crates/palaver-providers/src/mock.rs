//! Scripted mock provider for tests and examples.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use palaver_core::provider::{LlmRequest, LlmResponse, Provider, ProviderError};

/// Returns queued responses in order and captures every request for
/// assertions. An exhausted queue turns into a response error, standing
/// in for a failing API.
#[derive(Default)]
pub struct MockProvider {
    responses: Mutex<VecDeque<LlmResponse>>,
    calls: Mutex<Vec<LlmRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next response.
    pub fn enqueue(self, response: LlmResponse) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
        self
    }

    /// Every request received so far.
    pub fn calls(&self) -> Vec<LlmRequest> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse, ProviderError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| ProviderError::Response("no scripted response left".to_string()))
    }
}
