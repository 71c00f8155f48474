//! Server dependencies (using traits for testability)
//!
//! `ServerDeps` is handed to the framer; the relay receives its messenger
//! directly. Real services are wrapped in adapters implementing the kernel
//! traits so tests can swap in the mocks from `test_dependencies`.

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use genai_client::GenAIClient;
use slack::SlackService;
use std::sync::Arc;

use crate::common::MessageHandle;
use crate::kernel::{BaseMessenger, BaseTextGenerator, FragmentStream};

// =============================================================================
// GenAIClient Adapter (implements BaseTextGenerator trait)
// =============================================================================

/// Wrapper around GenAIClient that implements BaseTextGenerator trait
pub struct GenAIAdapter(pub Arc<GenAIClient>);

impl GenAIAdapter {
    pub fn new(client: Arc<GenAIClient>) -> Self {
        Self(client)
    }
}

#[async_trait]
impl BaseTextGenerator for GenAIAdapter {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.0
            .generate_content(prompt)
            .await
            .map_err(anyhow::Error::from)
    }

    fn generate_stream(&self, prompt: &str) -> FragmentStream {
        let client = self.0.clone();
        let prompt = prompt.to_string();

        // The request itself is the first await of the stream, so a failed
        // call surfaces as the first item.
        stream::once(async move { client.generate_content_stream(&prompt).await })
            .try_flatten()
            .map_err(anyhow::Error::from)
            .boxed()
    }
}

// =============================================================================
// SlackService Adapter (implements BaseMessenger trait)
// =============================================================================

/// Wrapper around SlackService that implements BaseMessenger trait
pub struct SlackAdapter(pub Arc<SlackService>);

impl SlackAdapter {
    pub fn new(service: Arc<SlackService>) -> Self {
        Self(service)
    }
}

#[async_trait]
impl BaseMessenger for SlackAdapter {
    async fn post_message(&self, channel: &str, text: &str) -> Result<MessageHandle> {
        self.0
            .post_message(channel, text)
            .await
            .map(|posted| MessageHandle(posted.ts))
            .map_err(anyhow::Error::from)
    }

    async fn update_message(
        &self,
        channel: &str,
        handle: &MessageHandle,
        text: &str,
    ) -> Result<()> {
        self.0
            .update_message(channel, handle.as_str(), text)
            .await
            .map_err(anyhow::Error::from)
    }
}

// =============================================================================
// ServerDeps
// =============================================================================

/// Dependencies of the framer endpoint
#[derive(Clone)]
pub struct ServerDeps {
    pub generator: Arc<dyn BaseTextGenerator>,
    /// Answer with an event stream (`true`) or a single JSON body.
    pub streamed_response: bool,
}

impl ServerDeps {
    pub fn new(generator: Arc<dyn BaseTextGenerator>, streamed_response: bool) -> Self {
        Self {
            generator,
            streamed_response,
        }
    }
}
