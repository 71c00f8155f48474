// TestDependencies - mock implementations for testing
//
// Provides mock services that can be injected into ServerDeps / Relay for tests.

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::{Arc, Mutex};

use super::{BaseMessenger, BaseTextGenerator, FragmentStream, ServerDeps};
use crate::common::MessageHandle;

// =============================================================================
// Mock Text Generator
// =============================================================================

/// Deterministic engine: yields its fragments in order, optionally failing
/// after a number of them.
pub struct MockTextGenerator {
    fragments: Vec<String>,
    fail_after: Option<usize>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockTextGenerator {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            fail_after: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fail the generation after `count` fragments have been yielded
    /// (`0` fails before any output).
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Get all prompts that were sent to the engine
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Get the number of times the engine was called
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl BaseTextGenerator for MockTextGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.lock().unwrap().push(prompt.to_string());

        if self.fail_after.is_some() {
            anyhow::bail!("mock generation failed");
        }
        Ok(self.fragments.concat())
    }

    fn generate_stream(&self, prompt: &str) -> FragmentStream {
        self.calls.lock().unwrap().push(prompt.to_string());

        let limit = self.fail_after.unwrap_or(self.fragments.len());
        let mut items: Vec<Result<String>> = self
            .fragments
            .iter()
            .take(limit)
            .cloned()
            .map(Ok)
            .collect();
        if self.fail_after.is_some() {
            items.push(Err(anyhow::anyhow!("mock generation failed")));
        }

        stream::iter(items).boxed()
    }
}

// =============================================================================
// Mock Messenger
// =============================================================================

/// A recorded messaging call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessengerCall {
    Post {
        channel: String,
        text: String,
    },
    Update {
        channel: String,
        handle: MessageHandle,
        text: String,
    },
}

impl MessengerCall {
    pub fn text(&self) -> &str {
        match self {
            MessengerCall::Post { text, .. } | MessengerCall::Update { text, .. } => text,
        }
    }
}

#[derive(Default)]
pub struct MockMessenger {
    calls: Arc<Mutex<Vec<MessengerCall>>>,
    fail_on_call: Option<usize>,
}

impl MockMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the n-th call (1-based), posts and updates counted together.
    pub fn fail_on_call(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    /// Get all calls in the order they were made
    pub fn calls(&self) -> Vec<MessengerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn posts(&self) -> Vec<MessengerCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, MessengerCall::Post { .. }))
            .collect()
    }

    pub fn updates(&self) -> Vec<MessengerCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, MessengerCall::Update { .. }))
            .collect()
    }

    /// Text of the most recent call
    pub fn last_text(&self) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .last()
            .map(|c| c.text().to_string())
    }

    fn record(&self, call: MessengerCall) -> Result<usize> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(call);
        let count = calls.len();
        if self.fail_on_call == Some(count) {
            anyhow::bail!("mock messenger call {} failed", count);
        }
        Ok(count)
    }
}

#[async_trait]
impl BaseMessenger for MockMessenger {
    async fn post_message(&self, channel: &str, text: &str) -> Result<MessageHandle> {
        let count = self.record(MessengerCall::Post {
            channel: channel.to_string(),
            text: text.to_string(),
        })?;
        Ok(MessageHandle(format!("1700000000.{:06}", count)))
    }

    async fn update_message(
        &self,
        channel: &str,
        handle: &MessageHandle,
        text: &str,
    ) -> Result<()> {
        self.record(MessengerCall::Update {
            channel: channel.to_string(),
            handle: handle.clone(),
            text: text.to_string(),
        })?;
        Ok(())
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

/// Container for test dependencies
pub struct TestDependencies {
    pub generator: Arc<MockTextGenerator>,
    pub messenger: Arc<MockMessenger>,
}

impl TestDependencies {
    pub fn new(generator: MockTextGenerator) -> Self {
        Self {
            generator: Arc::new(generator),
            messenger: Arc::new(MockMessenger::new()),
        }
    }

    pub fn with_messenger(mut self, messenger: MockMessenger) -> Self {
        self.messenger = Arc::new(messenger);
        self
    }

    /// Framer dependencies backed by the mock engine
    pub fn server_deps(&self, streamed_response: bool) -> ServerDeps {
        ServerDeps::new(self.generator.clone(), streamed_response)
    }
}
