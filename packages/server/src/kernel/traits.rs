// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - the relay pipeline is written against
// them so tests can swap in the mocks from test_dependencies.
//
// Naming convention: Base* for trait names (e.g., BaseTextGenerator)

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::common::MessageHandle;

/// Fragments of one generation, in order. An `Err` item ends the generation.
pub type FragmentStream = BoxStream<'static, Result<String>>;

// =============================================================================
// Generation Engine Trait
// =============================================================================

#[async_trait]
pub trait BaseTextGenerator: Send + Sync {
    /// Generate the complete answer for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate the answer as a stream of text fragments.
    fn generate_stream(&self, prompt: &str) -> FragmentStream;
}

// =============================================================================
// Messaging Surface Trait
// =============================================================================

#[async_trait]
pub trait BaseMessenger: Send + Sync {
    /// Post a new message to `channel`, returning its handle.
    async fn post_message(&self, channel: &str, text: &str) -> Result<MessageHandle>;

    /// Replace the visible text of a posted message.
    async fn update_message(&self, channel: &str, handle: &MessageHandle, text: &str)
        -> Result<()>;
}
