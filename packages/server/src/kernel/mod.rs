//! Kernel module - server infrastructure and dependencies.

pub mod deps;
pub mod telemetry;
pub mod test_dependencies;
pub mod traits;

pub use deps::{GenAIAdapter, ServerDeps, SlackAdapter};
pub use telemetry::{extract_context, init_telemetry, inject_context, TelemetryProviders};
pub use test_dependencies::{MessengerCall, MockMessenger, MockTextGenerator, TestDependencies};
pub use traits::*;
