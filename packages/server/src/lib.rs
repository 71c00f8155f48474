// Chat Relay - Core
//
// Relays chat questions from Slack to a generative text engine and streams the
// answer back as one evolving Slack message.
//
// server/ hosts the chat endpoint that frames engine output as an event stream;
// relay/ is the consuming side that decodes that stream and projects it onto
// Slack. kernel/ holds the dependency-injection traits, adapters and telemetry.

pub mod common;
pub mod config;
pub mod kernel;
pub mod relay;
pub mod server;

pub use config::*;
