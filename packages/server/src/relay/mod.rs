//! Receiving side of the stream: turns the framer's event stream back into
//! one evolving chat message.
//!
//! `decoder` parses frames, `projector` mirrors them onto the messaging
//! surface and `orchestrator` runs one relay per inbound event.

pub mod decoder;
pub mod error;
pub mod orchestrator;
pub mod projector;

pub use decoder::{assemble, FrameDecoder, Signal};
pub use error::{DecodeError, RelayError};
pub use orchestrator::{Relay, RelayOutcome, FALLBACK_MESSAGE};
pub use projector::{project, ProjectionOutcome, RunningMessage, PROVISIONAL_MARKER};
