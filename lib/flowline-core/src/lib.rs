//! Shared identifiers, envelope plumbing, and error-context scaffolding for
//! the flowline engine's component crates.

pub mod envelope;
pub mod error;
pub mod id;

pub use envelope::{Envelope, EnvelopeDecodeError, RawEnvelope};
pub use error::Result;
pub use id::{FlowRunId, NodeId, ParseIdError};
