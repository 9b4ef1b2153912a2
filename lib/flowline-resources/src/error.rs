//! Errors produced while validating or reserving worker resources.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// The named tier does not appear in the catalog.
    UnknownTier { tier: String },
    /// A tier's requirements exceed what this worker can ever provide,
    /// regardless of current load (e.g. no GPU present for a GPU tier).
    TierUnsatisfiable { tier: String, reason: String },
    /// A reservation would exceed currently-available memory or storage.
    InsufficientCapacity {
        tier: String,
        requested_mb: u64,
        available_mb: u64,
        resource: &'static str,
    },
    /// A host resource string (e.g. `"4gb"`) could not be parsed.
    InvalidUnitString { input: String },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTier { tier } => write!(f, "unknown resource tier {tier:?}"),
            Self::TierUnsatisfiable { tier, reason } => {
                write!(f, "tier {tier:?} can never be satisfied by this worker: {reason}")
            }
            Self::InsufficientCapacity {
                tier,
                requested_mb,
                available_mb,
                resource,
            } => write!(
                f,
                "tier {tier:?} requests {requested_mb}mb {resource} but only {available_mb}mb is available"
            ),
            Self::InvalidUnitString { input } => write!(f, "invalid resource unit string {input:?}"),
        }
    }
}

impl std::error::Error for ResourceError {}
