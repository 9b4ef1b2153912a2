//! The controller's own error type.
//!
//! The controller is the one component that crosses every other component
//! boundary (runtime, repository, sync plane) in a single call, so unlike
//! those crates' plain leaf enums it returns [`flowline_core::Result`],
//! wrapping whichever lower layer failed into a `ControllerError` variant
//! that records what the handler was doing when it happened.

use std::fmt;

use flowline_core::FlowRunId;
use flowline_flow::ValidationError;

/// Errors a `ControllerService` call can produce, matching the taxonomy in
/// the error handling design: validation rejects admission, lock
/// contention is retryable, a missing run is abandoned, everything else is
/// a wrapped lower-layer failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// Admission validation rejected the flow.
    Validation { errors: Vec<ValidationError> },
    /// The run mutex is already held; the caller should retry later.
    LockContended { run_id: FlowRunId },
    /// No record exists for this run.
    NotFound { run_id: FlowRunId },
    /// The run repository returned an error.
    Repository { message: String },
    /// Rebuilding or stepping the runtime failed.
    Runtime { message: String },
    /// Publishing a task onto the sync plane failed.
    Bus { message: String },
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { errors } => {
                write!(f, "flow failed admission validation: {} error(s)", errors.len())
            }
            Self::LockContended { run_id } => write!(f, "run mutex for {run_id} is already held"),
            Self::NotFound { run_id } => write!(f, "no run record for {run_id}"),
            Self::Repository { message } => write!(f, "run repository error: {message}"),
            Self::Runtime { message } => write!(f, "runtime error: {message}"),
            Self::Bus { message } => write!(f, "task bus error: {message}"),
        }
    }
}

impl std::error::Error for ControllerError {}
