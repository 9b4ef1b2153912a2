//! Errors produced while executing a single node inside a container.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// A required input had no URL supplied in the task.
    MissingRequiredInput { name: String },
    /// A fetched input's sniffed mime type isn't accepted by the port.
    MimeRejected { name: String, mime: String },
    /// An output's declared mime types don't resolve to exactly one
    /// extension, so no host path could be synthesized for it.
    AmbiguousOutputExtension { name: String },
    /// Fetching an input URL failed.
    InputFetchFailed { name: String, message: String },
    /// The node def's command template failed to shell-expand.
    CommandExpansionFailed { message: String },
    /// A container lifecycle call (create/start/wait/remove) failed.
    ContainerFailed { message: String },
    /// Staging an input into the container failed.
    StageInputFailed { name: String, message: String },
    /// Uploading an output to its presigned URL failed.
    UploadOutputFailed { name: String, message: String },
    /// The container exited with a non-zero status.
    NonZeroExit { exit_code: i64 },
    /// The worker's resource manager could not reserve capacity for this
    /// node's tier.
    ResourceReservationFailed { message: String },
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRequiredInput { name } => write!(f, "missing required input '{name}'"),
            Self::MimeRejected { name, mime } => write!(f, "input '{name}' has rejected mime type '{mime}'"),
            Self::AmbiguousOutputExtension { name } => {
                write!(f, "output '{name}' does not resolve to exactly one file extension")
            }
            Self::InputFetchFailed { name, message } => write!(f, "failed to fetch input '{name}': {message}"),
            Self::CommandExpansionFailed { message } => write!(f, "command expansion failed: {message}"),
            Self::ContainerFailed { message } => write!(f, "container operation failed: {message}"),
            Self::StageInputFailed { name, message } => write!(f, "failed to stage input '{name}': {message}"),
            Self::UploadOutputFailed { name, message } => write!(f, "failed to upload output '{name}': {message}"),
            Self::NonZeroExit { exit_code } => write!(f, "container exited with status {exit_code}"),
            Self::ResourceReservationFailed { message } => write!(f, "resource reservation failed: {message}"),
        }
    }
}

impl std::error::Error for WorkerError {}
