//! Errors produced by the sync plane's coordination primitives.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutexError {
    /// The key is already held by another process and `Lock` fails fast
    /// rather than reblocking.
    Contended { key: String },
    /// The backing store rejected the lock/unlock operation.
    Backend { message: String },
}

impl fmt::Display for MutexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contended { key } => write!(f, "mutex contended: {key}"),
            Self::Backend { message } => write!(f, "mutex backend error: {message}"),
        }
    }
}

impl std::error::Error for MutexError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    Publish { message: String },
    Subscribe { message: String },
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Publish { message } => write!(f, "task publish failed: {message}"),
            Self::Subscribe { message } => write!(f, "task subscribe failed: {message}"),
        }
    }
}

impl std::error::Error for BusError {}
