//! Thin orchestration over the runtime, repository, and sync plane (§4.D).
//!
//! `ControllerService` is the only component that touches the other three
//! at once: it admits flows (`run_flow`), answers status queries, and
//! implements the three sync-plane task handlers that all follow the same
//! lock-load-rebuild-mutate-step-save sequence over the run mutex.

pub mod error;
pub mod service;

pub use error::ControllerError;
pub use service::{ControllerService, RUN_MUTEX_TTL};
