//! Container-based node executor (§4.E): resolves a node's I/O, expands its
//! command template, runs its image in a container under its tier's
//! resource limits, and reports the outcome onto the sync plane.
//!
//! - **I/O** (`io`): resolves declared inputs/outputs to host paths,
//!   sniffing and validating input mime types along the way.
//! - **Command** (`command`): substitutes flag/path values into a node
//!   def's command template and splits it into argv.
//! - **Container** (`container`): image presence, container create/start/
//!   wait/remove, parallel input staging and output upload, log collection.
//! - **Executor** (`executor`): the `node:execute` handler tying the above
//!   together with resource reservation and the sync plane.

pub mod command;
pub mod container;
pub mod error;
pub mod executor;
pub mod io;

pub use error::WorkerError;
pub use executor::{advertise_resources, execute};
pub use io::ResolvedPath;
