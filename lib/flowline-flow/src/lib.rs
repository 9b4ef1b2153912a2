//! Flow execution engine core: the static flow/node/edge data model,
//! admission-time validation, and the `RuntimeFlow` step function.
//!
//! - **Data model**: `Flow`, `Node`, `NodeDef`, `StoreBinding`, `DataWell`
//! - **Validation**: `validate()` against the rules in §4.D.v
//! - **Runtime**: `RuntimeFlow`, the materialized, steppable flow state

pub mod artifact;
pub mod error;
pub mod flow;
pub mod mime;
pub mod node;
pub mod runtime;
pub mod state;
pub mod store;
pub mod well;

pub use artifact::{Artifact, WaitingUrl};
pub use error::{RuntimeError, ValidationError, ValidationResult};
pub use flow::{Flow, validate};
pub use mime::MimeSet;
pub use node::{Command, FlagDef, Node, NodeDef, NodeId, PortBinding, PortDef, find_def};
pub use runtime::{NodeExecuteTask, RuntimeFlow, StepOutcome};
pub use state::{FlowRun, FlowRunStatus, NodeRunStatus, NodeState};
pub use store::{InMemoryStore, InMemoryStoreFactory, ObjectStore, ObjectStoreFactory, StoreBinding, StoreError};
pub use well::{DataWell, DataWellSource, DefaultDataWell};
