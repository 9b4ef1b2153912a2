//! Distributed coordination for the flowline engine: a typed task bus, a
//! distributed mutex, leader election, and the active-runs set the leader's
//! periodic dispatcher walks.
//!
//! - **Task bus** (`bus`, `task`): the four task kinds and their queues.
//! - **Mutex** (`mutex`): per-run and leader-election locking.
//! - **Leader election** (`leader`): exactly one dispatching process.
//! - **Active runs** (`active_runs`): which runs the leader steps.
//! - **Queue subscription** (`subscription`): a worker's polled queue set.
//! - **Scheduler** (`scheduler`): the leader's periodic dispatch loop.

pub mod active_runs;
pub mod bus;
pub mod error;
pub mod leader;
pub mod mutex;
pub mod scheduler;
pub mod subscription;
pub mod task;

pub use active_runs::{ActiveRuns, InMemoryActiveRuns, NatsActiveRuns};
pub use bus::{InMemoryTaskBus, NatsTaskBus, TaskBus};
pub use error::{BusError, MutexError};
pub use mutex::{DistributedMutex, InMemoryMutex, NatsMutex};
pub use scheduler::{DEFAULT_SCHEDULER_ELECTION_INTERVAL, DEFAULT_SYNC_INTERVAL};
pub use subscription::QueueSubscription;
pub use task::{CONTROLLER_QUEUE, FlowStepTask, NodeExecuteTask, NodeFailedTask, NodeFinishedTask, Task, WORKER_QUEUE_PRIORITY};
