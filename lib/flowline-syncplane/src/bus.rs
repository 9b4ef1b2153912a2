//! The typed task bus: publishes `Task`s onto a named queue, each wrapped
//! in an `Envelope` the way `NatsEventStore` wraps `ExecutionEvent`.

use async_nats::jetstream;
use async_trait::async_trait;
use flowline_core::Envelope;

use crate::error::BusError;
use crate::task::Task;

const SUBJECT_PREFIX: &str = "flowline.tasks";
const STREAM_NAME: &str = "FLOWLINE_TASKS";

#[async_trait]
pub trait TaskBus: Send + Sync {
    /// Publishes `task` onto the queue its kind routes to (`Task::queue`).
    async fn publish(&self, task: Task) -> Result<(), BusError>;

    /// Pulls the next task from `queue`, if any, without blocking.
    async fn poll(&self, queue: &str) -> Result<Option<Task>, BusError>;
}

/// An in-process task bus for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryTaskBus {
    queues: dashmap::DashMap<String, std::collections::VecDeque<Task>>,
}

impl InMemoryTaskBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskBus for InMemoryTaskBus {
    async fn publish(&self, task: Task) -> Result<(), BusError> {
        self.queues.entry(task.queue()).or_default().push_back(task);
        Ok(())
    }

    async fn poll(&self, queue: &str) -> Result<Option<Task>, BusError> {
        Ok(self.queues.get_mut(queue).and_then(|mut q| q.pop_front()))
    }
}

/// A JetStream work-queue-backed task bus. Each queue is a subject under
/// `flowline.tasks.<queue>`, all carried by one `WorkQueue`-retention
/// stream so a task is delivered to exactly one consumer.
pub struct NatsTaskBus {
    jetstream: jetstream::Context,
}

impl NatsTaskBus {
    /// Ensures the work-queue stream exists and returns a bus over it.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be created.
    pub async fn new(jetstream: jetstream::Context) -> Result<Self, BusError> {
        jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: STREAM_NAME.to_string(),
                subjects: vec![format!("{SUBJECT_PREFIX}.>")],
                storage: jetstream::stream::StorageType::File,
                retention: jetstream::stream::RetentionPolicy::WorkQueue,
                ..Default::default()
            })
            .await
            .map_err(|e| BusError::Publish { message: format!("failed to create task stream: {e}") })?;

        Ok(Self { jetstream })
    }

    fn subject(queue: &str) -> String {
        format!("{SUBJECT_PREFIX}.{queue}")
    }
}

#[async_trait]
impl TaskBus for NatsTaskBus {
    async fn publish(&self, task: Task) -> Result<(), BusError> {
        let subject = Self::subject(&task.queue());
        let bytes = Envelope::new(task)
            .to_json_bytes()
            .map_err(|e| BusError::Publish { message: format!("failed to serialize task: {e}") })?;

        self.jetstream
            .publish(subject, bytes.into())
            .await
            .map_err(|e| BusError::Publish { message: e.to_string() })?
            .await
            .map_err(|e| BusError::Publish { message: e.to_string() })?;
        Ok(())
    }

    async fn poll(&self, queue: &str) -> Result<Option<Task>, BusError> {
        use futures::StreamExt;

        let stream = self
            .jetstream
            .get_stream(STREAM_NAME)
            .await
            .map_err(|e| BusError::Subscribe { message: e.to_string() })?;

        let consumer = stream
            .create_consumer(jetstream::consumer::pull::Config {
                filter_subject: Self::subject(queue),
                deliver_policy: jetstream::consumer::DeliverPolicy::All,
                ..Default::default()
            })
            .await
            .map_err(|e| BusError::Subscribe { message: e.to_string() })?;

        let mut messages = consumer
            .messages()
            .await
            .map_err(|e| BusError::Subscribe { message: e.to_string() })?;

        let Ok(Some(message)) =
            tokio::time::timeout(std::time::Duration::from_millis(100), messages.next()).await
        else {
            return Ok(None);
        };
        let message = message.map_err(|e| BusError::Subscribe { message: e.to_string() })?;

        let envelope: Envelope<Task> = Envelope::from_json_bytes(&message.payload)
            .map_err(|e| BusError::Subscribe { message: format!("failed to decode task: {e}") })?;

        message
            .ack()
            .await
            .map_err(|e| BusError::Subscribe { message: format!("failed to ack task: {e}") })?;

        Ok(Some(envelope.into_payload()))
    }
}
