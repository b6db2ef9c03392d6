//! Fire-and-forget event publishing.
//!
//! [`EventPublisher::publish`] encodes the envelope, puts it on an unbounded queue and returns
//! straight away. A single background task drains the queue and sends one record at a time,
//! so the transport sees records in the order they were published and records for the same
//! patient keep their relative order on their partition.
//!
//! The outcome of each send is logged by the background task. Callers that care (tests, the
//! CLI) can await the returned [`PublishReceipt`]; everyone else drops it.

use clinicalflow_bus::{Delivery, EventTransport, OutboundRecord, TransportError};
use clinicalflow_events::{encode, EventEnvelope, EventType, TopicNames};
use clinicalflow_uuid::EventId;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Why a published event did not reach the substrate.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PublishFailure {
    #[error("failed to encode event {event_id}: {message}")]
    Encode { event_id: EventId, message: String },

    #[error("failed to send event {event_id}: {source}")]
    Transport {
        event_id: EventId,
        #[source]
        source: TransportError,
    },

    #[error("publisher stopped before event {event_id} was sent")]
    Closed { event_id: EventId },
}

/// Resolves once the background task has tried to send the event.
#[derive(Debug)]
pub struct PublishReceipt {
    event_id: EventId,
    outcome: oneshot::Receiver<Result<Delivery, PublishFailure>>,
}

impl PublishReceipt {
    fn resolved(event_id: EventId, result: Result<Delivery, PublishFailure>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self {
            event_id,
            outcome: rx,
        }
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    /// Waits for the send to finish.
    pub async fn outcome(self) -> Result<Delivery, PublishFailure> {
        let event_id = self.event_id;
        self.outcome
            .await
            .unwrap_or(Err(PublishFailure::Closed { event_id }))
    }
}

struct SendJob {
    event_id: EventId,
    event_type: EventType,
    record: OutboundRecord,
    done: oneshot::Sender<Result<Delivery, PublishFailure>>,
}

/// Handle used by the services to publish envelopes. Cheap to clone.
///
/// The background task ends once every handle has been dropped and the queue is drained, so a
/// host can flush outstanding events by dropping its services and awaiting the join handle.
#[derive(Clone, Debug)]
pub struct EventPublisher {
    topics: Arc<TopicNames>,
    queue: mpsc::UnboundedSender<SendJob>,
}

impl std::fmt::Debug for SendJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendJob")
            .field("event_id", &self.event_id)
            .field("topic", &self.record.topic)
            .finish()
    }
}

impl EventPublisher {
    /// Starts the sender task on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(
        transport: Arc<dyn EventTransport>,
        topics: TopicNames,
    ) -> (Self, JoinHandle<()>) {
        let (queue, jobs) = mpsc::unbounded_channel();
        let handle = tokio::spawn(drain(transport, jobs));
        let publisher = Self {
            topics: Arc::new(topics),
            queue,
        };
        (publisher, handle)
    }

    pub fn topics(&self) -> &TopicNames {
        &self.topics
    }

    /// Queues `envelope` for sending on its channel's topic, keyed by patient id.
    ///
    /// Never blocks and never fails synchronously; problems surface through the receipt and
    /// the log.
    pub fn publish(&self, envelope: EventEnvelope) -> PublishReceipt {
        let event_id = envelope.event_id();
        let event_type = envelope.event_type();

        let payload = match encode(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(
                    event_id = %event_id,
                    event_type = %event_type,
                    error = %e,
                    "failed to encode event"
                );
                return PublishReceipt::resolved(
                    event_id,
                    Err(PublishFailure::Encode {
                        event_id,
                        message: e.to_string(),
                    }),
                );
            }
        };

        let record = OutboundRecord {
            topic: self.topics.for_channel(envelope.channel()).to_owned(),
            key: envelope.partition_key(),
            payload,
        };

        let (done, outcome) = oneshot::channel();
        let job = SendJob {
            event_id,
            event_type,
            record,
            done,
        };
        if self.queue.send(job).is_err() {
            tracing::error!(
                event_id = %event_id,
                event_type = %event_type,
                "publisher task is not running; event dropped"
            );
            return PublishReceipt::resolved(event_id, Err(PublishFailure::Closed { event_id }));
        }

        PublishReceipt { event_id, outcome }
    }
}

async fn drain(transport: Arc<dyn EventTransport>, mut jobs: mpsc::UnboundedReceiver<SendJob>) {
    while let Some(job) = jobs.recv().await {
        let SendJob {
            event_id,
            event_type,
            record,
            done,
        } = job;
        let key = record.key.clone();

        let outcome = match transport.send(record).await {
            Ok(delivery) => {
                tracing::info!(
                    event_id = %event_id,
                    event_type = %event_type,
                    patient_id = %key,
                    topic = %delivery.topic,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    "event published"
                );
                Ok(delivery)
            }
            Err(source) => {
                tracing::error!(
                    event_id = %event_id,
                    event_type = %event_type,
                    patient_id = %key,
                    error = %source,
                    "failed to publish event"
                );
                Err(PublishFailure::Transport { event_id, source })
            }
        };

        // Nobody is obliged to keep the receipt.
        let _ = done.send(outcome);
    }
    tracing::debug!("publisher queue closed");
}
