//! Partition workers.
//!
//! Each assigned partition gets its own tokio task running [`Dispatcher::run_partition`].
//! Within a partition, records are handled strictly in offset order and each one is committed
//! after its action has been emitted, so a patient's events reach the sink in the order they
//! were published. Partitions run concurrently and have no ordering between them.
//!
//! A record that cannot be decoded is logged and committed; it must not block the partition.
//! A record whose action the sink refused stays uncommitted and is emitted again after a
//! backoff, for as long as it takes. Only the shutdown signal stops a worker; if it arrives
//! while the sink is still refusing, the record is left for the next consumer of the partition.

use crate::router::{route, AlertAction, RoutingPolicy};
use crate::sink::AlertSink;
use crate::{NotifyConfig, NotifyResult};
use clinicalflow_bus::{DeliveredRecord, InMemoryBus, PartitionConsumer};
use clinicalflow_events::{decode, DecodeFailure, DecodedBody};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Pause between attempts to emit an action the sink refused.
pub const DEFAULT_SINK_RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Counters for one partition worker, returned when it stops.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub topic: String,
    pub partition: u32,
    pub emitted: u64,
    pub rejected: u64,
    /// Emit attempts the sink refused.
    pub sink_failures: u64,
    /// Offset of the last record committed by this worker.
    pub last_committed: Option<u64>,
    /// Offset of a record still being retried when shutdown arrived.
    pub left_uncommitted: Option<u64>,
}

#[derive(Clone)]
pub struct Dispatcher {
    sink: Arc<dyn AlertSink>,
    policy: RoutingPolicy,
    retry_backoff: Duration,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn AlertSink>, policy: RoutingPolicy) -> Self {
        Self {
            sink,
            policy,
            retry_backoff: DEFAULT_SINK_RETRY_BACKOFF,
        }
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    fn route_record(&self, record: &DeliveredRecord) -> Result<AlertAction, DecodeFailure> {
        let event = match decode(&record.payload) {
            Ok(event) => event,
            Err(failure) => {
                tracing::warn!(
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    key = %record.key,
                    error = %failure,
                    "discarding undecodable event"
                );
                return Err(failure);
            }
        };

        if let DecodedBody::LabResult(fields) = &event.body {
            if !fields.discarded.is_empty() {
                tracing::warn!(
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    discarded = ?fields.discarded,
                    "routing critical result with unreadable fields"
                );
            }
        }

        let action = route(&event, &self.policy);
        tracing::debug!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            event_type = event.event_type_name(),
            severity = ?action.severity(),
            "event routed"
        );
        Ok(action)
    }

    /// Emits `action` until the sink accepts it. Returns false if shutdown was signalled
    /// while the sink was still refusing.
    async fn emit_until_accepted(
        &self,
        action: &AlertAction,
        record: &DeliveredRecord,
        shutdown: &mut watch::Receiver<bool>,
        report: &mut WorkerReport,
    ) -> bool {
        loop {
            let error = match self.sink.emit(action).await {
                Ok(()) => return true,
                Err(e) => e,
            };
            report.sink_failures += 1;
            tracing::error!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                error = %error,
                retry_in_ms = self.retry_backoff.as_millis() as u64,
                "alert sink failed; record stays uncommitted"
            );

            if *shutdown.borrow() {
                return false;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return false;
                    }
                }
                () = tokio::time::sleep(self.retry_backoff) => {}
            }
        }
    }

    /// Consumes one partition until `shutdown` turns true (or its sender is dropped).
    ///
    /// Shutdown is only observed between records and between emit retries: a record the sink
    /// accepts is always committed before the worker returns.
    pub async fn run_partition(
        &self,
        mut consumer: PartitionConsumer,
        mut shutdown: watch::Receiver<bool>,
    ) -> WorkerReport {
        let mut report = WorkerReport {
            topic: consumer.topic().to_string(),
            partition: consumer.partition(),
            ..WorkerReport::default()
        };
        tracing::info!(
            group = consumer.group(),
            topic = %report.topic,
            partition = report.partition,
            position = consumer.position(),
            "partition worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            let record = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                record = consumer.recv() => record,
            };

            match self.route_record(&record) {
                Ok(action) => {
                    let accepted = self
                        .emit_until_accepted(&action, &record, &mut shutdown, &mut report)
                        .await;
                    if !accepted {
                        report.left_uncommitted = Some(record.offset);
                        break;
                    }
                    report.emitted += 1;
                }
                Err(_) => report.rejected += 1,
            }
            consumer.commit(&record);
            report.last_committed = Some(record.offset);
        }

        tracing::info!(
            topic = %report.topic,
            partition = report.partition,
            emitted = report.emitted,
            rejected = report.rejected,
            sink_failures = report.sink_failures,
            "partition worker stopped"
        );
        report
    }
}

/// Running partition workers for both event channels.
pub struct NotificationWorkers {
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<WorkerReport>>,
}

impl NotificationWorkers {
    /// Joins the configured consumer group on both topics and starts one worker per partition.
    ///
    /// # Errors
    ///
    /// Returns [`crate::NotifyError::Bus`] if a topic does not exist or a partition is already
    /// taken in the group.
    pub fn start(
        bus: &InMemoryBus,
        cfg: &NotifyConfig,
        sink: Arc<dyn AlertSink>,
    ) -> NotifyResult<Self> {
        let dispatcher = Dispatcher::new(
            sink,
            RoutingPolicy {
                critical_notify_within: cfg.critical_notify_within,
            },
        )
        .with_retry_backoff(cfg.sink_retry_backoff);

        let mut consumers = bus.subscribe(&cfg.consumer_group, &cfg.topics.lab_results)?;
        consumers.extend(bus.subscribe(&cfg.consumer_group, &cfg.topics.patient_events)?);

        let (shutdown, signal) = watch::channel(false);
        let workers = consumers
            .into_iter()
            .map(|consumer| {
                let dispatcher = dispatcher.clone();
                let signal = signal.clone();
                tokio::spawn(async move { dispatcher.run_partition(consumer, signal).await })
            })
            .collect::<Vec<_>>();

        tracing::info!(
            group = %cfg.consumer_group,
            workers = workers.len(),
            "notification workers started"
        );
        Ok(Self { shutdown, workers })
    }

    /// Signals every worker to stop after its current record and waits for them.
    ///
    /// A worker whose sink is refusing stops at its next retry and leaves that record
    /// uncommitted.
    pub async fn shutdown(self) -> Vec<WorkerReport> {
        let _ = self.shutdown.send(true);
        let mut reports = Vec::with_capacity(self.workers.len());
        for worker in self.workers {
            match worker.await {
                Ok(report) => reports.push(report),
                Err(e) => tracing::error!(error = %e, "partition worker failed"),
            }
        }
        reports
    }
}
