//! In-process implementation of the substrate.
//!
//! Topics are split into a fixed number of append-only partition logs. Each partition keeps a
//! high-water mark in a `tokio::sync::watch` channel so idle consumers park until something is
//! appended, and a table of consumer-group cursors holding the committed offset and whether a
//! consumer currently owns the partition for that group.

use crate::partition::partition_for_key;
use crate::{BusError, Delivery, EventTransport, OutboundRecord, TransportError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::watch;

/// Producer behaviour of an [`InMemoryBus`].
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Additional attempts after the first failed append.
    pub producer_retries: u32,
    /// Pause between attempts.
    pub retry_backoff: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            producer_retries: 3,
            retry_backoff: Duration::from_millis(50),
        }
    }
}

/// A record handed to a consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveredRecord {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub key: String,
    pub payload: Vec<u8>,
}

#[derive(Clone)]
struct StoredRecord {
    key: String,
    payload: Vec<u8>,
}

#[derive(Default)]
struct GroupCursor {
    committed: u64,
    assigned: bool,
}

struct Partition {
    index: u32,
    log: Mutex<Vec<StoredRecord>>,
    high_water: watch::Sender<u64>,
    groups: Mutex<HashMap<String, GroupCursor>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Partition {
    fn new(index: u32) -> Self {
        let (high_water, _) = watch::channel(0);
        Self {
            index,
            log: Mutex::new(Vec::new()),
            high_water,
            groups: Mutex::new(HashMap::new()),
        }
    }

    fn append(&self, key: String, payload: Vec<u8>) -> u64 {
        let mut log = lock(&self.log);
        let offset = log.len() as u64;
        log.push(StoredRecord { key, payload });
        // Published while the log lock is held so the mark never runs ahead of the log.
        self.high_water.send_replace(offset + 1);
        offset
    }

    fn read(&self, offset: u64) -> Option<StoredRecord> {
        lock(&self.log).get(offset as usize).cloned()
    }

    fn end_offset(&self) -> u64 {
        lock(&self.log).len() as u64
    }
}

struct Topic {
    partitions: Vec<Arc<Partition>>,
}

struct BusInner {
    config: BusConfig,
    topics: RwLock<HashMap<String, Arc<Topic>>>,
    pending_failures: AtomicU32,
}

/// Partitioned, keyed, at-least-once pub/sub held in memory.
///
/// Cloning shares the same topics.
#[derive(Clone)]
pub struct InMemoryBus {
    inner: Arc<BusInner>,
}

impl InMemoryBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                config,
                topics: RwLock::new(HashMap::new()),
                pending_failures: AtomicU32::new(0),
            }),
        }
    }

    /// Creates `name` with `partitions` partitions.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NoPartitions`] for a zero partition count and
    /// [`BusError::TopicExists`] if the topic was already created.
    pub fn create_topic(&self, name: &str, partitions: u32) -> Result<(), BusError> {
        if partitions == 0 {
            return Err(BusError::NoPartitions(name.to_owned()));
        }
        let mut topics = self
            .inner
            .topics
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if topics.contains_key(name) {
            return Err(BusError::TopicExists(name.to_owned()));
        }
        let topic = Topic {
            partitions: (0..partitions).map(|i| Arc::new(Partition::new(i))).collect(),
        };
        topics.insert(name.to_owned(), Arc::new(topic));
        tracing::debug!(topic = name, partitions, "topic created");
        Ok(())
    }

    pub fn partition_count(&self, topic: &str) -> Option<u32> {
        self.topic(topic).map(|t| t.partitions.len() as u32)
    }

    /// Makes the next `attempts` append attempts fail as if the substrate were unreachable.
    pub fn fail_next_sends(&self, attempts: u32) {
        self.inner.pending_failures.store(attempts, Ordering::SeqCst);
    }

    /// Number of records appended to a partition so far.
    pub fn end_offset(&self, topic: &str, partition: u32) -> Option<u64> {
        self.partition(topic, partition)
            .ok()
            .map(|p| p.end_offset())
    }

    /// Offset the group will resume from on `topic`/`partition`.
    pub fn committed_offset(&self, group: &str, topic: &str, partition: u32) -> Option<u64> {
        let partition = self.partition(topic, partition).ok()?;
        let groups = lock(&partition.groups);
        groups.get(group).map(|cursor| cursor.committed)
    }

    /// Takes every partition of `topic` for `group`.
    ///
    /// # Errors
    ///
    /// Fails if the topic is unknown or any partition already has a consumer in the group.
    /// Partitions claimed before the failure are released again.
    pub fn subscribe(&self, group: &str, topic: &str) -> Result<Vec<PartitionConsumer>, BusError> {
        let count = self
            .partition_count(topic)
            .ok_or_else(|| BusError::UnknownTopic(topic.to_owned()))?;
        (0..count).map(|p| self.assign(group, topic, p)).collect()
    }

    /// Takes one partition of `topic` for `group`, positioned at the group's committed offset.
    pub fn assign(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
    ) -> Result<PartitionConsumer, BusError> {
        let shared = self.partition(topic, partition)?;
        let position = {
            let mut groups = lock(&shared.groups);
            let cursor = groups.entry(group.to_owned()).or_default();
            if cursor.assigned {
                return Err(BusError::AlreadyAssigned {
                    group: group.to_owned(),
                    topic: topic.to_owned(),
                    partition,
                });
            }
            cursor.assigned = true;
            cursor.committed
        };
        tracing::debug!(group, topic, partition, position, "partition assigned");
        let high_water = shared.high_water.subscribe();
        Ok(PartitionConsumer {
            group: group.to_owned(),
            topic: topic.to_owned(),
            partition: shared,
            position,
            high_water,
        })
    }

    fn topic(&self, name: &str) -> Option<Arc<Topic>> {
        self.inner
            .topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn partition(&self, topic: &str, partition: u32) -> Result<Arc<Partition>, BusError> {
        let t = self
            .topic(topic)
            .ok_or_else(|| BusError::UnknownTopic(topic.to_owned()))?;
        t.partitions
            .get(partition as usize)
            .cloned()
            .ok_or_else(|| BusError::UnknownPartition {
                topic: topic.to_owned(),
                partition,
            })
    }

    fn take_injected_failure(&self) -> bool {
        self.inner
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

#[async_trait]
impl EventTransport for InMemoryBus {
    async fn send(&self, record: OutboundRecord) -> Result<Delivery, TransportError> {
        let topic = self
            .topic(&record.topic)
            .ok_or_else(|| TransportError::UnknownTopic(record.topic.clone()))?;
        let index = partition_for_key(&record.key, topic.partitions.len() as u32);
        let partition = &topic.partitions[index as usize];

        let max_attempts = self.inner.config.producer_retries.saturating_add(1);
        let mut attempts = 0;
        loop {
            attempts += 1;
            if !self.take_injected_failure() {
                let offset = partition.append(record.key, record.payload);
                return Ok(Delivery {
                    topic: record.topic,
                    partition: partition.index,
                    offset,
                });
            }
            if attempts >= max_attempts {
                return Err(TransportError::Unavailable {
                    topic: record.topic,
                    attempts,
                });
            }
            tracing::debug!(topic = %record.topic, attempts, "append failed, retrying");
            tokio::time::sleep(self.inner.config.retry_backoff).await;
        }
    }
}

/// Exclusive reader of one partition on behalf of a consumer group.
///
/// Dropping the consumer releases the partition. The next consumer assigned to it in the
/// same group starts from the last committed offset, so anything read but not committed is
/// delivered again.
pub struct PartitionConsumer {
    group: String,
    topic: String,
    partition: Arc<Partition>,
    position: u64,
    high_water: watch::Receiver<u64>,
}

impl PartitionConsumer {
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> u32 {
        self.partition.index
    }

    /// Offset of the next record this consumer will read.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Next record in partition order, waiting for one to be appended if necessary.
    pub async fn recv(&mut self) -> DeliveredRecord {
        loop {
            if let Some(record) = self.try_recv() {
                return record;
            }
            if self.high_water.changed().await.is_err() {
                // The bus is gone; nothing can be appended any more.
                std::future::pending::<()>().await;
            }
        }
    }

    /// Next record if one is already available.
    pub fn try_recv(&mut self) -> Option<DeliveredRecord> {
        let stored = self.partition.read(self.position)?;
        let offset = self.position;
        self.position += 1;
        Some(DeliveredRecord {
            topic: self.topic.clone(),
            partition: self.partition.index,
            offset,
            key: stored.key,
            payload: stored.payload,
        })
    }

    /// Marks `record` and everything before it as processed for the group.
    pub fn commit(&self, record: &DeliveredRecord) {
        let mut groups = lock(&self.partition.groups);
        let cursor = groups.entry(self.group.clone()).or_default();
        cursor.committed = cursor.committed.max(record.offset + 1);
    }
}

impl Drop for PartitionConsumer {
    fn drop(&mut self) {
        let mut groups = lock(&self.partition.groups);
        if let Some(cursor) = groups.get_mut(&self.group) {
            cursor.assigned = false;
        }
    }
}
