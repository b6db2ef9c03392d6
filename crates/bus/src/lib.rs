//! # ClinicalFlow Bus
//!
//! The pub/sub substrate between the producing services and the notification workers.
//!
//! Contains:
//! - [`EventTransport`], the seam the publisher sends through
//! - [`InMemoryBus`], a partitioned, keyed, at-least-once substrate for hosts and tests
//! - [`partition_for_key`], the stable key-to-partition mapping
//!
//! Guarantees offered by [`InMemoryBus`]:
//! - records with the same key always land on the same partition
//! - a partition's records are delivered in append order
//! - a partition is consumed by at most one consumer per group at a time
//! - records are redelivered from the group's committed offset until committed
//!
//! There is no ordering across partitions.

#![warn(rust_2018_idioms)]

pub mod memory;
pub mod partition;

pub use memory::{BusConfig, DeliveredRecord, InMemoryBus, PartitionConsumer};
pub use partition::partition_for_key;

use async_trait::async_trait;
use std::fmt;

/// A record ready to be appended to a topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundRecord {
    pub topic: String,
    /// Partitioning key. Records sharing a key keep their relative order.
    pub key: String,
    pub payload: Vec<u8>,
}

/// Where an appended record ended up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
}

impl fmt::Display for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.topic, self.partition, self.offset)
    }
}

/// Producer-side failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("substrate unavailable for topic {topic} after {attempts} attempt(s)")]
    Unavailable { topic: String, attempts: u32 },
}

/// Topic administration and subscription failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("topic already exists: {0}")]
    TopicExists(String),

    #[error("topic {0} must have at least one partition")]
    NoPartitions(String),

    #[error("partition {topic}/{partition} does not exist")]
    UnknownPartition { topic: String, partition: u32 },

    #[error("partition {topic}/{partition} is already assigned in group {group}")]
    AlreadyAssigned {
        group: String,
        topic: String,
        partition: u32,
    },
}

/// Asynchronous send of one record.
///
/// Implementations own any retry policy. Callers get the final outcome only.
#[async_trait]
pub trait EventTransport: Send + Sync {
    async fn send(&self, record: OutboundRecord) -> Result<Delivery, TransportError>;
}
