//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Nothing here reads process-wide environment variables; the
//! binary reads them and hands the raw values to the `*_from_env_value` helpers, so tests can
//! exercise every path without touching the environment.

use crate::constants::{DEFAULT_PARTITIONS, DEFAULT_PRODUCER_RETRIES};
use crate::{CoreError, CoreResult};
use clinicalflow_events::topics::{DEFAULT_LAB_RESULTS_TOPIC, DEFAULT_PATIENT_EVENTS_TOPIC};
use clinicalflow_events::TopicNames;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    topics: TopicNames,
    partitions: u32,
    producer_retries: u32,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] if either topic name is blank, both channels share a
    /// topic, or the partition count is zero.
    pub fn new(topics: TopicNames, partitions: u32, producer_retries: u32) -> CoreResult<Self> {
        if topics.lab_results.trim().is_empty() || topics.patient_events.trim().is_empty() {
            return Err(CoreError::Config("topic names cannot be empty".into()));
        }
        if topics.lab_results == topics.patient_events {
            return Err(CoreError::Config(format!(
                "lab results and patient events cannot share topic {}",
                topics.lab_results
            )));
        }
        if partitions == 0 {
            return Err(CoreError::Config(
                "partition count must be at least 1".into(),
            ));
        }

        Ok(Self {
            topics,
            partitions,
            producer_retries,
        })
    }

    pub fn topics(&self) -> &TopicNames {
        &self.topics
    }

    pub fn partitions(&self) -> u32 {
        self.partitions
    }

    pub fn producer_retries(&self) -> u32 {
        self.producer_retries
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            topics: TopicNames::default(),
            partitions: DEFAULT_PARTITIONS,
            producer_retries: DEFAULT_PRODUCER_RETRIES,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_count(name: &str, value: Option<String>, default: u32) -> CoreResult<u32> {
    match non_blank(value) {
        None => Ok(default),
        Some(v) => v
            .parse::<u32>()
            .map_err(|e| CoreError::Config(format!("{name} must be a non-negative integer: {e}"))),
    }
}

/// Lab results topic from an optional string value, defaulting to `lab.results`.
pub fn lab_results_topic_from_env_value(value: Option<String>) -> String {
    non_blank(value).unwrap_or_else(|| DEFAULT_LAB_RESULTS_TOPIC.to_string())
}

/// Patient events topic from an optional string value, defaulting to `patient.events`.
pub fn patient_events_topic_from_env_value(value: Option<String>) -> String {
    non_blank(value).unwrap_or_else(|| DEFAULT_PATIENT_EVENTS_TOPIC.to_string())
}

/// Parse the partition count from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns the default of 3.
pub fn partitions_from_env_value(value: Option<String>) -> CoreResult<u32> {
    let partitions = parse_count("partitions", value, DEFAULT_PARTITIONS)?;
    if partitions == 0 {
        return Err(CoreError::Config(
            "partition count must be at least 1".into(),
        ));
    }
    Ok(partitions)
}

/// Parse the producer retry budget from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns the default of 3.
pub fn producer_retries_from_env_value(value: Option<String>) -> CoreResult<u32> {
    parse_count("producer retries", value, DEFAULT_PRODUCER_RETRIES)
}
