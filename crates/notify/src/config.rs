//! Notification worker configuration.
//!
//! Resolved once at startup; the `*_from_env_value` helpers take raw values so nothing here
//! reads process env.

use crate::dispatcher::DEFAULT_SINK_RETRY_BACKOFF;
use crate::{NotifyError, NotifyResult};
use clinicalflow_events::TopicNames;
use std::time::Duration;

pub const DEFAULT_CONSUMER_GROUP: &str = "notification-service";

/// Window within which the ordering clinician must be told about a panic value.
pub const DEFAULT_CRITICAL_NOTIFY_MINUTES: u64 = 30;

/// Longest accepted panic alert window: one week.
pub const MAX_CRITICAL_NOTIFY_MINUTES: u64 = 7 * 24 * 60;

pub const CONSUMER_GROUP_ENV: &str = "CLINICALFLOW_CONSUMER_GROUP";
pub const CRITICAL_NOTIFY_MINUTES_ENV: &str = "CLINICALFLOW_CRITICAL_NOTIFY_MINUTES";

#[derive(Clone, Debug)]
pub struct NotifyConfig {
    pub consumer_group: String,
    pub critical_notify_within: Duration,
    pub topics: TopicNames,
    /// Pause before emitting again an action the sink refused.
    pub sink_retry_backoff: Duration,
}

impl NotifyConfig {
    pub fn new(consumer_group: String, critical_notify_minutes: u64, topics: TopicNames) -> Self {
        Self {
            consumer_group,
            critical_notify_within: Duration::from_secs(critical_notify_minutes.saturating_mul(60)),
            topics,
            sink_retry_backoff: DEFAULT_SINK_RETRY_BACKOFF,
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_CONSUMER_GROUP.to_string(),
            DEFAULT_CRITICAL_NOTIFY_MINUTES,
            TopicNames::default(),
        )
    }
}

/// Consumer group name, defaulting to `notification-service`.
pub fn consumer_group_from_env_value(value: Option<String>) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_CONSUMER_GROUP.to_string())
}

/// Panic alert window in minutes, defaulting to 30.
///
/// # Errors
///
/// Returns [`NotifyError::Config`] for a value that is not a positive integer or that exceeds
/// [`MAX_CRITICAL_NOTIFY_MINUTES`].
pub fn critical_notify_minutes_from_env_value(value: Option<String>) -> NotifyResult<u64> {
    let Some(raw) = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
    else {
        return Ok(DEFAULT_CRITICAL_NOTIFY_MINUTES);
    };

    match raw.parse::<u64>() {
        Ok(0) => Err(NotifyError::Config(
            "critical notification window must be at least one minute".into(),
        )),
        Ok(minutes) if minutes > MAX_CRITICAL_NOTIFY_MINUTES => Err(NotifyError::Config(format!(
            "critical notification window of {minutes} minutes exceeds the \
             {MAX_CRITICAL_NOTIFY_MINUTES} minute limit"
        ))),
        Ok(minutes) => Ok(minutes),
        Err(e) => Err(NotifyError::Config(format!(
            "critical notification window must be a whole number of minutes: {e}"
        ))),
    }
}
