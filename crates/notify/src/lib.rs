//! # ClinicalFlow Notify
//!
//! The consuming side of the pipeline: turns delivered events into alert actions.
//!
//! - [`router`]: pure decision from a decoded event to an [`AlertAction`]
//! - [`sink`]: where actions go ([`TracingAlertSink`] in hosts, [`ChannelAlertSink`] in tests)
//! - [`dispatcher`]: one worker per partition, decode, route, emit, commit
//! - [`config`]: consumer group and alert window, resolved once at startup

pub mod config;
pub mod dispatcher;
pub mod router;
pub mod sink;

pub use config::NotifyConfig;
pub use dispatcher::{Dispatcher, NotificationWorkers, WorkerReport};
pub use router::{route, AlertAction, PatientSummary, ResultSummary, RoutingPolicy, Severity};
pub use sink::{AlertSink, ChannelAlertSink, TracingAlertSink};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("subscription failed: {0}")]
    Bus(#[from] clinicalflow_bus::BusError),

    #[error("alert sink is closed")]
    SinkClosed,
}

pub type NotifyResult<T> = std::result::Result<T, NotifyError>;
