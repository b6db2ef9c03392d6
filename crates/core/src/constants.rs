//! Constants shared across the core crate.

/// Partitions per topic when `CLINICALFLOW_PARTITIONS` is unset.
pub const DEFAULT_PARTITIONS: u32 = 3;

/// Producer retries when `CLINICALFLOW_PRODUCER_RETRIES` is unset.
pub const DEFAULT_PRODUCER_RETRIES: u32 = 3;

/// Fraction of the reference range that is added beyond each bound to obtain the panic
/// thresholds.
pub const CRITICAL_RANGE_FRACTION: f64 = 0.5;

// Environment variable names. Read by the binary only; the core never touches process env.
pub const LAB_RESULTS_TOPIC_ENV: &str = "CLINICALFLOW_LAB_RESULTS_TOPIC";
pub const PATIENT_EVENTS_TOPIC_ENV: &str = "CLINICALFLOW_PATIENT_EVENTS_TOPIC";
pub const PARTITIONS_ENV: &str = "CLINICALFLOW_PARTITIONS";
pub const PRODUCER_RETRIES_ENV: &str = "CLINICALFLOW_PRODUCER_RETRIES";
