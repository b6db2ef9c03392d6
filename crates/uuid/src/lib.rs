//! Identifier and time sources.
//!
//! ClinicalFlow identifies patients, lab results and events with random (v4) UUIDs. To keep
//! partition keys and log output consistent, every identifier uses one *canonical* text form:
//! **lowercase, hyphenated, 36 characters** (the RFC 4122 text form).
//!
//! This crate provides:
//! - [`CanonicalUuid`], a wrapper that guarantees the canonical form once constructed, and the
//!   typed identifiers built on it ([`PatientId`], [`ResultId`], [`EventId`]).
//! - The identity/time collaborators consumed by the core services: [`IdGenerator`] and
//!   [`Clock`], with production implementations ([`RandomIds`], [`MonotonicClock`]) and a
//!   deterministic [`FixedClock`] for tests and replays.
//!
//! ## Canonical UUID form
//! - Length: 36
//! - Characters: `0-9`, `a-f` and `-` at positions 8, 13, 18 and 23
//! - Example: `550e8400-e29b-41d4-a716-446655440000`
//!
//! Externally supplied identifiers must already be canonical; uppercase or unhyphenated input
//! is rejected rather than normalised, so a patient key always stringifies the same way.

mod ids;
mod source;

pub use ids::{CanonicalUuid, EventId, PatientId, ResultId, Uuid};
pub use source::{Clock, FixedClock, IdGenerator, MonotonicClock, RandomIds};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum IdError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type IdResult<T> = Result<T, IdError>;
