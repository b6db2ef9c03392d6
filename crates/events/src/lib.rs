//! Event envelopes and their wire format.
//!
//! This crate provides the **event model** published when a lab result is reported or a
//! patient changes status, and the **wire translation** used on the pub/sub substrate:
//! - [`EventEnvelope`]: immutable, typed event built by the producing services
//! - [`wire::encode`]: envelope to JSON bytes (camelCase keys)
//! - [`wire::decode`]: JSON bytes to a typed [`DecodedEvent`], tolerant of absent fields
//!
//! The decoder is deliberately lenient where the producer is strict: the substrate gives no
//! schema guarantee, so absent fields decode as unknown and extra keys are ignored. What it
//! does not tolerate is an event with no `eventType`, or a present field of the wrong JSON
//! type; both yield a [`DecodeFailure`] naming the offending path.

pub mod envelope;
pub mod topics;
pub mod wire;

pub use envelope::{EventEnvelope, EventPayload, EventType, LabResultPayload, PatientPayload};
pub use topics::{Channel, TopicNames};
pub use wire::{decode, encode, DecodedBody, DecodedEvent, LabResultFields, PatientFields};

/// Reasons a delivered payload could not be turned into a [`DecodedEvent`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeFailure {
    #[error("malformed event at {path}: {message}")]
    Malformed { path: String, message: String },

    #[error("event is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value for `{field}`: {message}")]
    InvalidField { field: &'static str, message: String },
}

/// Errors raised while rendering an envelope to its wire form.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("failed to serialise event: {0}")]
    Serialization(#[from] serde_json::Error),
}
