//! The event envelope built by producing services.
//!
//! Responsibilities:
//! - Define the closed set of event types and which channel each travels on
//! - Build envelopes whose event type is derived from the data, never supplied separately
//! - Keep envelopes immutable after construction (private fields, read-only accessors)

use crate::topics::Channel;
use chrono::{DateTime, Utc};
use clinicalflow_types::{Flag, NonEmptyText, PatientStatus};
use clinicalflow_uuid::{EventId, PatientId, ResultId};
use std::fmt;

// ============================================================================
// Event types
// ============================================================================

/// Every event type a producer may emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    ResultReported,
    CriticalResult,
    PatientAdmitted,
    PatientDischarged,
    PatientTransferred,
    PatientRegistered,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResultReported => "RESULT_REPORTED",
            Self::CriticalResult => "CRITICAL_RESULT",
            Self::PatientAdmitted => "PATIENT_ADMITTED",
            Self::PatientDischarged => "PATIENT_DISCHARGED",
            Self::PatientTransferred => "PATIENT_TRANSFERRED",
            Self::PatientRegistered => "PATIENT_REGISTERED",
        }
    }

    /// Parses a wire name. Unknown names are not an error here; the consumer routes them to
    /// its generic handler, so this returns `None` instead.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "RESULT_REPORTED" => Some(Self::ResultReported),
            "CRITICAL_RESULT" => Some(Self::CriticalResult),
            "PATIENT_ADMITTED" => Some(Self::PatientAdmitted),
            "PATIENT_DISCHARGED" => Some(Self::PatientDischarged),
            "PATIENT_TRANSFERRED" => Some(Self::PatientTransferred),
            "PATIENT_REGISTERED" => Some(Self::PatientRegistered),
            _ => None,
        }
    }

    pub fn channel(&self) -> Channel {
        match self {
            Self::ResultReported | Self::CriticalResult => Channel::LabResults,
            Self::PatientAdmitted
            | Self::PatientDischarged
            | Self::PatientTransferred
            | Self::PatientRegistered => Channel::PatientEvents,
        }
    }

    /// Event type for a lab result whose freshly evaluated flag is `flag`.
    pub fn for_flag(flag: Flag) -> Self {
        if flag.is_critical() {
            Self::CriticalResult
        } else {
            Self::ResultReported
        }
    }

    /// Event type announcing that a patient entered `status`.
    pub fn for_patient_status(status: PatientStatus) -> Self {
        match status {
            PatientStatus::Registered => Self::PatientRegistered,
            PatientStatus::Admitted => Self::PatientAdmitted,
            PatientStatus::Discharged => Self::PatientDischarged,
            PatientStatus::Transferred => Self::PatientTransferred,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Fields carried by `RESULT_REPORTED` and `CRITICAL_RESULT`.
#[derive(Clone, Debug, PartialEq)]
pub struct LabResultPayload {
    pub lab_result_id: ResultId,
    pub test_name: NonEmptyText,
    pub value: f64,
    pub unit: NonEmptyText,
    pub flag: Flag,
}

impl LabResultPayload {
    /// The wire `critical` boolean. Always agrees with the flag.
    pub fn critical(&self) -> bool {
        self.flag.is_critical()
    }
}

/// Fields carried by the patient status events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientPayload {
    pub mrn: NonEmptyText,
    pub patient_name: NonEmptyText,
    /// Absent for registration.
    pub previous_status: Option<PatientStatus>,
    pub new_status: PatientStatus,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EventPayload {
    LabResult(LabResultPayload),
    Patient(PatientPayload),
}

// ============================================================================
// Envelope
// ============================================================================

/// One published event.
///
/// Built once per state transition and moved into the publisher; there is no way to change
/// it afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct EventEnvelope {
    event_id: EventId,
    event_type: EventType,
    patient_id: PatientId,
    payload: EventPayload,
    timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    /// Envelope for a reported lab result.
    ///
    /// The event type comes from `payload.flag`: `CRITICAL_RESULT` for a critical flag,
    /// `RESULT_REPORTED` otherwise.
    pub fn lab_result(
        event_id: EventId,
        timestamp: DateTime<Utc>,
        patient_id: PatientId,
        payload: LabResultPayload,
    ) -> Self {
        Self {
            event_id,
            event_type: EventType::for_flag(payload.flag),
            patient_id,
            payload: EventPayload::LabResult(payload),
            timestamp,
        }
    }

    /// Envelope for a patient entering `payload.new_status`.
    pub fn patient_status(
        event_id: EventId,
        timestamp: DateTime<Utc>,
        patient_id: PatientId,
        payload: PatientPayload,
    ) -> Self {
        Self {
            event_id,
            event_type: EventType::for_patient_status(payload.new_status),
            patient_id,
            payload: EventPayload::Patient(payload),
            timestamp,
        }
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn patient_id(&self) -> PatientId {
        self.patient_id
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn channel(&self) -> Channel {
        self.event_type.channel()
    }

    /// Ordering key on the substrate: the stringified patient identity.
    pub fn partition_key(&self) -> String {
        self.patient_id.to_string()
    }
}

impl fmt::Display for EventEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            EventPayload::LabResult(p) => write!(
                f,
                "{}{{patient={}, test={}, value={} {}, flag={}, critical={}}}",
                self.event_type,
                self.patient_id,
                p.test_name,
                p.value,
                p.unit,
                p.flag,
                p.critical()
            ),
            EventPayload::Patient(p) => write!(
                f,
                "{}{{patient={}, mrn={}, status={} -> {}}}",
                self.event_type,
                self.patient_id,
                p.mrn,
                p.previous_status.map(|s| s.as_str()).unwrap_or("-"),
                p.new_status
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinicalflow_uuid::CanonicalUuid;

    fn result_payload(flag: Flag) -> LabResultPayload {
        LabResultPayload {
            lab_result_id: ResultId::new(CanonicalUuid::new()),
            test_name: NonEmptyText::new("Potassium").unwrap(),
            value: 6.9,
            unit: NonEmptyText::new("mmol/L").unwrap(),
            flag,
        }
    }

    #[test]
    fn lab_result_event_type_follows_flag() {
        let patient = PatientId::new(CanonicalUuid::new());
        for (flag, expected) in [
            (Flag::Normal, EventType::ResultReported),
            (Flag::Low, EventType::ResultReported),
            (Flag::High, EventType::ResultReported),
            (Flag::Critical, EventType::CriticalResult),
        ] {
            let envelope = EventEnvelope::lab_result(
                EventId::new(CanonicalUuid::new()),
                Utc::now(),
                patient,
                result_payload(flag),
            );
            assert_eq!(envelope.event_type(), expected);
            assert_eq!(envelope.channel(), Channel::LabResults);
        }
    }

    #[test]
    fn patient_event_type_follows_new_status() {
        let envelope = EventEnvelope::patient_status(
            EventId::new(CanonicalUuid::new()),
            Utc::now(),
            PatientId::new(CanonicalUuid::new()),
            PatientPayload {
                mrn: NonEmptyText::new("MRN-0042").unwrap(),
                patient_name: NonEmptyText::new("Ada Lovelace").unwrap(),
                previous_status: Some(PatientStatus::Admitted),
                new_status: PatientStatus::Discharged,
            },
        );

        assert_eq!(envelope.event_type(), EventType::PatientDischarged);
        assert_eq!(envelope.channel(), Channel::PatientEvents);
        assert_eq!(
            envelope.to_string(),
            format!(
                "PATIENT_DISCHARGED{{patient={}, mrn=MRN-0042, status=ADMITTED -> DISCHARGED}}",
                envelope.patient_id()
            )
        );
    }

    #[test]
    fn partition_key_is_the_patient_id() {
        let patient = PatientId::parse("7f4c2e9d-4b0a-4f3a-9a2c-0e9a6b5d1c88").unwrap();
        let envelope = EventEnvelope::lab_result(
            EventId::new(CanonicalUuid::new()),
            Utc::now(),
            patient,
            result_payload(Flag::Normal),
        );

        assert_eq!(envelope.partition_key(), "7f4c2e9d-4b0a-4f3a-9a2c-0e9a6b5d1c88");
    }

    #[test]
    fn wire_names_round_trip() {
        for ty in [
            EventType::ResultReported,
            EventType::CriticalResult,
            EventType::PatientAdmitted,
            EventType::PatientDischarged,
            EventType::PatientTransferred,
            EventType::PatientRegistered,
        ] {
            assert_eq!(EventType::from_wire(ty.as_str()), Some(ty));
        }
        assert_eq!(EventType::from_wire("PATIENT_DECEASED"), None);
    }
}
