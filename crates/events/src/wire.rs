//! JSON wire model for events and the translation to and from it.
//!
//! The wire shape is one flat JSON object with camelCase keys. Producers always write every
//! field relevant to the event type; consumers accept any subset of them.
//!
//! ```json
//! {
//!   "eventId": "1b1f0c6e-8a4e-4d5e-9d55-2a8e6f7d9c01",
//!   "eventType": "CRITICAL_RESULT",
//!   "patientId": "7f4c2e9d-4b0a-4f3a-9a2c-0e9a6b5d1c88",
//!   "labResultId": "a4f91c6d-3b2e-4c5f-9d7a-1e8b6c0a9f12",
//!   "testName": "Potassium",
//!   "value": 28.0,
//!   "unit": "mmol/L",
//!   "flag": "CRITICAL",
//!   "critical": true,
//!   "timestamp": "2026-01-11T14:35:22.045Z"
//! }
//! ```

use crate::envelope::{EventEnvelope, EventPayload, EventType};
use crate::{DecodeFailure, EncodeError};
use chrono::{DateTime, Utc};
use clinicalflow_types::{Flag, PatientStatus};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Public decoded types
// ============================================================================

/// A delivered event after decoding. Every field but the event type may be unknown.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedEvent {
    pub event_id: Option<String>,
    /// Opaque subject identity, kept as text so a foreign producer's ids still route.
    pub patient_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub body: DecodedBody,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DecodedBody {
    LabResult(LabResultFields),
    Patient(PatientFields),
    /// An `eventType` this consumer does not know.
    Unrecognised { raw_type: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct LabResultFields {
    /// `ResultReported` or `CriticalResult`.
    pub event_type: EventType,
    pub lab_result_id: Option<String>,
    pub test_name: Option<String>,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub flag: Option<Flag>,
    /// True if the wire `critical` is true, the flag is `CRITICAL`, or the event type is
    /// `CRITICAL_RESULT`. Any one signal is enough to treat the result as a panic value.
    pub critical: bool,
    /// Wire keys that were present but unreadable and decoded as unknown. Only ever non-empty
    /// for `CRITICAL_RESULT`, which is never dropped over a bad field.
    pub discarded: Vec<&'static str>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientFields {
    pub event_type: EventType,
    pub mrn: Option<String>,
    pub patient_name: Option<String>,
    pub previous_status: Option<PatientStatus>,
    pub new_status: Option<PatientStatus>,
}

impl DecodedEvent {
    /// The wire event type name, known or not.
    pub fn event_type_name(&self) -> &str {
        match &self.body {
            DecodedBody::LabResult(fields) => fields.event_type.as_str(),
            DecodedBody::Patient(fields) => fields.event_type.as_str(),
            DecodedBody::Unrecognised { raw_type } => raw_type,
        }
    }
}

// ============================================================================
// Encode / decode
// ============================================================================

/// Render an envelope as JSON bytes.
///
/// # Errors
///
/// Returns [`EncodeError`] if serialisation fails.
pub fn encode(envelope: &EventEnvelope) -> Result<Vec<u8>, EncodeError> {
    let wire = envelope_to_wire(envelope);
    Ok(serde_json::to_vec(&wire)?)
}

/// Decode JSON bytes into a typed event.
///
/// Uses `serde_path_to_error` so a type mismatch reports the failing key (for example
/// `value`) rather than only a byte offset.
///
/// A `CRITICAL_RESULT` is the exception to strict field checking: its event type alone is
/// enough to raise a panic alert, so unreadable fields decode as unknown and are listed in
/// [`LabResultFields::discarded`] instead of failing the event.
///
/// # Errors
///
/// Returns [`DecodeFailure`] if:
/// - the payload is not a JSON object, or a present field has the wrong JSON type,
/// - `eventType` is absent or blank,
/// - `flag`, `previousStatus` or `newStatus` carry a name outside their enumeration,
/// - `timestamp` is not RFC 3339 text or a representable epoch-seconds number.
pub fn decode(bytes: &[u8]) -> Result<DecodedEvent, DecodeFailure> {
    match decode_strict(bytes) {
        Ok(event) => Ok(event),
        Err(failure) => salvage_critical_result(bytes).ok_or(failure),
    }
}

fn decode_strict(bytes: &[u8]) -> Result<DecodedEvent, DecodeFailure> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    let wire: WireEvent = serde_path_to_error::deserialize(&mut deserializer).map_err(|err| {
        let path = err.path().to_string();
        let path = if path.is_empty() || path == "." {
            "<root>".to_string()
        } else {
            path
        };
        DecodeFailure::Malformed {
            path,
            message: err.into_inner().to_string(),
        }
    })?;
    deserializer
        .end()
        .map_err(|err| DecodeFailure::Malformed {
            path: "<root>".into(),
            message: err.to_string(),
        })?;

    wire_to_decoded(wire)
}

// ============================================================================
// Wire types (internal)
// ============================================================================

/// Flat wire object. Unknown keys are ignored; absent keys become `None`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    patient_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lab_result_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    test_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    flag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    critical: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mrn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    patient_name: Option<String>,
    // Absent for registration.
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<WireTimestamp>,
}

/// Producers write RFC 3339; some emit epoch seconds (optionally fractional).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
enum WireTimestamp {
    Rfc3339(DateTime<Utc>),
    EpochSeconds(f64),
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

fn envelope_to_wire(envelope: &EventEnvelope) -> WireEvent {
    let mut wire = WireEvent {
        event_id: Some(envelope.event_id().to_string()),
        event_type: Some(envelope.event_type().as_str().to_string()),
        patient_id: Some(envelope.patient_id().to_string()),
        timestamp: Some(WireTimestamp::Rfc3339(envelope.timestamp())),
        ..WireEvent::default()
    };

    match envelope.payload() {
        EventPayload::LabResult(p) => {
            wire.lab_result_id = Some(p.lab_result_id.to_string());
            wire.test_name = Some(p.test_name.as_str().to_string());
            wire.value = Some(p.value);
            wire.unit = Some(p.unit.as_str().to_string());
            wire.flag = Some(p.flag.as_str().to_string());
            wire.critical = Some(p.critical());
        }
        EventPayload::Patient(p) => {
            wire.mrn = Some(p.mrn.as_str().to_string());
            wire.patient_name = Some(p.patient_name.as_str().to_string());
            wire.previous_status = p.previous_status.map(|s| s.as_str().to_string());
            wire.new_status = Some(p.new_status.as_str().to_string());
        }
    }

    wire
}

fn wire_to_decoded(wire: WireEvent) -> Result<DecodedEvent, DecodeFailure> {
    let raw_type = wire
        .event_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(DecodeFailure::MissingField("eventType"))?
        .to_string();

    let timestamp = wire.timestamp.map(timestamp_from_wire).transpose()?;

    let body = match EventType::from_wire(&raw_type) {
        Some(event_type @ (EventType::ResultReported | EventType::CriticalResult)) => {
            let flag = wire
                .flag
                .as_deref()
                .map(|f| {
                    f.parse::<Flag>().map_err(|e| DecodeFailure::InvalidField {
                        field: "flag",
                        message: e.to_string(),
                    })
                })
                .transpose()?;
            let critical = wire.critical.unwrap_or(false)
                || flag.is_some_and(|f| f.is_critical())
                || event_type == EventType::CriticalResult;

            DecodedBody::LabResult(LabResultFields {
                event_type,
                lab_result_id: wire.lab_result_id,
                test_name: wire.test_name,
                value: wire.value,
                unit: wire.unit,
                flag,
                critical,
                discarded: Vec::new(),
            })
        }
        Some(event_type) => DecodedBody::Patient(PatientFields {
            event_type,
            mrn: wire.mrn,
            patient_name: wire.patient_name,
            previous_status: parse_status("previousStatus", wire.previous_status.as_deref())?,
            new_status: parse_status("newStatus", wire.new_status.as_deref())?,
        }),
        None => DecodedBody::Unrecognised { raw_type },
    };

    Ok(DecodedEvent {
        event_id: wire.event_id,
        patient_id: wire.patient_id,
        timestamp,
        body,
    })
}

/// Best-effort decode of a `CRITICAL_RESULT` that failed strict decoding.
fn salvage_critical_result(bytes: &[u8]) -> Option<DecodedEvent> {
    let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(bytes) else {
        return None;
    };
    let raw_type = map.get("eventType")?.as_str()?.trim();
    if EventType::from_wire(raw_type) != Some(EventType::CriticalResult) {
        return None;
    }

    let mut fields = LenientFields {
        map: &map,
        discarded: Vec::new(),
    };
    let event_id = fields.read("eventId", text);
    let patient_id = fields.read("patientId", text);
    let timestamp = fields.read("timestamp", |v| {
        let ts = WireTimestamp::deserialize(v).ok()?;
        timestamp_from_wire(ts).ok()
    });
    let lab_result_id = fields.read("labResultId", text);
    let test_name = fields.read("testName", text);
    let value = fields.read("value", Value::as_f64);
    let unit = fields.read("unit", text);
    let flag = fields.read("flag", |v| v.as_str()?.parse::<Flag>().ok());
    fields.read("critical", Value::as_bool);

    Some(DecodedEvent {
        event_id,
        patient_id,
        timestamp,
        body: DecodedBody::LabResult(LabResultFields {
            event_type: EventType::CriticalResult,
            lab_result_id,
            test_name,
            value,
            unit,
            flag,
            critical: true,
            discarded: fields.discarded,
        }),
    })
}

struct LenientFields<'a> {
    map: &'a Map<String, Value>,
    discarded: Vec<&'static str>,
}

impl LenientFields<'_> {
    /// Absent and null keys are unknown; a present key `read` cannot make sense of is
    /// unknown and recorded as discarded.
    fn read<T>(
        &mut self,
        key: &'static str,
        read: impl FnOnce(&Value) -> Option<T>,
    ) -> Option<T> {
        let value = self.map.get(key).filter(|v| !v.is_null())?;
        let parsed = read(value);
        if parsed.is_none() {
            self.discarded.push(key);
        }
        parsed
    }
}

fn text(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

fn parse_status(
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<PatientStatus>, DecodeFailure> {
    value
        .map(|s| {
            s.parse::<PatientStatus>()
                .map_err(|e| DecodeFailure::InvalidField {
                    field,
                    message: e.to_string(),
                })
        })
        .transpose()
}

fn timestamp_from_wire(ts: WireTimestamp) -> Result<DateTime<Utc>, DecodeFailure> {
    match ts {
        WireTimestamp::Rfc3339(at) => Ok(at),
        WireTimestamp::EpochSeconds(secs) => {
            let whole = secs.floor();
            let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
            if !whole.is_finite() || whole < i64::MIN as f64 || whole > i64::MAX as f64 {
                return Err(DecodeFailure::InvalidField {
                    field: "timestamp",
                    message: format!("epoch seconds out of range: {secs}"),
                });
            }
            DateTime::from_timestamp(whole as i64, nanos).ok_or_else(|| {
                DecodeFailure::InvalidField {
                    field: "timestamp",
                    message: format!("epoch seconds out of range: {secs}"),
                }
            })
        }
    }
}
