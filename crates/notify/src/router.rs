//! Alert routing.
//!
//! Responsibilities:
//! - Decide, from a decoded event alone, which alert workflow it triggers
//! - Check the panic condition before anything else
//! - Describe the action as data; emitting it is the sink's job

use clinicalflow_events::{DecodedBody, DecodedEvent, EventType, LabResultFields, PatientFields};
use clinicalflow_types::{Flag, PatientStatus};
use std::fmt;
use std::time::Duration;

const UNKNOWN: &str = "unknown";

/// Inputs to routing that come from configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoutingPolicy {
    /// SLA for telling the ordering clinician about a panic value.
    pub critical_notify_within: Duration,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            critical_notify_within: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Workflow,
    Panic,
}

/// What a lab result event said, with unknown fields left as `None`.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultSummary {
    pub patient_id: Option<String>,
    pub test_name: Option<String>,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub flag: Option<Flag>,
}

/// What a patient event said, with unknown fields left as `None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientSummary {
    pub patient_id: Option<String>,
    pub mrn: Option<String>,
    pub patient_name: Option<String>,
    pub previous_status: Option<PatientStatus>,
    pub new_status: Option<PatientStatus>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AlertAction {
    /// Panic value: the ordering clinician must be told within `notify_within`.
    PanicAlert {
        result: ResultSummary,
        notify_within: Duration,
    },
    ResultLogged(ResultSummary),
    AdmissionWorkflow(PatientSummary),
    DischargeSummary(PatientSummary),
    TransferNotification(PatientSummary),
    RegistrationLogged(PatientSummary),
    /// Event type this consumer has no workflow for.
    Unhandled {
        event_type: String,
        patient_id: Option<String>,
    },
}

impl AlertAction {
    pub fn severity(&self) -> Severity {
        match self {
            Self::PanicAlert { .. } => Severity::Panic,
            Self::AdmissionWorkflow(_)
            | Self::DischargeSummary(_)
            | Self::TransferNotification(_) => Severity::Workflow,
            Self::ResultLogged(_) | Self::RegistrationLogged(_) | Self::Unhandled { .. } => {
                Severity::Info
            }
        }
    }

    /// Subject of the event the action was derived from, if the event named one.
    pub fn patient_id(&self) -> Option<&str> {
        match self {
            Self::PanicAlert { result, .. } | Self::ResultLogged(result) => {
                result.patient_id.as_deref()
            }
            Self::AdmissionWorkflow(p)
            | Self::DischargeSummary(p)
            | Self::TransferNotification(p)
            | Self::RegistrationLogged(p) => p.patient_id.as_deref(),
            Self::Unhandled { patient_id, .. } => patient_id.as_deref(),
        }
    }
}

/// Chooses the alert action for a decoded event.
///
/// A lab result that is critical by any signal (wire `critical`, a `CRITICAL` flag, or the
/// `CRITICAL_RESULT` type) always becomes a [`AlertAction::PanicAlert`]; that check runs
/// before the event type is considered.
pub fn route(event: &DecodedEvent, policy: &RoutingPolicy) -> AlertAction {
    match &event.body {
        DecodedBody::LabResult(fields) if fields.critical => AlertAction::PanicAlert {
            result: result_summary(event, fields),
            notify_within: policy.critical_notify_within,
        },
        DecodedBody::LabResult(fields) => AlertAction::ResultLogged(result_summary(event, fields)),
        DecodedBody::Patient(fields) => {
            let summary = patient_summary(event, fields);
            match fields.event_type {
                EventType::PatientAdmitted => AlertAction::AdmissionWorkflow(summary),
                EventType::PatientDischarged => AlertAction::DischargeSummary(summary),
                EventType::PatientTransferred => AlertAction::TransferNotification(summary),
                EventType::PatientRegistered => AlertAction::RegistrationLogged(summary),
                EventType::ResultReported | EventType::CriticalResult => AlertAction::Unhandled {
                    event_type: fields.event_type.as_str().to_string(),
                    patient_id: event.patient_id.clone(),
                },
            }
        }
        DecodedBody::Unrecognised { raw_type } => AlertAction::Unhandled {
            event_type: raw_type.clone(),
            patient_id: event.patient_id.clone(),
        },
    }
}

fn result_summary(event: &DecodedEvent, fields: &LabResultFields) -> ResultSummary {
    ResultSummary {
        patient_id: event.patient_id.clone(),
        test_name: fields.test_name.clone(),
        value: fields.value,
        unit: fields.unit.clone(),
        flag: fields.flag,
    }
}

fn patient_summary(event: &DecodedEvent, fields: &PatientFields) -> PatientSummary {
    PatientSummary {
        patient_id: event.patient_id.clone(),
        mrn: fields.mrn.clone(),
        patient_name: fields.patient_name.clone(),
        previous_status: fields.previous_status,
        new_status: fields.new_status,
    }
}

impl fmt::Display for ResultSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Patient: {} | Test: {} | Value: ",
            self.patient_id.as_deref().unwrap_or(UNKNOWN),
            self.test_name.as_deref().unwrap_or(UNKNOWN),
        )?;
        match self.value {
            Some(v) => write!(f, "{v}")?,
            None => f.write_str(UNKNOWN)?,
        }
        write!(
            f,
            " {} | Flag: {}",
            self.unit.as_deref().unwrap_or(""),
            self.flag.map(|fl| fl.as_str()).unwrap_or(UNKNOWN)
        )
    }
}

impl fmt::Display for PatientSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (MRN: {})",
            self.patient_name.as_deref().unwrap_or(UNKNOWN),
            self.mrn.as_deref().unwrap_or(UNKNOWN)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lab_event(event_type: EventType, flag: Option<Flag>, critical: bool) -> DecodedEvent {
        DecodedEvent {
            event_id: Some("e-1".into()),
            patient_id: Some("p-1".into()),
            timestamp: None,
            body: DecodedBody::LabResult(LabResultFields {
                event_type,
                lab_result_id: Some("r-1".into()),
                test_name: Some("Potassium".into()),
                value: Some(6.9),
                unit: Some("mmol/L".into()),
                flag,
                critical,
                discarded: Vec::new(),
            }),
        }
    }

    fn patient_event(event_type: EventType) -> DecodedEvent {
        DecodedEvent {
            event_id: None,
            patient_id: Some("p-2".into()),
            timestamp: None,
            body: DecodedBody::Patient(PatientFields {
                event_type,
                mrn: Some("MRN-0042".into()),
                patient_name: Some("Ada Lovelace".into()),
                previous_status: Some(PatientStatus::Admitted),
                new_status: Some(PatientStatus::Discharged),
            }),
        }
    }

    #[test]
    fn critical_result_is_a_panic_alert_with_sla() {
        let policy = RoutingPolicy::default();
        let action = route(
            &lab_event(EventType::CriticalResult, Some(Flag::Critical), true),
            &policy,
        );
        match &action {
            AlertAction::PanicAlert {
                result,
                notify_within,
            } => {
                assert_eq!(*notify_within, Duration::from_secs(1800));
                assert_eq!(
                    result.to_string(),
                    "Patient: p-1 | Test: Potassium | Value: 6.9 mmol/L | Flag: CRITICAL"
                );
            }
            other => panic!("expected panic alert, got {other:?}"),
        }
        assert_eq!(action.severity(), Severity::Panic);
        assert_eq!(action.patient_id(), Some("p-1"));
    }

    #[test]
    fn panic_check_runs_before_event_type() {
        // Decoder sets `critical` from any signal; a RESULT_REPORTED carrying it still panics.
        let action = route(
            &lab_event(EventType::ResultReported, Some(Flag::High), true),
            &RoutingPolicy::default(),
        );
        assert_eq!(action.severity(), Severity::Panic);
    }

    #[test]
    fn non_critical_result_is_logged() {
        let action = route(
            &lab_event(EventType::ResultReported, Some(Flag::High), false),
            &RoutingPolicy::default(),
        );
        assert!(matches!(action, AlertAction::ResultLogged(_)));
        assert_eq!(action.severity(), Severity::Info);
    }

    #[test]
    fn patient_events_route_by_type() {
        let policy = RoutingPolicy::default();
        assert!(matches!(
            route(&patient_event(EventType::PatientAdmitted), &policy),
            AlertAction::AdmissionWorkflow(_)
        ));
        assert!(matches!(
            route(&patient_event(EventType::PatientDischarged), &policy),
            AlertAction::DischargeSummary(_)
        ));
        assert!(matches!(
            route(&patient_event(EventType::PatientTransferred), &policy),
            AlertAction::TransferNotification(_)
        ));
        let registered = route(&patient_event(EventType::PatientRegistered), &policy);
        assert!(matches!(registered, AlertAction::RegistrationLogged(_)));
        assert_eq!(registered.severity(), Severity::Info);
    }

    #[test]
    fn unknown_type_is_unhandled_with_subject() {
        let event = DecodedEvent {
            event_id: None,
            patient_id: Some("p-3".into()),
            timestamp: None,
            body: DecodedBody::Unrecognised {
                raw_type: "PATIENT_DECEASED".into(),
            },
        };
        assert_eq!(
            route(&event, &RoutingPolicy::default()),
            AlertAction::Unhandled {
                event_type: "PATIENT_DECEASED".into(),
                patient_id: Some("p-3".into()),
            }
        );
    }

    #[test]
    fn missing_fields_render_as_unknown() {
        let summary = ResultSummary {
            patient_id: None,
            test_name: None,
            value: None,
            unit: None,
            flag: None,
        };
        assert_eq!(
            summary.to_string(),
            "Patient: unknown | Test: unknown | Value: unknown  | Flag: unknown"
        );
    }
}
