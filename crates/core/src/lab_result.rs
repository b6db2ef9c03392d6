//! Lab result model and lifecycle.
//!
//! Responsibilities:
//! - Validate incoming drafts (required fields, finite numbers, well-formed reference ranges)
//! - Keep the flag derived from value and range; there is no setter for it
//! - Enforce the one-way lifecycle `PENDING -> REPORTED -> VERIFIED`

use crate::flag::evaluate;
use crate::validation::FieldErrors;
use crate::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use clinicalflow_events::LabResultPayload;
use clinicalflow_types::{Flag, NonEmptyText, ResultStatus};
use clinicalflow_uuid::{PatientId, ResultId};
use serde::Serialize;

// ============================================================================
// Reference range
// ============================================================================

/// Inclusive normal band for a test. Both bounds are finite and `min <= max`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ReferenceRange {
    min: f64,
    max: f64,
}

impl ReferenceRange {
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if a bound is not finite or `min > max`.
    pub fn new(min: f64, max: f64) -> CoreResult<Self> {
        let mut errors = FieldErrors::new();
        check_range(&mut errors, Some(min), Some(max));
        errors.finish()?;
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

fn check_range(
    errors: &mut FieldErrors,
    min: Option<f64>,
    max: Option<f64>,
) -> Option<ReferenceRange> {
    match (min, max) {
        (None, None) => None,
        (Some(_), None) => {
            errors.push("referenceMax", "is required when referenceMin is given");
            None
        }
        (None, Some(_)) => {
            errors.push("referenceMin", "is required when referenceMax is given");
            None
        }
        (Some(min), Some(max)) => {
            let min = errors.finite("referenceMin", min);
            let max = errors.finite("referenceMax", max);
            let (min, max) = (min?, max?);
            if min > max {
                errors.push("referenceMin", "must not exceed referenceMax");
                return None;
            }
            Some(ReferenceRange { min, max })
        }
    }
}

// ============================================================================
// Draft
// ============================================================================

/// A lab measurement as supplied by a caller, before validation.
#[derive(Clone, Debug, Default)]
pub struct NewLabResult {
    pub patient_id: Option<PatientId>,
    pub test_name: String,
    pub value: Option<f64>,
    pub unit: String,
    pub reference_min: Option<f64>,
    pub reference_max: Option<f64>,
    /// Defaults to the creation time when absent.
    pub collected_at: Option<DateTime<Utc>>,
}

impl NewLabResult {
    pub fn new(
        patient_id: PatientId,
        test_name: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            patient_id: Some(patient_id),
            test_name: test_name.into(),
            value: Some(value),
            unit: unit.into(),
            ..Self::default()
        }
    }

    pub fn with_reference_range(mut self, min: f64, max: f64) -> Self {
        self.reference_min = Some(min);
        self.reference_max = Some(max);
        self
    }

    pub fn collected_at(mut self, at: DateTime<Utc>) -> Self {
        self.collected_at = Some(at);
        self
    }

    pub(crate) fn validate(&self) -> CoreResult<ValidLabResult> {
        let mut errors = FieldErrors::new();

        if self.patient_id.is_none() {
            errors.push("patientId", "is required");
        }
        let test_name = errors.required_text("testName", &self.test_name);
        let value = errors.required_finite("value", self.value);
        let unit = errors.required_text("unit", &self.unit);
        let reference_range = check_range(&mut errors, self.reference_min, self.reference_max);

        errors.finish()?;

        match (self.patient_id, test_name, value, unit) {
            (Some(patient_id), Some(test_name), Some(value), Some(unit)) => Ok(ValidLabResult {
                patient_id,
                test_name,
                value,
                unit,
                reference_range,
                collected_at: self.collected_at,
            }),
            _ => Err(CoreError::Validation("incomplete lab result".into())),
        }
    }
}

pub(crate) struct ValidLabResult {
    patient_id: PatientId,
    test_name: NonEmptyText,
    value: f64,
    unit: NonEmptyText,
    reference_range: Option<ReferenceRange>,
    collected_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Record
// ============================================================================

/// One stored lab measurement.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    id: ResultId,
    patient_id: PatientId,
    test_name: NonEmptyText,
    value: f64,
    unit: NonEmptyText,
    reference_range: Option<ReferenceRange>,
    flag: Flag,
    status: ResultStatus,
    collected_at: DateTime<Utc>,
    reported_at: Option<DateTime<Utc>>,
}

impl ResultRecord {
    /// New record in `PENDING` with its flag evaluated.
    pub(crate) fn pending(id: ResultId, draft: ValidLabResult, now: DateTime<Utc>) -> Self {
        let mut record = Self {
            id,
            patient_id: draft.patient_id,
            test_name: draft.test_name,
            value: draft.value,
            unit: draft.unit,
            reference_range: draft.reference_range,
            flag: Flag::Normal,
            status: ResultStatus::Pending,
            collected_at: draft.collected_at.unwrap_or(now),
            reported_at: None,
        };
        record.reevaluate_flag();
        record
    }

    pub fn id(&self) -> ResultId {
        self.id
    }

    pub fn patient_id(&self) -> PatientId {
        self.patient_id
    }

    pub fn test_name(&self) -> &NonEmptyText {
        &self.test_name
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn unit(&self) -> &NonEmptyText {
        &self.unit
    }

    pub fn reference_range(&self) -> Option<ReferenceRange> {
        self.reference_range
    }

    pub fn flag(&self) -> Flag {
        self.flag
    }

    pub fn status(&self) -> ResultStatus {
        self.status
    }

    pub fn collected_at(&self) -> DateTime<Utc> {
        self.collected_at
    }

    pub fn reported_at(&self) -> Option<DateTime<Utc>> {
        self.reported_at
    }

    pub fn is_critical(&self) -> bool {
        self.flag.is_critical()
    }

    pub fn is_abnormal(&self) -> bool {
        self.flag.is_abnormal()
    }

    /// Moves `PENDING` to `REPORTED`, stamps the report time and evaluates the flag afresh.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTransition`] unless the record is `PENDING`. The record is
    /// left untouched in that case.
    pub(crate) fn mark_reported(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        self.advance_to(ResultStatus::Reported)?;
        self.reported_at = Some(now);
        self.reevaluate_flag();
        Ok(())
    }

    /// Moves `PENDING` or `REPORTED` to `VERIFIED`. A pending result verified directly keeps
    /// no report time.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTransition`] if the record is already `VERIFIED`.
    pub(crate) fn mark_verified(&mut self) -> CoreResult<()> {
        if !self.status.can_verify() {
            return Err(CoreError::InvalidTransition {
                id: self.id.to_string(),
                from: self.status,
                to: ResultStatus::Verified,
            });
        }
        self.status = ResultStatus::Verified;
        Ok(())
    }

    /// Wire payload for the event announcing this result.
    pub fn event_payload(&self) -> LabResultPayload {
        LabResultPayload {
            lab_result_id: self.id,
            test_name: self.test_name.clone(),
            value: self.value,
            unit: self.unit.clone(),
            flag: self.flag,
        }
    }

    fn advance_to(&mut self, target: ResultStatus) -> CoreResult<()> {
        if !self.status.can_advance_to(target) {
            return Err(CoreError::InvalidTransition {
                id: self.id.to_string(),
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }

    fn reevaluate_flag(&mut self) {
        let (min, max) = match self.reference_range {
            Some(range) => (Some(range.min), Some(range.max)),
            None => (None, None),
        };
        self.flag = evaluate(self.value, min, max);
    }
}
