//! Patient registry model.
//!
//! A patient's status changes are what the patient event channel announces; demographics are
//! carried along so consumers can name the patient without a lookup.

use crate::validation::FieldErrors;
use crate::{CoreError, CoreResult};
use chrono::{DateTime, NaiveDate, Utc};
use clinicalflow_events::PatientPayload;
use clinicalflow_types::{NonEmptyText, PatientStatus};
use clinicalflow_uuid::PatientId;
use serde::Serialize;

/// Registration details supplied by a caller.
#[derive(Clone, Debug, Default)]
pub struct NewPatient {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    /// Medical record number. Unique across the registry.
    pub mrn: String,
}

/// Partial demographic update. `None` leaves the field unchanged.
#[derive(Clone, Debug, Default)]
pub struct PatientUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

/// A registered patient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    id: PatientId,
    first_name: NonEmptyText,
    last_name: NonEmptyText,
    date_of_birth: NaiveDate,
    mrn: NonEmptyText,
    status: PatientStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn check_date_of_birth(
    errors: &mut FieldErrors,
    date_of_birth: Option<NaiveDate>,
    today: NaiveDate,
) -> Option<NaiveDate> {
    match date_of_birth {
        None => {
            errors.push("dateOfBirth", "is required");
            None
        }
        Some(dob) if dob >= today => {
            errors.push("dateOfBirth", "must be in the past");
            None
        }
        Some(dob) => Some(dob),
    }
}

impl Patient {
    /// Builds a `REGISTERED` patient from a draft.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] listing every blank name or MRN and a missing or
    /// non-past date of birth.
    pub(crate) fn register(
        id: PatientId,
        draft: &NewPatient,
        now: DateTime<Utc>,
    ) -> CoreResult<Self> {
        let mut errors = FieldErrors::new();
        let first_name = errors.required_text("firstName", &draft.first_name);
        let last_name = errors.required_text("lastName", &draft.last_name);
        let date_of_birth =
            check_date_of_birth(&mut errors, draft.date_of_birth, now.date_naive());
        let mrn = errors.required_text("mrn", &draft.mrn);
        errors.finish()?;

        match (first_name, last_name, date_of_birth, mrn) {
            (Some(first_name), Some(last_name), Some(date_of_birth), Some(mrn)) => Ok(Self {
                id,
                first_name,
                last_name,
                date_of_birth,
                mrn,
                status: PatientStatus::Registered,
                created_at: now,
                updated_at: now,
            }),
            _ => Err(CoreError::Validation("incomplete patient".into())),
        }
    }

    pub fn id(&self) -> PatientId {
        self.id
    }

    pub fn first_name(&self) -> &NonEmptyText {
        &self.first_name
    }

    pub fn last_name(&self) -> &NonEmptyText {
        &self.last_name
    }

    /// `"First Last"`, as carried on patient events.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn date_of_birth(&self) -> NaiveDate {
        self.date_of_birth
    }

    pub fn mrn(&self) -> &NonEmptyText {
        &self.mrn
    }

    pub fn status(&self) -> PatientStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Moves the patient to `target`, returning the status it left.
    ///
    /// Any status may move to `ADMITTED`, `DISCHARGED` or `TRANSFERRED`, including the one it
    /// is already in. `REGISTERED` is only ever assigned at registration.
    pub(crate) fn transition_to(
        &mut self,
        target: PatientStatus,
        now: DateTime<Utc>,
    ) -> CoreResult<PatientStatus> {
        if target == PatientStatus::Registered {
            return Err(CoreError::Validation(
                "status: REGISTERED is only assigned at registration".into(),
            ));
        }
        let previous = self.status;
        self.status = target;
        self.updated_at = now;
        Ok(previous)
    }

    /// Applies a demographic update. Nothing is changed if any supplied field is invalid.
    pub(crate) fn apply_update(
        &mut self,
        update: &PatientUpdate,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let mut errors = FieldErrors::new();
        let first_name = update
            .first_name
            .as_deref()
            .map(|v| errors.required_text("firstName", v));
        let last_name = update
            .last_name
            .as_deref()
            .map(|v| errors.required_text("lastName", v));
        let date_of_birth = update
            .date_of_birth
            .map(|dob| check_date_of_birth(&mut errors, Some(dob), now.date_naive()));
        errors.finish()?;

        if let Some(Some(first_name)) = first_name {
            self.first_name = first_name;
        }
        if let Some(Some(last_name)) = last_name {
            self.last_name = last_name;
        }
        if let Some(Some(date_of_birth)) = date_of_birth {
            self.date_of_birth = date_of_birth;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Wire payload announcing the patient's current status.
    pub fn event_payload(&self, previous_status: Option<PatientStatus>) -> PatientPayload {
        PatientPayload {
            mrn: self.mrn.clone(),
            patient_name: NonEmptyText::new(self.full_name())
                .unwrap_or_else(|_| self.last_name.clone()),
            previous_status,
            new_status: self.status,
        }
    }
}
