//! Lab result submission, verification and queries.

use super::{Published, ServiceDeps};
use crate::lab_result::{NewLabResult, ResultRecord};
use crate::publisher::PublishReceipt;
use crate::repositories::LabResultRepository;
use crate::{CoreError, CoreResult};
use clinicalflow_events::EventEnvelope;
use clinicalflow_types::Flag;
use clinicalflow_uuid::{PatientId, ResultId};
use std::sync::Arc;

/// Pure lab result operations - no transport concerns
#[derive(Clone)]
pub struct LabResultService {
    repo: Arc<dyn LabResultRepository>,
    deps: ServiceDeps,
}

impl LabResultService {
    pub fn new(repo: Arc<dyn LabResultRepository>, deps: ServiceDeps) -> Self {
        Self { repo, deps }
    }

    /// Creates, reports and announces a lab result in one step.
    ///
    /// The record is stamped `REPORTED` with the current time, its flag is evaluated afresh
    /// and it is persisted. Exactly one event is then published: `CRITICAL_RESULT` if the
    /// flag is critical, `RESULT_REPORTED` otherwise.
    ///
    /// # Arguments
    ///
    /// * `draft` - The measurement as received.
    ///
    /// # Returns
    ///
    /// The persisted record and the receipt for its event.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] listing every missing or malformed field, or
    /// [`CoreError::Storage`] if the record could not be persisted. Nothing is published in
    /// either case.
    pub fn submit_result(&self, draft: &NewLabResult) -> CoreResult<Published<ResultRecord>> {
        let valid = draft.validate()?;
        let now = self.deps.clock.now();
        let mut record = ResultRecord::pending(self.deps.ids.result_id(), valid, now);
        record.mark_reported(now)?;
        self.repo.save(&record)?;

        let receipt = self.announce(&record);
        Ok(Published { record, receipt })
    }

    /// Persists a `PENDING` result without announcing it.
    pub fn record_pending(&self, draft: &NewLabResult) -> CoreResult<ResultRecord> {
        let valid = draft.validate()?;
        let now = self.deps.clock.now();
        let record = ResultRecord::pending(self.deps.ids.result_id(), valid, now);
        self.repo.save(&record)?;
        tracing::debug!(
            lab_result_id = %record.id(),
            patient_id = %record.patient_id(),
            "lab result recorded as pending"
        );
        Ok(record)
    }

    /// Reports a stored `PENDING` result and announces it, as [`Self::submit_result`] does.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] for an unknown id; [`CoreError::InvalidTransition`] if the
    /// result has already been reported.
    pub fn report(&self, id: ResultId) -> CoreResult<Published<ResultRecord>> {
        let now = self.deps.clock.now();
        let record = self.repo.update(id, &mut |r| r.mark_reported(now))?;
        let receipt = self.announce(&record);
        Ok(Published { record, receipt })
    }

    /// Marks a pending or reported result as clinician-verified. No event is published.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] for an unknown id; [`CoreError::InvalidTransition`] if the
    /// result is already `VERIFIED`.
    pub fn verify_result(&self, id: ResultId) -> CoreResult<ResultRecord> {
        let record = self.repo.update(id, &mut |r| r.mark_verified())?;
        tracing::info!(lab_result_id = %id, "lab result verified");
        Ok(record)
    }

    pub fn find_by_id(&self, id: ResultId) -> CoreResult<ResultRecord> {
        self.repo
            .find_by_id(id)?
            .ok_or_else(|| CoreError::not_found("lab result", id))
    }

    pub fn find_by_patient(&self, patient_id: PatientId) -> CoreResult<Vec<ResultRecord>> {
        self.repo.find_by_patient(patient_id)
    }

    pub fn find_by_patient_and_test(
        &self,
        patient_id: PatientId,
        test_name: &str,
    ) -> CoreResult<Vec<ResultRecord>> {
        self.repo.find_by_patient_and_test(patient_id, test_name.trim())
    }

    pub fn find_critical_results(&self) -> CoreResult<Vec<ResultRecord>> {
        self.repo.find_by_flag(Flag::Critical)
    }

    fn announce(&self, record: &ResultRecord) -> PublishReceipt {
        if record.is_critical() {
            tracing::warn!(
                patient_id = %record.patient_id(),
                lab_result_id = %record.id(),
                "CRITICAL VALUE DETECTED: {} = {} {}",
                record.test_name(),
                record.value(),
                record.unit()
            );
        }

        let envelope = EventEnvelope::lab_result(
            self.deps.ids.event_id(),
            self.deps.clock.now(),
            record.patient_id(),
            record.event_payload(),
        );
        tracing::info!(lab_result_id = %record.id(), event = %envelope, "lab result reported");
        self.deps.publisher.publish(envelope)
    }
}
