//! Patient registration, status transitions and registry queries.

use super::{Published, ServiceDeps};
use crate::patient::{NewPatient, Patient, PatientUpdate};
use crate::publisher::PublishReceipt;
use crate::repositories::PatientRepository;
use crate::{CoreError, CoreResult};
use clinicalflow_events::EventEnvelope;
use clinicalflow_types::PatientStatus;
use clinicalflow_uuid::PatientId;
use std::sync::Arc;

#[derive(Clone)]
pub struct PatientService {
    repo: Arc<dyn PatientRepository>,
    deps: ServiceDeps,
}

impl PatientService {
    pub fn new(repo: Arc<dyn PatientRepository>, deps: ServiceDeps) -> Self {
        Self { repo, deps }
    }

    /// Registers a new patient and publishes `PATIENT_REGISTERED`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] for missing or malformed details and
    /// [`CoreError::Conflict`] if the MRN is already registered. Nothing is stored or
    /// published in either case.
    pub fn register(&self, draft: &NewPatient) -> CoreResult<Published<Patient>> {
        let now = self.deps.clock.now();
        let patient = Patient::register(self.deps.ids.patient_id(), draft, now)?;
        self.repo.insert(&patient).inspect_err(|e| {
            tracing::warn!(mrn = %patient.mrn(), error = %e, "patient registration rejected");
        })?;

        let receipt = self.announce(&patient, None);
        Ok(Published {
            record: patient,
            receipt,
        })
    }

    pub fn admit(&self, id: PatientId) -> CoreResult<Published<Patient>> {
        self.transition_status(id, PatientStatus::Admitted)
    }

    pub fn discharge(&self, id: PatientId) -> CoreResult<Published<Patient>> {
        self.transition_status(id, PatientStatus::Discharged)
    }

    pub fn transfer(&self, id: PatientId) -> CoreResult<Published<Patient>> {
        self.transition_status(id, PatientStatus::Transferred)
    }

    /// Moves a patient to `target` and publishes the matching event with the previous and
    /// new status.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] for an unknown id; [`CoreError::Validation`] if `target` is
    /// `REGISTERED`.
    pub fn transition_status(
        &self,
        id: PatientId,
        target: PatientStatus,
    ) -> CoreResult<Published<Patient>> {
        let now = self.deps.clock.now();
        let mut previous = None;
        let patient = self.repo.update(id, &mut |p| {
            previous = Some(p.transition_to(target, now)?);
            Ok(())
        })?;

        let receipt = self.announce(&patient, previous);
        Ok(Published {
            record: patient,
            receipt,
        })
    }

    /// Updates demographics. Publishes nothing.
    pub fn update(&self, id: PatientId, update: &PatientUpdate) -> CoreResult<Patient> {
        let now = self.deps.clock.now();
        let patient = self.repo.update(id, &mut |p| p.apply_update(update, now))?;
        tracing::info!(patient_id = %id, "patient demographics updated");
        Ok(patient)
    }

    pub fn find_by_id(&self, id: PatientId) -> CoreResult<Patient> {
        self.repo
            .find_by_id(id)?
            .ok_or_else(|| CoreError::not_found("patient", id))
    }

    pub fn find_by_mrn(&self, mrn: &str) -> CoreResult<Patient> {
        let mrn = mrn.trim();
        self.repo
            .find_by_mrn(mrn)?
            .ok_or_else(|| CoreError::not_found("patient with MRN", mrn))
    }

    pub fn find_by_status(&self, status: PatientStatus) -> CoreResult<Vec<Patient>> {
        self.repo.find_by_status(status)
    }

    pub fn search_by_last_name(&self, fragment: &str) -> CoreResult<Vec<Patient>> {
        self.repo.search_by_last_name(fragment.trim())
    }

    pub fn find_all(&self) -> CoreResult<Vec<Patient>> {
        self.repo.find_all()
    }

    fn announce(&self, patient: &Patient, previous: Option<PatientStatus>) -> PublishReceipt {
        let envelope = EventEnvelope::patient_status(
            self.deps.ids.event_id(),
            self.deps.clock.now(),
            patient.id(),
            patient.event_payload(previous),
        );
        tracing::info!(event = %envelope, "patient status changed");
        self.deps.publisher.publish(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::memory::InMemoryPatients;
    use crate::services::testing::{harness, published, Harness};
    use chrono::NaiveDate;
    use clinicalflow_uuid::CanonicalUuid;

    fn service(h: &Harness) -> PatientService {
        PatientService::new(Arc::new(InMemoryPatients::new()), h.deps.clone())
    }

    fn draft(mrn: &str) -> NewPatient {
        NewPatient {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            date_of_birth: NaiveDate::from_ymd_opt(1965, 12, 10),
            mrn: mrn.into(),
        }
    }

    #[tokio::test]
    async fn registration_publishes_without_previous_status() {
        let h = harness();
        let svc = service(&h);

        let done = svc.register(&draft("MRN-0042")).expect("register");
        assert_eq!(done.record.status(), PatientStatus::Registered);
        done.receipt.outcome().await.expect("published");

        let events = published(&h.bus, "patient.events");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["eventType"], "PATIENT_REGISTERED");
        assert_eq!(events[0]["mrn"], "MRN-0042");
        assert_eq!(events[0]["patientName"], "Ada Lovelace");
        assert_eq!(events[0]["newStatus"], "REGISTERED");
        assert!(events[0].get("previousStatus").is_none());
    }

    #[tokio::test]
    async fn duplicate_mrn_is_a_conflict_with_no_state_change() {
        let h = harness();
        let svc = service(&h);
        let first = svc.register(&draft("MRN-0042")).expect("register");
        first.receipt.outcome().await.expect("published");

        let err = svc.register(&draft("MRN-0042")).expect_err("duplicate");
        assert!(matches!(err, CoreError::Conflict(_)));
        assert_eq!(svc.find_all().expect("query").len(), 1);
        assert_eq!(published(&h.bus, "patient.events").len(), 1);
    }

    #[tokio::test]
    async fn discharge_carries_previous_and_new_status() {
        let h = harness();
        let svc = service(&h);
        let id = svc.register(&draft("MRN-1")).expect("register").record.id();

        svc.admit(id).expect("admit");
        let done = svc.discharge(id).expect("discharge");
        assert_eq!(done.record.status(), PatientStatus::Discharged);
        done.receipt.outcome().await.expect("published");

        let events = published(&h.bus, "patient.events");
        let types: Vec<_> = events
            .iter()
            .map(|e| e["eventType"].as_str().unwrap_or_default())
            .collect();
        assert_eq!(
            types,
            vec!["PATIENT_REGISTERED", "PATIENT_ADMITTED", "PATIENT_DISCHARGED"]
        );
        assert_eq!(events[2]["previousStatus"], "ADMITTED");
        assert_eq!(events[2]["newStatus"], "DISCHARGED");
        assert_eq!(events[2]["patientId"], id.to_string());
    }

    #[tokio::test]
    async fn transfer_and_unknown_patient() {
        let h = harness();
        let svc = service(&h);
        let id = svc.register(&draft("MRN-1")).expect("register").record.id();

        let done = svc.transfer(id).expect("transfer");
        assert_eq!(done.record.status(), PatientStatus::Transferred);

        let missing = PatientId::new(CanonicalUuid::new());
        assert!(matches!(svc.admit(missing), Err(CoreError::NotFound { .. })));
        assert!(matches!(
            svc.transition_status(id, PatientStatus::Registered),
            Err(CoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn update_publishes_nothing() {
        let h = harness();
        let svc = service(&h);
        let done = svc.register(&draft("MRN-1")).expect("register");
        done.receipt.outcome().await.expect("published");

        let updated = svc
            .update(
                done.record.id(),
                &PatientUpdate {
                    last_name: Some("King".into()),
                    ..PatientUpdate::default()
                },
            )
            .expect("update");
        assert_eq!(updated.full_name(), "Ada King");
        assert_eq!(published(&h.bus, "patient.events").len(), 1);
    }

    #[tokio::test]
    async fn registry_queries() {
        let h = harness();
        let svc = service(&h);
        let a = svc.register(&draft("MRN-1")).expect("register").record.id();
        svc.register(&NewPatient {
            last_name: "Hopper".into(),
            ..draft("MRN-2")
        })
        .expect("register");
        svc.admit(a).expect("admit");

        let hopper = svc.find_by_mrn(" MRN-2 ").expect("found");
        assert_eq!(hopper.last_name().as_str(), "Hopper");
        assert!(matches!(svc.find_by_mrn("MRN-9"), Err(CoreError::NotFound { .. })));
        assert_eq!(
            svc.find_by_status(PatientStatus::Admitted).expect("query").len(),
            1
        );
        assert_eq!(svc.search_by_last_name("love").expect("query").len(), 1);
        assert_eq!(svc.find_all().expect("query").len(), 2);
        assert_eq!(
            svc.find_by_id(a).expect("found").status(),
            PatientStatus::Admitted
        );
    }
}
