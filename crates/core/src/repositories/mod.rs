//! Storage seams for the core services.
//!
//! The services only see these traits. Hosts and tests use the in-memory implementations in
//! [`memory`]; a database-backed store would implement the same traits.

pub mod memory;

use crate::lab_result::ResultRecord;
use crate::patient::Patient;
use crate::CoreResult;
use clinicalflow_types::{Flag, PatientStatus};
use clinicalflow_uuid::{PatientId, ResultId};

pub trait LabResultRepository: Send + Sync {
    /// Inserts or replaces the record with the same id.
    fn save(&self, record: &ResultRecord) -> CoreResult<()>;

    /// Applies `apply` to a copy of the stored record and stores the copy if `apply`
    /// succeeds, all under one write lock. Returns the stored result.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotFound`] for an unknown id, or whatever `apply` returned,
    /// in which case the stored record is unchanged.
    fn update(
        &self,
        id: ResultId,
        apply: &mut dyn FnMut(&mut ResultRecord) -> CoreResult<()>,
    ) -> CoreResult<ResultRecord>;

    fn find_by_id(&self, id: ResultId) -> CoreResult<Option<ResultRecord>>;

    /// All results for a patient, most recently collected first.
    fn find_by_patient(&self, patient_id: PatientId) -> CoreResult<Vec<ResultRecord>>;

    /// Results for a patient and test name, most recently collected first.
    fn find_by_patient_and_test(
        &self,
        patient_id: PatientId,
        test_name: &str,
    ) -> CoreResult<Vec<ResultRecord>>;

    fn find_by_flag(&self, flag: Flag) -> CoreResult<Vec<ResultRecord>>;
}

pub trait PatientRepository: Send + Sync {
    /// Stores a newly registered patient.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Conflict`] if the MRN is already taken. The check and the
    /// insert happen atomically.
    fn insert(&self, patient: &Patient) -> CoreResult<()>;

    /// Read-modify-write of one patient under a single write lock.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotFound`] for an unknown id, or whatever `apply` returned,
    /// in which case the stored patient is unchanged.
    fn update(
        &self,
        id: PatientId,
        apply: &mut dyn FnMut(&mut Patient) -> CoreResult<()>,
    ) -> CoreResult<Patient>;

    fn find_by_id(&self, id: PatientId) -> CoreResult<Option<Patient>>;

    fn find_by_mrn(&self, mrn: &str) -> CoreResult<Option<Patient>>;

    fn find_by_status(&self, status: PatientStatus) -> CoreResult<Vec<Patient>>;

    /// Case-insensitive substring match on the last name.
    fn search_by_last_name(&self, fragment: &str) -> CoreResult<Vec<Patient>>;

    fn find_all(&self) -> CoreResult<Vec<Patient>>;
}
