//! `RwLock`-guarded in-memory stores.

use super::{LabResultRepository, PatientRepository};
use crate::lab_result::ResultRecord;
use crate::patient::Patient;
use crate::{CoreError, CoreResult};
use clinicalflow_types::{Flag, PatientStatus};
use clinicalflow_uuid::{PatientId, ResultId};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

fn read<T>(lock: &RwLock<T>) -> CoreResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| CoreError::Storage("repository lock poisoned".into()))
}

fn write<T>(lock: &RwLock<T>) -> CoreResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| CoreError::Storage("repository lock poisoned".into()))
}

fn newest_first(records: &mut [ResultRecord]) {
    records.sort_by(|a, b| {
        b.collected_at()
            .cmp(&a.collected_at())
            .then_with(|| a.id().cmp(&b.id()))
    });
}

fn registration_order(patients: &mut [Patient]) {
    patients.sort_by(|a, b| {
        a.created_at()
            .cmp(&b.created_at())
            .then_with(|| a.mrn().as_str().cmp(b.mrn().as_str()))
    });
}

#[derive(Debug, Default)]
pub struct InMemoryLabResults {
    records: RwLock<HashMap<ResultId, ResultRecord>>,
}

impl InMemoryLabResults {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect(&self, keep: impl Fn(&ResultRecord) -> bool) -> CoreResult<Vec<ResultRecord>> {
        let mut found: Vec<_> = read(&self.records)?
            .values()
            .filter(|r| keep(*r))
            .cloned()
            .collect();
        newest_first(&mut found);
        Ok(found)
    }
}

impl LabResultRepository for InMemoryLabResults {
    fn save(&self, record: &ResultRecord) -> CoreResult<()> {
        write(&self.records)?.insert(record.id(), record.clone());
        Ok(())
    }

    fn update(
        &self,
        id: ResultId,
        apply: &mut dyn FnMut(&mut ResultRecord) -> CoreResult<()>,
    ) -> CoreResult<ResultRecord> {
        let mut records = write(&self.records)?;
        let stored = records
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("lab result", id))?;
        let mut working = stored.clone();
        apply(&mut working)?;
        *stored = working.clone();
        Ok(working)
    }

    fn find_by_id(&self, id: ResultId) -> CoreResult<Option<ResultRecord>> {
        Ok(read(&self.records)?.get(&id).cloned())
    }

    fn find_by_patient(&self, patient_id: PatientId) -> CoreResult<Vec<ResultRecord>> {
        self.collect(|r| r.patient_id() == patient_id)
    }

    fn find_by_patient_and_test(
        &self,
        patient_id: PatientId,
        test_name: &str,
    ) -> CoreResult<Vec<ResultRecord>> {
        self.collect(|r| r.patient_id() == patient_id && r.test_name().as_str() == test_name)
    }

    fn find_by_flag(&self, flag: Flag) -> CoreResult<Vec<ResultRecord>> {
        self.collect(|r| r.flag() == flag)
    }
}

/// Patients keyed by id, with a secondary MRN index.
#[derive(Debug, Default)]
pub struct InMemoryPatients {
    inner: RwLock<PatientTables>,
}

#[derive(Debug, Default)]
struct PatientTables {
    by_id: HashMap<PatientId, Patient>,
    id_by_mrn: HashMap<String, PatientId>,
}

impl InMemoryPatients {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect(&self, keep: impl Fn(&Patient) -> bool) -> CoreResult<Vec<Patient>> {
        let mut found: Vec<_> = read(&self.inner)?
            .by_id
            .values()
            .filter(|p| keep(*p))
            .cloned()
            .collect();
        registration_order(&mut found);
        Ok(found)
    }
}

impl PatientRepository for InMemoryPatients {
    fn insert(&self, patient: &Patient) -> CoreResult<()> {
        let mut tables = write(&self.inner)?;
        let mrn = patient.mrn().as_str();
        if tables.id_by_mrn.contains_key(mrn) {
            return Err(CoreError::Conflict(format!("MRN already exists: {mrn}")));
        }
        tables.id_by_mrn.insert(mrn.to_owned(), patient.id());
        tables.by_id.insert(patient.id(), patient.clone());
        Ok(())
    }

    fn update(
        &self,
        id: PatientId,
        apply: &mut dyn FnMut(&mut Patient) -> CoreResult<()>,
    ) -> CoreResult<Patient> {
        let mut tables = write(&self.inner)?;
        let stored = tables
            .by_id
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("patient", id))?;
        let mut working = stored.clone();
        apply(&mut working)?;
        // MRN is immutable after registration, so the index needs no maintenance here.
        *stored = working.clone();
        Ok(working)
    }

    fn find_by_id(&self, id: PatientId) -> CoreResult<Option<Patient>> {
        Ok(read(&self.inner)?.by_id.get(&id).cloned())
    }

    fn find_by_mrn(&self, mrn: &str) -> CoreResult<Option<Patient>> {
        let tables = read(&self.inner)?;
        Ok(tables
            .id_by_mrn
            .get(mrn)
            .and_then(|id| tables.by_id.get(id))
            .cloned())
    }

    fn find_by_status(&self, status: PatientStatus) -> CoreResult<Vec<Patient>> {
        self.collect(|p| p.status() == status)
    }

    fn search_by_last_name(&self, fragment: &str) -> CoreResult<Vec<Patient>> {
        let needle = fragment.to_lowercase();
        self.collect(|p| p.last_name().as_str().to_lowercase().contains(&needle))
    }

    fn find_all(&self) -> CoreResult<Vec<Patient>> {
        self.collect(|_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lab_result::NewLabResult;
    use crate::patient::NewPatient;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use clinicalflow_uuid::CanonicalUuid;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 11, hour, 0, 0).unwrap()
    }

    fn result(patient: PatientId, test: &str, hour: u32) -> ResultRecord {
        let draft = NewLabResult::new(patient, test, 4.0, "mmol/L").collected_at(at(hour));
        ResultRecord::pending(
            ResultId::new(CanonicalUuid::new()),
            draft.validate().expect("valid"),
            at(hour),
        )
    }

    fn patient(mrn: &str, last_name: &str) -> Patient {
        let draft = NewPatient {
            first_name: "Sam".into(),
            last_name: last_name.into(),
            date_of_birth: NaiveDate::from_ymd_opt(1980, 5, 1),
            mrn: mrn.into(),
        };
        Patient::register(PatientId::new(CanonicalUuid::new()), &draft, at(9)).expect("valid")
    }

    #[test]
    fn results_come_back_newest_first() {
        let repo = InMemoryLabResults::new();
        let p = PatientId::new(CanonicalUuid::new());
        for (test, hour) in [("Sodium", 8), ("Potassium", 12), ("Sodium", 10)] {
            repo.save(&result(p, test, hour)).expect("save");
        }
        repo.save(&result(PatientId::new(CanonicalUuid::new()), "Sodium", 11))
            .expect("save");

        let all: Vec<_> = repo
            .find_by_patient(p)
            .expect("query")
            .iter()
            .map(|r| r.collected_at())
            .collect();
        assert_eq!(all, vec![at(12), at(10), at(8)]);

        let sodium = repo.find_by_patient_and_test(p, "Sodium").expect("query");
        assert_eq!(sodium.len(), 2);
        assert_eq!(sodium[0].collected_at(), at(10));
    }

    #[test]
    fn failed_update_leaves_record_unchanged() {
        let repo = InMemoryLabResults::new();
        let r = result(PatientId::new(CanonicalUuid::new()), "Sodium", 8);
        repo.save(&r).expect("save");

        let err = repo
            .update(r.id(), &mut |rec| {
                rec.mark_reported(at(9))?;
                Err(CoreError::Conflict("rejected".into()))
            })
            .expect_err("apply failed");
        assert_eq!(err, CoreError::Conflict("rejected".into()));
        assert_eq!(repo.find_by_id(r.id()).expect("query"), Some(r));

        let missing = ResultId::new(CanonicalUuid::new());
        assert!(matches!(
            repo.update(missing, &mut |_| Ok(())),
            Err(CoreError::NotFound { entity: "lab result", .. })
        ));
    }

    #[test]
    fn mrn_is_unique() {
        let repo = InMemoryPatients::new();
        repo.insert(&patient("MRN-1", "Hopper")).expect("insert");
        let err = repo.insert(&patient("MRN-1", "Turing")).expect_err("duplicate");
        assert!(err.is_conflict());
        assert_eq!(repo.find_all().expect("query").len(), 1);
        let kept = repo.find_by_mrn("MRN-1").expect("query").expect("present");
        assert_eq!(kept.last_name().as_str(), "Hopper");
        assert!(repo.find_by_mrn("MRN-2").expect("query").is_none());
    }

    #[test]
    fn last_name_search_is_case_insensitive_substring() {
        let repo = InMemoryPatients::new();
        repo.insert(&patient("MRN-1", "Hopper")).expect("insert");
        repo.insert(&patient("MRN-2", "Grasshopper")).expect("insert");
        repo.insert(&patient("MRN-3", "Turing")).expect("insert");

        let found = repo.search_by_last_name("HOP").expect("query");
        let mrns: Vec<_> = found.iter().map(|p| p.mrn().as_str()).collect();
        assert_eq!(mrns, vec!["MRN-1", "MRN-2"]);
    }
}
