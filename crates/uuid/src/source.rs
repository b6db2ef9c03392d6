//! Identity and time sources consumed by the core services.
//!
//! Services never call `Utc::now()` or `Uuid::new_v4()` directly; they ask an injected
//! [`Clock`] and [`IdGenerator`]. Production wiring uses [`MonotonicClock`] and [`RandomIds`].

use crate::{CanonicalUuid, EventId, PatientId, ResultId};
use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Source of globally unique identifiers.
pub trait IdGenerator: Send + Sync {
    fn next_uuid(&self) -> CanonicalUuid;

    fn patient_id(&self) -> PatientId {
        PatientId::new(self.next_uuid())
    }

    fn result_id(&self) -> ResultId {
        ResultId::new(self.next_uuid())
    }

    fn event_id(&self) -> EventId {
        EventId::new(self.next_uuid())
    }
}

/// Random v4 identifiers.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_uuid(&self) -> CanonicalUuid {
        CanonicalUuid::new()
    }
}

/// Wall-clock time that never goes backwards and never repeats.
///
/// If the system clock reads at or before the previously issued instant, the result is the
/// previous instant plus one millisecond. Report timestamps and event timestamps therefore
/// order the same way the calls did.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let issued = match *last {
            Some(prev) if now <= prev => prev + Duration::milliseconds(1),
            _ => now,
        };
        *last = Some(issued);
        issued
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    at: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at: Mutex::new(at) }
    }

    pub fn advance(&self, by: Duration) {
        let mut at = self.at.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *at += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.at.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
