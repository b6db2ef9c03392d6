//! Lab result and patient services.
//!
//! Both services persist first and publish second. A publish problem is logged by the
//! publisher and exposed through the [`PublishReceipt`] in [`Published`]; it never fails the
//! operation or rolls back the stored state.

pub mod lab_results;
pub mod patients;

pub use lab_results::LabResultService;
pub use patients::PatientService;

use crate::publisher::{EventPublisher, PublishReceipt};
use crate::repositories::memory::{InMemoryLabResults, InMemoryPatients};
use crate::CoreConfig;
use clinicalflow_bus::EventTransport;
use clinicalflow_uuid::{Clock, IdGenerator};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// The stored state after an evented operation, plus the receipt for its event.
#[derive(Debug)]
pub struct Published<T> {
    pub record: T,
    pub receipt: PublishReceipt,
}

/// Identity, time and publishing shared by the services.
#[derive(Clone)]
pub struct ServiceDeps {
    pub ids: Arc<dyn IdGenerator>,
    pub clock: Arc<dyn Clock>,
    pub publisher: EventPublisher,
}

/// Both services wired to in-memory stores and one publisher task.
pub struct CoreServices {
    pub lab_results: LabResultService,
    pub patients: PatientService,
    publisher_task: JoinHandle<()>,
}

impl CoreServices {
    /// Starts the publisher on the current tokio runtime and builds both services.
    pub fn start(
        cfg: Arc<CoreConfig>,
        transport: Arc<dyn EventTransport>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (publisher, publisher_task) = EventPublisher::spawn(transport, cfg.topics().clone());
        let deps = ServiceDeps {
            ids,
            clock,
            publisher,
        };
        tracing::info!(
            lab_results_topic = %cfg.topics().lab_results,
            patient_events_topic = %cfg.topics().patient_events,
            "core services started"
        );
        Self {
            lab_results: LabResultService::new(Arc::new(InMemoryLabResults::new()), deps.clone()),
            patients: PatientService::new(Arc::new(InMemoryPatients::new()), deps),
            publisher_task,
        }
    }

    /// Drops the services and waits until every queued event has been sent.
    pub async fn shutdown(self) {
        let Self {
            lab_results,
            patients,
            publisher_task,
        } = self;
        drop(lab_results);
        drop(patients);
        if let Err(e) = publisher_task.await {
            tracing::error!(error = %e, "publisher task failed");
        }
    }
}
