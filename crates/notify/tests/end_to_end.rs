//! Producer services through the in-memory bus to the notification workers.

use async_trait::async_trait;
use chrono::NaiveDate;
use clinicalflow_bus::{BusConfig, Delivery, EventTransport, InMemoryBus, OutboundRecord};
use clinicalflow_core::{
    CoreConfig, CoreServices, Flag, NewLabResult, NewPatient, PatientStatus, PublishFailure,
};
use clinicalflow_events::{decode, DecodedBody, DecodedEvent, EventType, TopicNames};
use clinicalflow_notify::{
    AlertAction, AlertSink, ChannelAlertSink, NotificationWorkers, NotifyConfig, NotifyError,
    NotifyResult, Severity,
};
use clinicalflow_uuid::{CanonicalUuid, MonotonicClock, PatientId, RandomIds};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

struct Pipeline {
    bus: InMemoryBus,
    core: CoreServices,
    workers: NotificationWorkers,
    alerts: UnboundedReceiver<AlertAction>,
}

/// Refuses the first action, then forwards everything.
struct RefusesOnce {
    refused: AtomicBool,
    inner: ChannelAlertSink,
}

#[async_trait]
impl AlertSink for RefusesOnce {
    async fn emit(&self, action: &AlertAction) -> NotifyResult<()> {
        if !self.refused.swap(true, Ordering::SeqCst) {
            return Err(NotifyError::SinkClosed);
        }
        self.inner.emit(action).await
    }
}

fn pipeline(producer_retries: u32) -> Pipeline {
    pipeline_with_sink(producer_retries, |channel| -> Arc<dyn AlertSink> { Arc::new(channel) })
}

fn pipeline_with_sink(
    producer_retries: u32,
    sink: impl FnOnce(ChannelAlertSink) -> Arc<dyn AlertSink>,
) -> Pipeline {
    let cfg = Arc::new(
        CoreConfig::new(TopicNames::default(), 3, producer_retries).expect("config"),
    );
    let bus = InMemoryBus::new(BusConfig {
        producer_retries: cfg.producer_retries(),
        retry_backoff: Duration::from_millis(1),
    });
    bus.create_topic(&cfg.topics().lab_results, cfg.partitions())
        .expect("topic");
    bus.create_topic(&cfg.topics().patient_events, cfg.partitions())
        .expect("topic");

    let core = CoreServices::start(
        cfg,
        Arc::new(bus.clone()),
        Arc::new(RandomIds),
        Arc::new(MonotonicClock::new()),
    );
    let (channel, alerts) = ChannelAlertSink::new();
    let notify_cfg = NotifyConfig {
        sink_retry_backoff: Duration::from_millis(5),
        ..NotifyConfig::default()
    };
    let workers = NotificationWorkers::start(&bus, &notify_cfg, sink(channel)).expect("workers");

    Pipeline {
        bus,
        core,
        workers,
        alerts,
    }
}

async fn next_alert(alerts: &mut UnboundedReceiver<AlertAction>) -> AlertAction {
    tokio::time::timeout(Duration::from_secs(5), alerts.recv())
        .await
        .expect("alert within 5s")
        .expect("sink open")
}

/// Reads back the record at `delivery` through a separate consumer group.
fn wire_event(bus: &InMemoryBus, delivery: &Delivery) -> DecodedEvent {
    let mut audit = bus
        .assign("audit", &delivery.topic, delivery.partition)
        .expect("assign");
    while let Some(record) = audit.try_recv() {
        if record.offset == delivery.offset {
            return decode(&record.payload).expect("decodable");
        }
    }
    panic!("no record at {delivery}");
}

fn lab_event_type(event: &DecodedEvent) -> EventType {
    match &event.body {
        DecodedBody::LabResult(fields) => fields.event_type,
        other => panic!("expected lab result, got {other:?}"),
    }
}

fn new_patient_id() -> PatientId {
    PatientId::new(CanonicalUuid::new())
}

fn result(patient: PatientId, value: f64) -> NewLabResult {
    NewLabResult::new(patient, "Calcium", value, "mg/dL").with_reference_range(10.0, 20.0)
}

#[tokio::test]
async fn normal_result_is_reported_and_logged() {
    let mut p = pipeline(3);
    let patient = new_patient_id();

    let done = p
        .core
        .lab_results
        .submit_result(&result(patient, 15.0))
        .expect("submit");
    assert_eq!(done.record.flag(), Flag::Normal);
    let delivery = done.receipt.outcome().await.expect("published");
    assert_eq!(lab_event_type(&wire_event(&p.bus, &delivery)), EventType::ResultReported);

    match next_alert(&mut p.alerts).await {
        AlertAction::ResultLogged(summary) => {
            assert_eq!(summary.flag, Some(Flag::Normal));
            assert_eq!(summary.patient_id, Some(patient.to_string()));
            assert_eq!(summary.value, Some(15.0));
        }
        other => panic!("expected informational result log, got {other:?}"),
    }
    p.workers.shutdown().await;
}

#[tokio::test]
async fn critical_result_raises_panic_alert() {
    let mut p = pipeline(3);
    let patient = new_patient_id();

    let done = p
        .core
        .lab_results
        .submit_result(&result(patient, 28.0))
        .expect("submit");
    assert_eq!(done.record.flag(), Flag::Critical);
    let delivery = done.receipt.outcome().await.expect("published");
    let event = wire_event(&p.bus, &delivery);
    assert_eq!(lab_event_type(&event), EventType::CriticalResult);

    let action = next_alert(&mut p.alerts).await;
    assert_eq!(action.severity(), Severity::Panic);
    match action {
        AlertAction::PanicAlert {
            result,
            notify_within,
        } => {
            assert_eq!(notify_within, Duration::from_secs(30 * 60));
            assert_eq!(result.test_name.as_deref(), Some("Calcium"));
            assert_eq!(result.value, Some(28.0));
            assert_eq!(result.unit.as_deref(), Some("mg/dL"));
            assert_eq!(result.flag, Some(Flag::Critical));
        }
        other => panic!("expected panic alert, got {other:?}"),
    }
    p.workers.shutdown().await;
}

#[tokio::test]
async fn low_result_is_informational() {
    let mut p = pipeline(3);

    let done = p
        .core
        .lab_results
        .submit_result(&result(new_patient_id(), 8.0))
        .expect("submit");
    assert_eq!(done.record.flag(), Flag::Low);
    let delivery = done.receipt.outcome().await.expect("published");
    assert_eq!(lab_event_type(&wire_event(&p.bus, &delivery)), EventType::ResultReported);

    let action = next_alert(&mut p.alerts).await;
    assert_eq!(action.severity(), Severity::Info);
    assert!(matches!(action, AlertAction::ResultLogged(ref s) if s.flag == Some(Flag::Low)));
    p.workers.shutdown().await;
}

#[tokio::test]
async fn discharge_triggers_discharge_workflow() {
    let mut p = pipeline(3);
    let patients = &p.core.patients;

    let registered = patients
        .register(&NewPatient {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            date_of_birth: NaiveDate::from_ymd_opt(1965, 12, 10),
            mrn: "MRN-0042".into(),
        })
        .expect("register");
    let id = registered.record.id();
    patients.admit(id).expect("admit");
    let discharged = patients.discharge(id).expect("discharge");
    let delivery = discharged.receipt.outcome().await.expect("published");

    match &wire_event(&p.bus, &delivery).body {
        DecodedBody::Patient(fields) => {
            assert_eq!(fields.event_type, EventType::PatientDischarged);
            assert_eq!(fields.previous_status, Some(PatientStatus::Admitted));
            assert_eq!(fields.new_status, Some(PatientStatus::Discharged));
        }
        other => panic!("expected patient event, got {other:?}"),
    }

    assert!(matches!(next_alert(&mut p.alerts).await, AlertAction::RegistrationLogged(_)));
    assert!(matches!(next_alert(&mut p.alerts).await, AlertAction::AdmissionWorkflow(_)));
    match next_alert(&mut p.alerts).await {
        AlertAction::DischargeSummary(summary) => {
            assert_eq!(summary.mrn.as_deref(), Some("MRN-0042"));
            assert_eq!(summary.patient_name.as_deref(), Some("Ada Lovelace"));
            assert_eq!(summary.patient_id, Some(id.to_string()));
            assert_eq!(summary.previous_status, Some(PatientStatus::Admitted));
        }
        other => panic!("expected discharge workflow, got {other:?}"),
    }
    p.workers.shutdown().await;
}

#[tokio::test]
async fn malformed_envelope_does_not_stop_the_partition() {
    let mut p = pipeline(3);
    let patient = new_patient_id();

    // Same key, so the same partition as the valid results that follow.
    p.bus
        .send(OutboundRecord {
            topic: "lab.results".into(),
            key: patient.to_string(),
            payload: format!(r#"{{"patientId":"{patient}","testName":"Calcium"}}"#).into_bytes(),
        })
        .await
        .expect("raw send");

    for value in [12.0, 19.0] {
        p.core
            .lab_results
            .submit_result(&result(patient, value))
            .expect("submit")
            .receipt
            .outcome()
            .await
            .expect("published");
    }

    for expected in [12.0, 19.0] {
        match next_alert(&mut p.alerts).await {
            AlertAction::ResultLogged(summary) => assert_eq!(summary.value, Some(expected)),
            other => panic!("expected result log, got {other:?}"),
        }
    }

    let reports = p.workers.shutdown().await;
    assert_eq!(reports.iter().map(|r| r.rejected).sum::<u64>(), 1);
    assert_eq!(reports.iter().map(|r| r.emitted).sum::<u64>(), 2);
}

#[tokio::test]
async fn same_patient_events_arrive_in_publish_order() {
    let mut p = pipeline(3);
    let patient = new_patient_id();
    let others: Vec<_> = (0..4).map(|_| new_patient_id()).collect();

    let values: Vec<f64> = (0..20).map(|i| 10.0 + f64::from(i) * 0.5).collect();
    for (i, value) in values.iter().enumerate() {
        p.core
            .lab_results
            .submit_result(&result(patient, *value))
            .expect("submit");
        // Interleave traffic for other patients, which may land on other partitions.
        p.core
            .lab_results
            .submit_result(&result(others[i % others.len()], 15.0))
            .expect("submit");
    }

    let mut seen = Vec::new();
    while seen.len() < values.len() {
        if let AlertAction::ResultLogged(summary) = next_alert(&mut p.alerts).await {
            if summary.patient_id == Some(patient.to_string()) {
                seen.push(summary.value.expect("value"));
            }
        }
    }
    assert_eq!(seen, values);
    p.workers.shutdown().await;
}

#[tokio::test]
async fn transient_failures_are_masked_by_producer_retries() {
    let mut p = pipeline(3);
    p.bus.fail_next_sends(2);

    let done = p
        .core
        .lab_results
        .submit_result(&result(new_patient_id(), 28.0))
        .expect("submit");
    done.receipt.outcome().await.expect("published after retries");
    assert_eq!(next_alert(&mut p.alerts).await.severity(), Severity::Panic);
    p.workers.shutdown().await;
}

#[tokio::test]
async fn exhausted_retries_are_reported_without_failing_submission() {
    let mut p = pipeline(1);
    p.bus.fail_next_sends(2);

    let lost = p
        .core
        .lab_results
        .submit_result(&result(new_patient_id(), 15.0))
        .expect("submission still succeeds");
    match lost.receipt.outcome().await {
        Err(PublishFailure::Transport { event_id, .. }) => {
            assert_ne!(event_id.to_string(), "");
        }
        other => panic!("expected transport failure, got {other:?}"),
    }
    let stored = p
        .core
        .lab_results
        .find_by_id(lost.record.id())
        .expect("persisted regardless");
    assert_eq!(stored, lost.record);

    // The pipeline keeps working once the substrate recovers.
    let patient = new_patient_id();
    p.core
        .lab_results
        .submit_result(&result(patient, 15.0))
        .expect("submit")
        .receipt
        .outcome()
        .await
        .expect("published");
    match next_alert(&mut p.alerts).await {
        AlertAction::ResultLogged(summary) => {
            assert_eq!(summary.patient_id, Some(patient.to_string()))
        }
        other => panic!("expected result log, got {other:?}"),
    }

    p.core.shutdown().await;
    p.workers.shutdown().await;
}

#[tokio::test]
async fn panic_alerts_survive_a_refused_emit() {
    let mut p = pipeline_with_sink(3, |inner| -> Arc<dyn AlertSink> {
        Arc::new(RefusesOnce {
            refused: AtomicBool::new(false),
            inner,
        })
    });
    let patient = new_patient_id();

    let values = [28.0, 30.0, 32.0];
    for value in values {
        p.core
            .lab_results
            .submit_result(&result(patient, value))
            .expect("submit")
            .receipt
            .outcome()
            .await
            .expect("published");
    }

    for expected in values {
        match next_alert(&mut p.alerts).await {
            AlertAction::PanicAlert { result, .. } => assert_eq!(result.value, Some(expected)),
            other => panic!("expected panic alert, got {other:?}"),
        }
    }

    let reports = p.workers.shutdown().await;
    assert_eq!(reports.iter().map(|r| r.sink_failures).sum::<u64>(), 1);
    assert_eq!(reports.iter().map(|r| r.emitted).sum::<u64>(), 3);
    assert!(reports.iter().all(|r| r.left_uncommitted.is_none()));
}
