use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use clinicalflow_bus::{BusConfig, InMemoryBus};
use clinicalflow_core::config::{
    lab_results_topic_from_env_value, partitions_from_env_value,
    patient_events_topic_from_env_value, producer_retries_from_env_value,
};
use clinicalflow_core::constants::{
    LAB_RESULTS_TOPIC_ENV, PARTITIONS_ENV, PATIENT_EVENTS_TOPIC_ENV, PRODUCER_RETRIES_ENV,
};
use clinicalflow_core::{evaluate, CoreConfig, CoreServices, NewLabResult, NewPatient};
use clinicalflow_events::TopicNames;
use clinicalflow_notify::config::{
    consumer_group_from_env_value, critical_notify_minutes_from_env_value, CONSUMER_GROUP_ENV,
    CRITICAL_NOTIFY_MINUTES_ENV,
};
use clinicalflow_notify::{NotificationWorkers, NotifyConfig, TracingAlertSink};
use clinicalflow_uuid::{IdGenerator, MonotonicClock, PatientId, RandomIds};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long the notification workers get to catch up with everything published.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
const DRAIN_POLL: Duration = Duration::from_millis(10);

#[derive(Parser)]
#[command(name = "clinicalflow")]
#[command(about = "Lab result flagging and clinical alert routing")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Flag a value against a reference range
    Evaluate {
        /// Measured value
        #[arg(allow_negative_numbers = true)]
        value: f64,
        /// Lower bound of the reference range
        #[arg(long, allow_negative_numbers = true)]
        min: Option<f64>,
        /// Upper bound of the reference range
        #[arg(long, allow_negative_numbers = true)]
        max: Option<f64>,
    },
    /// Submit one lab result and route it through the notification workers
    Submit {
        /// Test name, e.g. Potassium
        test_name: String,
        /// Measured value
        #[arg(allow_negative_numbers = true)]
        value: f64,
        /// Unit of measure
        unit: String,
        /// Patient UUID (a new one is generated if omitted)
        #[arg(long)]
        patient_id: Option<String>,
        /// Lower bound of the reference range
        #[arg(long, allow_negative_numbers = true)]
        min: Option<f64>,
        /// Upper bound of the reference range
        #[arg(long, allow_negative_numbers = true)]
        max: Option<f64>,
    },
    /// Run the reference scenarios end to end
    Scenario,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clinicalflow=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Evaluate { value, min, max }) => {
            println!("{}", evaluate(value, min, max).as_str());
        }
        Some(Commands::Submit {
            test_name,
            value,
            unit,
            patient_id,
            min,
            max,
        }) => {
            let patient_id = match patient_id {
                Some(raw) => PatientId::parse(&raw).context("invalid patient id")?,
                None => RandomIds.patient_id(),
            };
            let mut draft = NewLabResult::new(patient_id, test_name, value, unit);
            draft.reference_min = min;
            draft.reference_max = max;

            let pipeline = Pipeline::start(load_config()?)?;
            let submitted = pipeline.core.lab_results.submit_result(&draft)?;
            let delivery = submitted.receipt.outcome().await?;
            tracing::info!(%delivery, result_id = %submitted.record.id(), "result submitted");
            pipeline.drain().await?;
            println!("{}", serde_json::to_string_pretty(&submitted.record)?);
            pipeline.stop().await;
        }
        Some(Commands::Scenario) => {
            let pipeline = Pipeline::start(load_config()?)?;
            let report = run_scenarios(&pipeline).await?;
            pipeline.drain().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            pipeline.stop().await;
        }
        None => {
            println!("Use 'clinicalflow --help' for commands");
        }
    }

    Ok(())
}

/// Reads every setting from the environment once.
fn load_config() -> anyhow::Result<(CoreConfig, NotifyConfig)> {
    let topics = TopicNames::new(
        lab_results_topic_from_env_value(env(LAB_RESULTS_TOPIC_ENV)),
        patient_events_topic_from_env_value(env(PATIENT_EVENTS_TOPIC_ENV)),
    );
    let core = CoreConfig::new(
        topics.clone(),
        partitions_from_env_value(env(PARTITIONS_ENV))?,
        producer_retries_from_env_value(env(PRODUCER_RETRIES_ENV))?,
    )?;
    let notify = NotifyConfig::new(
        consumer_group_from_env_value(env(CONSUMER_GROUP_ENV)),
        critical_notify_minutes_from_env_value(env(CRITICAL_NOTIFY_MINUTES_ENV))?,
        topics,
    );
    Ok((core, notify))
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Producer services, the in-memory bus and the notification workers in one process.
struct Pipeline {
    bus: InMemoryBus,
    core: CoreServices,
    workers: NotificationWorkers,
    notify_cfg: NotifyConfig,
}

impl Pipeline {
    fn start((core_cfg, notify_cfg): (CoreConfig, NotifyConfig)) -> anyhow::Result<Self> {
        let bus = InMemoryBus::new(BusConfig {
            producer_retries: core_cfg.producer_retries(),
            ..BusConfig::default()
        });
        for topic in [&core_cfg.topics().lab_results, &core_cfg.topics().patient_events] {
            bus.create_topic(topic, core_cfg.partitions())?;
        }

        let core = CoreServices::start(
            Arc::new(core_cfg),
            Arc::new(bus.clone()),
            Arc::new(RandomIds),
            Arc::new(MonotonicClock::new()),
        );
        let workers = NotificationWorkers::start(&bus, &notify_cfg, Arc::new(TracingAlertSink))?;

        Ok(Self {
            bus,
            core,
            workers,
            notify_cfg,
        })
    }

    /// Waits until the consumer group has committed every record on both topics.
    async fn drain(&self) -> anyhow::Result<()> {
        tokio::time::timeout(DRAIN_TIMEOUT, async {
            while !self.caught_up() {
                tokio::time::sleep(DRAIN_POLL).await;
            }
        })
        .await
        .context("notification workers did not catch up")
    }

    fn caught_up(&self) -> bool {
        let group = &self.notify_cfg.consumer_group;
        let topics = &self.notify_cfg.topics;
        [&topics.lab_results, &topics.patient_events]
            .into_iter()
            .all(|topic| {
                let partitions = self.bus.partition_count(topic).unwrap_or(0);
                (0..partitions).all(|p| {
                    let end = self.bus.end_offset(topic, p).unwrap_or(0);
                    let committed = self.bus.committed_offset(group, topic, p).unwrap_or(0);
                    committed >= end
                })
            })
    }

    async fn stop(self) {
        self.core.shutdown().await;
        for report in self.workers.shutdown().await {
            tracing::info!(
                topic = %report.topic,
                partition = report.partition,
                emitted = report.emitted,
                rejected = report.rejected,
                "worker summary"
            );
        }
    }
}

/// Normal, critical and low results for one patient, then an admit and discharge.
async fn run_scenarios(pipeline: &Pipeline) -> anyhow::Result<serde_json::Value> {
    let labs = &pipeline.core.lab_results;
    let patients = &pipeline.core.patients;

    let patient = patients.register(&NewPatient {
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        date_of_birth: NaiveDate::from_ymd_opt(1965, 12, 10),
        mrn: "MRN-0042".into(),
    })?;
    patient.receipt.outcome().await?;
    let patient_id = patient.record.id();

    let mut results = Vec::new();
    for value in [15.0, 28.0, 8.0] {
        let draft = NewLabResult::new(patient_id, "Calcium", value, "mg/dL")
            .with_reference_range(10.0, 20.0);
        let submitted = labs.submit_result(&draft)?;
        submitted.receipt.outcome().await?;
        results.push(submitted.record);
    }

    patients.admit(patient_id)?.receipt.outcome().await?;
    let discharged = patients.discharge(patient_id)?;
    discharged.receipt.outcome().await?;

    Ok(json!({
        "patient": discharged.record,
        "results": results,
        "criticalResults": labs.find_critical_results()?,
    }))
}
