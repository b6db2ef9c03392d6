//! Alert sinks.

use crate::router::AlertAction;
use crate::{NotifyError, NotifyResult};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Destination for alert actions.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Carries out `action`.
    ///
    /// # Errors
    ///
    /// An error means the action was not delivered; the dispatcher keeps the record
    /// uncommitted and emits the action again after a backoff.
    async fn emit(&self, action: &AlertAction) -> NotifyResult<()>;
}

/// Writes every action to the log through `tracing`.
///
/// Panic alerts go out at `ERROR`, everything else at `INFO`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn emit(&self, action: &AlertAction) -> NotifyResult<()> {
        let patient_id = action.patient_id().unwrap_or("unknown");
        match action {
            AlertAction::PanicAlert {
                result,
                notify_within,
            } => {
                let minutes = notify_within.as_secs() / 60;
                tracing::error!(patient_id, "CRITICAL VALUE ALERT");
                tracing::error!(patient_id, "{result}");
                tracing::error!(
                    patient_id,
                    notify_within_minutes = minutes,
                    "ACTION REQUIRED: notify ordering clinician within {minutes} minutes"
                );
            }
            AlertAction::ResultLogged(result) => {
                tracing::info!(patient_id, "Lab result received: {result}");
            }
            AlertAction::AdmissionWorkflow(p) => {
                tracing::info!(
                    patient_id,
                    "ALERT: {p} has been ADMITTED. Initiating admission workflow."
                );
            }
            AlertAction::DischargeSummary(p) => {
                tracing::info!(
                    patient_id,
                    "ALERT: {p} has been DISCHARGED. Generating discharge summary."
                );
            }
            AlertAction::TransferNotification(p) => {
                tracing::info!(
                    patient_id,
                    "ALERT: {p} TRANSFER initiated. Notifying receiving unit."
                );
            }
            AlertAction::RegistrationLogged(p) => {
                tracing::info!(patient_id, "New patient registered: {p}");
            }
            AlertAction::Unhandled { event_type, .. } => {
                tracing::info!(
                    patient_id,
                    event_type = %event_type,
                    "Received event with no alert workflow"
                );
            }
        }
        Ok(())
    }
}

/// Forwards actions to an in-process channel.
#[derive(Clone, Debug)]
pub struct ChannelAlertSink {
    tx: mpsc::UnboundedSender<AlertAction>,
}

impl ChannelAlertSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AlertAction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl AlertSink for ChannelAlertSink {
    async fn emit(&self, action: &AlertAction) -> NotifyResult<()> {
        self.tx
            .send(action.clone())
            .map_err(|_| NotifyError::SinkClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{PatientSummary, ResultSummary};
    use std::time::Duration;

    fn panic_alert() -> AlertAction {
        AlertAction::PanicAlert {
            result: ResultSummary {
                patient_id: Some("p-1".into()),
                test_name: Some("Potassium".into()),
                value: Some(6.9),
                unit: Some("mmol/L".into()),
                flag: None,
            },
            notify_within: Duration::from_secs(1800),
        }
    }

    #[tokio::test]
    async fn tracing_sink_accepts_every_action() {
        let summary = PatientSummary {
            patient_id: None,
            mrn: Some("MRN-1".into()),
            patient_name: None,
            previous_status: None,
            new_status: None,
        };
        for action in [
            panic_alert(),
            AlertAction::AdmissionWorkflow(summary.clone()),
            AlertAction::DischargeSummary(summary.clone()),
            AlertAction::TransferNotification(summary.clone()),
            AlertAction::RegistrationLogged(summary),
            AlertAction::Unhandled {
                event_type: "X".into(),
                patient_id: None,
            },
        ] {
            TracingAlertSink.emit(&action).await.expect("emit");
        }
    }

    #[tokio::test]
    async fn channel_sink_forwards_and_reports_closure() {
        let (sink, mut rx) = ChannelAlertSink::new();
        sink.emit(&panic_alert()).await.expect("emit");
        assert_eq!(rx.recv().await, Some(panic_alert()));

        drop(rx);
        assert!(matches!(
            sink.emit(&panic_alert()).await,
            Err(NotifyError::SinkClosed)
        ));
    }
}
