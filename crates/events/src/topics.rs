//! Logical channels and the topic names they map to.

/// Default topic for lab result events.
pub const DEFAULT_LAB_RESULTS_TOPIC: &str = "lab.results";

/// Default topic for patient status events.
pub const DEFAULT_PATIENT_EVENTS_TOPIC: &str = "patient.events";

/// The two logical event channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    LabResults,
    PatientEvents,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::LabResults, Channel::PatientEvents];
}

/// Concrete topic names for each channel, resolved from configuration at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicNames {
    pub lab_results: String,
    pub patient_events: String,
}

impl TopicNames {
    pub fn new(lab_results: impl Into<String>, patient_events: impl Into<String>) -> Self {
        Self {
            lab_results: lab_results.into(),
            patient_events: patient_events.into(),
        }
    }

    pub fn for_channel(&self, channel: Channel) -> &str {
        match channel {
            Channel::LabResults => &self.lab_results,
            Channel::PatientEvents => &self.patient_events,
        }
    }
}

impl Default for TopicNames {
    fn default() -> Self {
        Self::new(DEFAULT_LAB_RESULTS_TOPIC, DEFAULT_PATIENT_EVENTS_TOPIC)
    }
}
