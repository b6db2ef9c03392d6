//! Clinical enumerations shared by services, wire events and alert routing.
//!
//! Wire names are the upper-case forms (`CRITICAL`, `REPORTED`, `ADMITTED`), matching what
//! downstream consumers already parse.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Clinical interpretation of a lab value against its reference range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Flag {
    Normal,
    Low,
    High,
    /// Panic value: outside the reference range by more than half its width.
    Critical,
}

impl Flag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Low => "LOW",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Critical)
    }

    pub fn is_abnormal(&self) -> bool {
        !matches!(self, Self::Normal)
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Flag {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NORMAL" => Ok(Self::Normal),
            "LOW" => Ok(Self::Low),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(ParseError::UnknownFlag(other.to_string())),
        }
    }
}

/// Lifecycle state of a lab result.
///
/// States only move forward: `Pending -> Reported -> Verified`. Reporting is a single step;
/// clinician verification may also be applied to a result that was never reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    Pending,
    Reported,
    Verified,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Reported => "REPORTED",
            Self::Verified => "VERIFIED",
        }
    }

    /// The only state this one may advance to, if any.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Reported),
            Self::Reported => Some(Self::Verified),
            Self::Verified => None,
        }
    }

    /// Returns true if moving from `self` to `target` is a single forward step.
    pub fn can_advance_to(&self, target: Self) -> bool {
        self.next() == Some(target)
    }

    /// Returns true if a clinician may verify a result in this state.
    pub fn can_verify(&self) -> bool {
        matches!(self, Self::Pending | Self::Reported)
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "REPORTED" => Ok(Self::Reported),
            "VERIFIED" => Ok(Self::Verified),
            other => Err(ParseError::UnknownResultStatus(other.to_string())),
        }
    }
}

/// Where a patient currently is in the encounter workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatientStatus {
    Registered,
    Admitted,
    Discharged,
    Transferred,
}

impl PatientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "REGISTERED",
            Self::Admitted => "ADMITTED",
            Self::Discharged => "DISCHARGED",
            Self::Transferred => "TRANSFERRED",
        }
    }
}

impl fmt::Display for PatientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatientStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REGISTERED" => Ok(Self::Registered),
            "ADMITTED" => Ok(Self::Admitted),
            "DISCHARGED" => Ok(Self::Discharged),
            "TRANSFERRED" => Ok(Self::Transferred),
            other => Err(ParseError::UnknownPatientStatus(other.to_string())),
        }
    }
}
