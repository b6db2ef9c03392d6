//! # ClinicalFlow Core
//!
//! Core business logic for the lab result and patient registry services.
//!
//! This crate contains the producing side of the pipeline:
//! - Deterministic flag evaluation of a lab value against its reference range
//! - Lab result and patient models with their lifecycle rules
//! - Repository traits with in-memory implementations
//! - Services that persist a change and then publish exactly one event for it
//! - The fire-and-forget [`EventPublisher`]
//!
//! **No transport concerns**: partitioning, delivery and consumer groups belong in
//! `clinicalflow-bus`; consuming and alerting belong in `clinicalflow-notify`.

pub mod config;
pub mod constants;
pub mod error;
pub mod flag;
pub mod lab_result;
pub mod patient;
pub mod publisher;
pub mod repositories;
pub mod services;
pub mod validation;

pub use config::CoreConfig;
pub use error::{CoreError, CoreResult};
pub use flag::evaluate;
pub use lab_result::{NewLabResult, ReferenceRange, ResultRecord};
pub use patient::{NewPatient, Patient, PatientUpdate};
pub use publisher::{EventPublisher, PublishFailure, PublishReceipt};
pub use services::{CoreServices, LabResultService, PatientService, Published, ServiceDeps};

pub use clinicalflow_types::{Flag, NonEmptyText, PatientStatus, ResultStatus};
