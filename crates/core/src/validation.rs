//! Input validation utilities.
//!
//! Drafts coming into the services are checked field by field. Every failure is collected so
//! the caller sees the whole list at once instead of fixing one field per round trip.

use crate::{CoreError, CoreResult};
use clinicalflow_types::NonEmptyText;

/// Accumulates field-level validation failures.
#[derive(Debug, Default)]
pub struct FieldErrors {
    errors: Vec<(&'static str, String)>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push((field, message.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Validates a required text field, recording a failure when it is blank.
    pub fn required_text(&mut self, field: &'static str, value: &str) -> Option<NonEmptyText> {
        match NonEmptyText::new(value) {
            Ok(text) => Some(text),
            Err(_) => {
                self.push(field, "must not be blank");
                None
            }
        }
    }

    /// Validates a required finite number.
    pub fn required_finite(&mut self, field: &'static str, value: Option<f64>) -> Option<f64> {
        match value {
            None => {
                self.push(field, "is required");
                None
            }
            Some(v) => self.finite(field, v),
        }
    }

    /// Records a failure for NaN or infinite values.
    pub fn finite(&mut self, field: &'static str, value: f64) -> Option<f64> {
        if value.is_finite() {
            Some(value)
        } else {
            self.push(field, "must be a finite number");
            None
        }
    }

    /// Converts the collected failures into a [`CoreError::Validation`].
    ///
    /// # Errors
    ///
    /// Returns the validation error when at least one failure was recorded.
    pub fn finish(self) -> CoreResult<()> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let message = self
            .errors
            .iter()
            .map(|(field, message)| format!("{field}: {message}"))
            .collect::<Vec<_>>()
            .join(", ");
        Err(CoreError::Validation(message))
    }
}
