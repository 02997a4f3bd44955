// =====================================================================================
// File: core-utils/src/validation.rs
// Description: Validation utilities for the AETIM platform
// =====================================================================================

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Validation result
pub type ValidationResult = Result<(), ValidationError>;

/// Validation error with field-specific messages
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationError {
    pub errors: HashMap<String, Vec<String>>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, field: &str, message: &str) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationError) {
        for (field, messages) in other.errors {
            for message in messages {
                self.add_error(&field, &message);
            }
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let messages: Vec<String> = self
            .errors
            .iter()
            .flat_map(|(field, errors)| {
                errors
                    .iter()
                    .map(move |error| format!("{}: {}", field, error))
            })
            .collect();
        write!(f, "{}", messages.join(", "))
    }
}

impl std::error::Error for ValidationError {}

static CVE_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^CVE-(\d{4})-(\d{4,7})$").expect("valid CVE pattern"));

static EMAIL_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern"));

/// Common validation functions
pub struct Validate;

impl Validate {
    /// Validate that a string is not empty
    pub fn not_empty(value: &str, field: &str) -> ValidationResult {
        if value.trim().is_empty() {
            let mut error = ValidationError::new();
            error.add_error(field, "cannot be empty");
            Err(error)
        } else {
            Ok(())
        }
    }

    /// Validate string length
    pub fn length(
        value: &str,
        field: &str,
        min: Option<usize>,
        max: Option<usize>,
    ) -> ValidationResult {
        let len = value.len();
        let mut error = ValidationError::new();

        if let Some(min_len) = min {
            if len < min_len {
                error.add_error(
                    field,
                    &format!("must be at least {} characters long", min_len),
                );
            }
        }

        if let Some(max_len) = max {
            if len > max_len {
                error.add_error(field, &format!("must be at most {} characters long", max_len));
            }
        }

        if error.has_errors() {
            Err(error)
        } else {
            Ok(())
        }
    }

    /// Validate that a score falls inside [0.0, 10.0]
    pub fn score_range(value: f64, field: &str) -> ValidationResult {
        if !(0.0..=10.0).contains(&value) || value.is_nan() {
            let mut error = ValidationError::new();
            error.add_error(field, "must be between 0.0 and 10.0");
            Err(error)
        } else {
            Ok(())
        }
    }

    /// Validate that a confidence falls inside [0.0, 1.0]
    pub fn confidence_range(value: f64, field: &str) -> ValidationResult {
        if !(0.0..=1.0).contains(&value) || value.is_nan() {
            let mut error = ValidationError::new();
            error.add_error(field, "must be between 0.0 and 1.0");
            Err(error)
        } else {
            Ok(())
        }
    }

    /// Validate canonical CVE identifier form (CVE-YYYY-NNNNN, year 1999-2099)
    pub fn cve_format(value: &str, field: &str) -> ValidationResult {
        let mut error = ValidationError::new();
        match CVE_FORMAT.captures(value) {
            Some(caps) => {
                let year: i32 = caps[1].parse().unwrap_or(0);
                if !(1999..=2099).contains(&year) {
                    error.add_error(field, "CVE year must be between 1999 and 2099");
                }
            }
            None => error.add_error(field, "must match CVE-YYYY-NNNNN"),
        }
        if error.has_errors() {
            Err(error)
        } else {
            Ok(())
        }
    }

    /// Validate an email address
    pub fn email(value: &str, field: &str) -> ValidationResult {
        if EMAIL_FORMAT.is_match(value) {
            Ok(())
        } else {
            let mut error = ValidationError::new();
            error.add_error(field, "is not a valid email address");
            Err(error)
        }
    }

    /// Validate an http(s) URL
    pub fn url(value: &str, field: &str) -> ValidationResult {
        if value.starts_with("http://") || value.starts_with("https://") {
            Ok(())
        } else {
            let mut error = ValidationError::new();
            error.add_error(field, "must be an http(s) URL");
            Err(error)
        }
    }
}
