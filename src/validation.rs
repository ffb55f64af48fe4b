//! Client-side request validation, applied before any network traffic.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ArchiverError, Result};
use crate::types::TimeRange;

// EPICS record names: alphanumerics plus the usual field punctuation.
static PV_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9:_\-.;<>\[\]{}]+$").expect("valid regex"));

// Same alphabet plus the glob metacharacters accepted by getAllPVs.
static PV_PATTERN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9:_\-.;<>\[\]{}*?]+$").expect("valid regex"));

/// Validates a concrete PV name.
pub fn validate_pv_name(pv: &str) -> Result<()> {
    if pv.is_empty() {
        return Err(ArchiverError::invalid_request("PV name cannot be empty"));
    }
    if pv.contains(char::is_whitespace) {
        return Err(ArchiverError::invalid_request(format!(
            "PV name cannot contain whitespace: '{pv}'"
        )));
    }
    if !PV_NAME_RE.is_match(pv) {
        return Err(ArchiverError::invalid_request(format!(
            "PV name contains invalid characters: '{pv}'"
        )));
    }
    Ok(())
}

/// Validates a glob-style PV filter pattern.
pub fn validate_pv_pattern(pattern: &str) -> Result<()> {
    if pattern.is_empty() {
        return Err(ArchiverError::invalid_request("PV pattern cannot be empty"));
    }
    if !PV_PATTERN_RE.is_match(pattern) {
        return Err(ArchiverError::invalid_request(format!(
            "PV pattern contains invalid characters: '{pattern}'"
        )));
    }
    Ok(())
}

/// Validates a request time range.
pub fn validate_time_range(range: &TimeRange) -> Result<()> {
    if range.end <= range.start {
        return Err(ArchiverError::invalid_request(
            "invalid time range: end must be after start",
        ));
    }
    Ok(())
}
