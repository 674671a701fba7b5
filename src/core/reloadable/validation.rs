//! Validation helpers for reloadable components
//!
//! Each helper returns a [`ReloadError::Validation`] naming the offending
//! field, or [`ReloadError::NotReloadable`] for [`ensure_unchanged`].

use crate::core::errors::ReloadError;
use std::fmt::Display;

/// Fail with `reason` unless `condition` holds
pub fn ensure(condition: bool, field: &str, reason: impl Into<String>) -> Result<(), ReloadError> {
    if condition {
        Ok(())
    } else {
        Err(ReloadError::validation(field, reason))
    }
}

/// Inclusive range check
pub fn ensure_range<T>(value: T, min: T, max: T, field: &str) -> Result<(), ReloadError>
where
    T: PartialOrd + Display + Copy,
{
    ensure(
        value >= min && value <= max,
        field,
        format!("{value} is out of range {min}..={max}"),
    )
}

pub fn ensure_one_of(value: &str, allowed: &[&str], field: &str) -> Result<(), ReloadError> {
    ensure(
        allowed.contains(&value),
        field,
        format!("{value:?} is not one of {}", allowed.join(", ")),
    )
}

/// Reject a change to a setting that only takes effect on restart
pub fn ensure_unchanged<T: PartialEq>(current: &T, next: &T, field: &str) -> Result<(), ReloadError> {
    if current == next {
        Ok(())
    } else {
        Err(ReloadError::not_reloadable(field))
    }
}
