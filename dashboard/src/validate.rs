use crate::errors::{Error, Result};
use crate::model::{DeviceInput, UserInput};

/// Characters that would break the `{ns}/bins/{id}/telemetry` topic shape
const TOPIC_RESERVED: [char; 3] = ['/', '+', '#'];

/// Validates a device form. Threshold ranges are deliberately not checked.
pub fn validate_device(input: &DeviceInput) -> Result<()> {
    let id = input.id.trim();
    if id.is_empty() {
        return Err(Error::Validation("Device ID cannot be empty".to_string()));
    }

    if id.len() != input.id.len() {
        return Err(Error::Validation(format!(
            "Device ID '{}' has surrounding whitespace",
            input.id
        )));
    }

    if let Some(c) = id.chars().find(|c| TOPIC_RESERVED.contains(c)) {
        return Err(Error::Validation(format!(
            "Device ID '{}' contains reserved character '{}'",
            id, c
        )));
    }

    if input.model.trim().is_empty() {
        return Err(Error::Validation("Device model cannot be empty".to_string()));
    }

    Ok(())
}

/// Validates a user form
pub fn validate_user(input: &UserInput) -> Result<()> {
    if input.first_name.trim().is_empty() || input.last_name.trim().is_empty() {
        return Err(Error::Validation("User name cannot be empty".to_string()));
    }

    let email = input.email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(Error::Validation(format!("Invalid email '{}'", input.email))),
    }
}
