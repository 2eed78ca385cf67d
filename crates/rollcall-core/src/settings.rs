//! Run configuration validation.
//!
//! The host hands run settings over as loosely typed JSON (they live in its
//! own settings store). Everything entering the announcement subsystem is
//! checked here first; callers log the error and skip the run.

use serde_json::Value;

use crate::domain::{MAX_SPEED, MAX_VOLUME, RunConfig};

/// Settings validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("Run config must be a mapping, got {0}")]
    NotAMapping(&'static str),

    #[error("Names must be a sequence of strings")]
    NamesNotASequence,

    #[error("Volume must be between 0 and 100, got {0}")]
    InvalidVolume(u32),

    #[error("Speed must be between 0 and 200, got {0}")]
    InvalidSpeed(u32),

    #[error("Unknown engine type '{0}' (expected 'local' or 'network')")]
    UnknownEngine(String),

    #[error("Voice name must not be empty for the network engine")]
    EmptyVoice,

    #[error("Malformed run config: {0}")]
    Malformed(String),
}

/// Validate run configuration values.
pub fn validate_run_config(config: &RunConfig) -> Result<(), SettingsError> {
    if config.volume > MAX_VOLUME {
        return Err(SettingsError::InvalidVolume(config.volume));
    }

    if config.speed > MAX_SPEED {
        return Err(SettingsError::InvalidSpeed(config.speed));
    }

    Ok(())
}

/// Parse and validate a run configuration from an untyped JSON value.
///
/// The value must be an object; missing keys take their defaults.
pub fn parse_run_config(value: &Value) -> Result<RunConfig, SettingsError> {
    if !value.is_object() {
        return Err(SettingsError::NotAMapping(json_kind(value)));
    }

    let config: RunConfig = serde_json::from_value(value.clone())
        .map_err(|e| SettingsError::Malformed(e.to_string()))?;
    validate_run_config(&config)?;
    Ok(config)
}

/// Parse an untyped JSON value into an ordered list of names.
pub fn parse_names(value: &Value) -> Result<Vec<String>, SettingsError> {
    let Value::Array(items) = value else {
        return Err(SettingsError::NamesNotASequence);
    };

    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(ToString::to_string)
                .ok_or(SettingsError::NamesNotASequence)
        })
        .collect()
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
