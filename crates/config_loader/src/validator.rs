//! Configuration validation
//!
//! Rules:
//! - every workQueueLength > 0
//! - sink names non-empty and unique
//! - filter expressions non-empty

use std::collections::HashSet;

use contracts::{AppConfig, ContractError};

/// Validate an AppConfig
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &AppConfig) -> Result<(), ContractError> {
    validate_work_queue_length("workQueueLength", config.work_queue_length)?;
    validate_filters("excludeFilters", &config.exclude_filters)?;
    if let Some(desc) = &config.descriptions {
        validate_work_queue_length("descriptions.workQueueLength", desc.work_queue_length)?;
        validate_filters("descriptions.excludeFilters", &desc.exclude_filters)?;
    }
    validate_sinks(config)?;
    Ok(())
}

fn validate_work_queue_length(field: &str, length: Option<i64>) -> Result<(), ContractError> {
    match length {
        Some(len) if len <= 0 => Err(ContractError::config_validation(
            field,
            format!("invalid workQueueLength value of {len}. Value should be greater than 0"),
        )),
        _ => Ok(()),
    }
}

fn validate_filters(field: &str, filters: &[String]) -> Result<(), ContractError> {
    for (idx, filter) in filters.iter().enumerate() {
        if filter.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("{field}[{idx}]"),
                "filter expression cannot be empty",
            ));
        }
    }
    Ok(())
}

fn validate_sinks(config: &AppConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in config.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].name"),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
    }
    Ok(())
}
