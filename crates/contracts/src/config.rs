//! AppConfig - Config Loader output
//!
//! Process configuration: work queue sizing, exclude filters and the sinks
//! notifications are routed to.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ContractError;

/// Complete process configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Event work queue capacity (None = router default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_queue_length: Option<i64>,

    /// What to do when a filter fails to evaluate
    #[serde(default)]
    pub filter_error_policy: FilterErrorPolicy,

    /// Events matching any of these expressions are not delivered
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_filters: Vec<String>,

    /// Optional description router
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptions: Option<DescriptionsConfig>,

    /// Output routing
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

/// Description router configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptionsConfig {
    /// Object work queue capacity (None = router default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_queue_length: Option<i64>,

    /// Objects matching any of these expressions are not described
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_filters: Vec<String>,
}

/// Filter runtime error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterErrorPolicy {
    /// Stop the router and surface the error
    #[default]
    Abort,
    /// Log, count and drop the notification
    Skip,
}

/// Sink name plus its free-form string settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name, also selects the sink implementation
    pub name: String,

    /// Sink specific parameters
    #[serde(default)]
    pub config: HashMap<String, String>,
}

impl SinkConfig {
    /// Create a config with no parameters
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: HashMap::new(),
        }
    }

    /// Builder-style parameter insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Get a required string parameter
    ///
    /// # Errors
    /// `MissingSinkField` when the key is absent.
    pub fn require_string(&self, key: &str) -> Result<&str, ContractError> {
        self.config
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ContractError::MissingSinkField {
                sink_name: self.name.clone(),
                field: key.to_string(),
            })
    }

    /// Get a duration parameter ("10s", "1m 30s", "500ms")
    ///
    /// # Errors
    /// `InvalidSinkField` when the value is present but not a duration.
    pub fn duration_or(&self, key: &str, fallback: Duration) -> Result<Duration, ContractError> {
        match self.config.get(key) {
            None => Ok(fallback),
            Some(raw) => humantime::parse_duration(raw).map_err(|e| self.invalid(key, raw, e)),
        }
    }

    /// Get a parsed parameter
    ///
    /// # Errors
    /// `InvalidSinkField` when the value is present but fails to parse.
    pub fn parse_or<T>(&self, key: &str, fallback: T) -> Result<T, ContractError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.config.get(key) {
            None => Ok(fallback),
            Some(raw) => raw.trim().parse().map_err(|e| self.invalid(key, raw, e)),
        }
    }

    fn invalid(&self, key: &str, raw: &str, err: impl std::fmt::Display) -> ContractError {
        ContractError::InvalidSinkField {
            sink_name: self.name.clone(),
            field: key.to_string(),
            value: raw.to_string(),
            message: err.to_string(),
        }
    }
}
