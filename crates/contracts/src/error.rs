//! Layered error definitions
//!
//! Categorized by source: config / delivery / general

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    /// Required sink field absent
    #[error("required field '{field}' not set for sink '{sink_name}'")]
    MissingSinkField { sink_name: String, field: String },

    /// Sink field present but unparsable
    #[error("field '{field}' has invalid value '{value}' for sink '{sink_name}': {message}")]
    InvalidSinkField {
        sink_name: String,
        field: String,
        value: String,
        message: String,
    },

    // ===== Delivery Errors =====
    /// Payload could not be serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// Transport failed after all retry attempts
    #[error("sink '{sink_name}' HTTP transport error: {message}")]
    SinkTransport { sink_name: String, message: String },

    /// Endpoint answered with something other than 204 No Content
    #[error("sink '{sink_name}' unexpected status code {status}, expected: 204 No Content")]
    UnexpectedStatus { sink_name: String, status: u16 },

    /// Object description could not be built
    #[error("failed to describe {kind} object: {message}")]
    Describe { kind: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create sink transport error
    pub fn sink_transport(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkTransport {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create describe error
    pub fn describe(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Describe {
            kind: kind.into(),
            message: message.into(),
        }
    }
}
