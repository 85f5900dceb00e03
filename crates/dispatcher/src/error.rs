//! Dispatcher error types

use thiserror::Error;

use crate::filter::FilterError;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// No sink implementation registered under this name
    #[error("sink with name '{name}' is not registered")]
    UnknownSink { name: String },

    /// Sink creation error
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// Queue capacity must be positive
    #[error("invalid workQueueLength value of {0}. Value should be greater than 0")]
    InvalidWorkQueueLength(i64),

    /// An exclude filter failed to compile
    #[error("failed to compile exclude filter: {0}")]
    FilterCompile(#[source] FilterError),

    /// An exclude filter failed while evaluating a notification
    #[error("exclude filter failed at runtime: {0}")]
    FilterRuntime(#[source] FilterError),

    /// Every producer went away while an enqueue was pending
    #[error("work queue closed")]
    QueueClosed,

    /// Contract error (configuration, delivery)
    #[error("contract error: {0}")]
    Contract(#[from] contracts::ContractError),
}

impl DispatcherError {
    /// Create a sink creation error
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }
}
