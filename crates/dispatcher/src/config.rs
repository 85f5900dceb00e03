//! Router configuration

use contracts::{AppConfig, DescriptionsConfig, FilterErrorPolicy};

use crate::error::DispatcherError;

/// Queue capacity used when none is configured
pub const DEFAULT_WORK_QUEUE_LENGTH: usize = 1024;

/// Validated router options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterConfig {
    work_queue_length: usize,
    filter_error_policy: FilterErrorPolicy,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            work_queue_length: DEFAULT_WORK_QUEUE_LENGTH,
            filter_error_policy: FilterErrorPolicy::default(),
        }
    }
}

impl RouterConfig {
    /// Defaults: 1024 queued notifications, abort on filter errors
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the queue capacity
    ///
    /// `None` keeps the current value.
    ///
    /// # Errors
    /// `InvalidWorkQueueLength` for zero or negative values.
    pub fn with_work_queue_length(mut self, length: Option<i64>) -> Result<Self, DispatcherError> {
        if let Some(length) = length {
            self.work_queue_length = usize::try_from(length)
                .ok()
                .filter(|len| *len > 0)
                .ok_or(DispatcherError::InvalidWorkQueueLength(length))?;
        }
        Ok(self)
    }

    /// Set the filter runtime error policy
    pub fn with_filter_error_policy(mut self, policy: FilterErrorPolicy) -> Self {
        self.filter_error_policy = policy;
        self
    }

    /// Event router options from the process configuration
    pub fn for_events(config: &AppConfig) -> Result<Self, DispatcherError> {
        Ok(Self::new()
            .with_work_queue_length(config.work_queue_length)?
            .with_filter_error_policy(config.filter_error_policy))
    }

    /// Description router options from the process configuration
    pub fn for_descriptions(
        config: &AppConfig,
        descriptions: &DescriptionsConfig,
    ) -> Result<Self, DispatcherError> {
        Ok(Self::new()
            .with_work_queue_length(descriptions.work_queue_length)?
            .with_filter_error_policy(config.filter_error_policy))
    }

    /// Queue capacity
    pub fn work_queue_length(&self) -> usize {
        self.work_queue_length
    }

    /// Filter runtime error policy
    pub fn filter_error_policy(&self) -> FilterErrorPolicy {
        self.filter_error_policy
    }
}
