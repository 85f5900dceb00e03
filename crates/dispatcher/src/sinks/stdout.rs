//! StdoutSink - writes each notification as JSON to the log stream

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, instrument};

use contracts::{ContractError, KubeEvent, KubeObject, Sink};

/// Sink that logs the canonical JSON of every notification
pub struct StdoutSink {
    name: String,
}

impl StdoutSink {
    /// Create a new StdoutSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn emit<T: Serialize>(&self, kind: &'static str, notification: &T) -> Result<(), ContractError> {
        let json = serde_json::to_string(notification)?;
        info!(target: "stdout_sink", sink = %self.name, kind, "{}", json);
        Ok(())
    }
}

#[async_trait]
impl Sink<KubeEvent> for StdoutSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "stdout_sink_event", skip_all, fields(sink = %self.name, verb = %notification.verb))]
    async fn deliver(&self, notification: &KubeEvent) -> Result<(), ContractError> {
        self.emit("event", notification)
    }
}

#[async_trait]
impl Sink<KubeObject> for StdoutSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "stdout_sink_object", skip_all, fields(sink = %self.name, verb = %notification.verb))]
    async fn deliver(&self, notification: &KubeObject) -> Result<(), ContractError> {
        self.emit("object", notification)
    }
}
