//! SinkRegistry - name → sink factory
//!
//! A sink configuration's `name` selects its implementation. One instance
//! serves both routers, so a factory returns the same object behind both
//! trait views.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::info;

use contracts::{KubeEvent, KubeObject, Sink, SinkConfig};

use crate::error::DispatcherError;
use crate::metrics::HttpSinkMetrics;
use crate::sinks::{NewRelicInfraSink, StdoutSink};

/// Name of the console sink
pub const STDOUT_SINK: &str = "stdout";

/// Name of the infrastructure agent sink
pub const NEW_RELIC_INFRA_SINK: &str = "newRelicInfra";

/// Shared inputs for sink construction
#[derive(Clone)]
pub struct SinkContext {
    pub integration_version: String,
    pub http_metrics: Arc<HttpSinkMetrics>,
}

impl SinkContext {
    pub fn new(integration_version: impl Into<String>, http_metrics: Arc<HttpSinkMetrics>) -> Self {
        Self {
            integration_version: integration_version.into(),
            http_metrics,
        }
    }
}

/// A constructed sink, viewed once per notification type
#[derive(Clone)]
pub struct RegisteredSink {
    pub events: Arc<dyn Sink<KubeEvent>>,
    pub objects: Arc<dyn Sink<KubeObject>>,
}

impl RegisteredSink {
    /// Wrap a sink that handles both notification types
    pub fn shared<T>(sink: T) -> Self
    where
        T: Sink<KubeEvent> + Sink<KubeObject> + 'static,
    {
        let sink = Arc::new(sink);
        Self {
            events: Arc::clone(&sink) as Arc<dyn Sink<KubeEvent>>,
            objects: sink as Arc<dyn Sink<KubeObject>>,
        }
    }
}

/// Constructor for one sink kind
pub type SinkFactory = fn(&SinkConfig, &SinkContext) -> Result<RegisteredSink, DispatcherError>;

/// Sinks keyed by name, one per router
pub type SinkSet<N> = BTreeMap<String, Arc<dyn Sink<N>>>;

/// Registry of known sink kinds
pub struct SinkRegistry {
    factories: HashMap<&'static str, SinkFactory>,
}

impl Default for SinkRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl SinkRegistry {
    /// Empty registry
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry knowing `stdout` and `newRelicInfra`
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(STDOUT_SINK, create_stdout);
        registry.register(NEW_RELIC_INFRA_SINK, create_new_relic_infra);
        registry
    }

    /// Add or replace a factory
    pub fn register(&mut self, name: &'static str, factory: SinkFactory) {
        self.factories.insert(name, factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Build one sink
    ///
    /// # Errors
    /// `UnknownSink` for an unregistered name, or the factory's error.
    pub fn create(
        &self,
        config: &SinkConfig,
        ctx: &SinkContext,
    ) -> Result<RegisteredSink, DispatcherError> {
        let factory = self
            .factories
            .get(config.name.as_str())
            .ok_or_else(|| DispatcherError::UnknownSink {
                name: config.name.clone(),
            })?;
        factory(config, ctx)
    }

    /// Build every configured sink
    ///
    /// Any failure aborts construction of the whole set.
    pub fn create_sinks(
        &self,
        configs: &[SinkConfig],
        ctx: &SinkContext,
    ) -> Result<(SinkSet<KubeEvent>, SinkSet<KubeObject>), DispatcherError> {
        let mut events = SinkSet::new();
        let mut objects = SinkSet::new();

        for config in configs {
            let sink = self.create(config, ctx)?;
            info!(sink = %config.name, "Sink created");
            events.insert(config.name.clone(), sink.events);
            objects.insert(config.name.clone(), sink.objects);
        }

        Ok((events, objects))
    }
}

fn create_stdout(config: &SinkConfig, _ctx: &SinkContext) -> Result<RegisteredSink, DispatcherError> {
    Ok(RegisteredSink::shared(StdoutSink::new(&config.name)))
}

fn create_new_relic_infra(
    config: &SinkConfig,
    ctx: &SinkContext,
) -> Result<RegisteredSink, DispatcherError> {
    let sink = NewRelicInfraSink::from_config(
        config,
        &ctx.integration_version,
        Arc::clone(&ctx.http_metrics),
    )
    .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
    Ok(RegisteredSink::shared(sink))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> SinkContext {
        SinkContext::new("test", Arc::new(HttpSinkMetrics::new()))
    }

    #[test]
    fn test_default_registry() {
        let registry = SinkRegistry::default();
        assert_eq!(registry.names(), vec!["newRelicInfra", "stdout"]);
        assert!(registry.contains("stdout"));
        assert!(!registry.contains("kafka"));
    }

    #[test]
    fn test_create_sinks_keyed_by_name() {
        let registry = SinkRegistry::with_defaults();
        let configs = vec![
            SinkConfig::new("stdout"),
            SinkConfig::new("newRelicInfra")
                .with("clusterName", "minikube")
                .with("agentEndpoint", "http://localhost:8001/v1/data"),
        ];

        let (events, objects) = registry.create_sinks(&configs, &ctx()).unwrap();
        assert_eq!(events.keys().collect::<Vec<_>>(), vec!["newRelicInfra", "stdout"]);
        assert_eq!(objects.len(), 2);
        assert_eq!(events["stdout"].name(), "stdout");
        assert_eq!(objects["newRelicInfra"].name(), "newRelicInfra");
    }

    #[test]
    fn test_unknown_sink_is_error() {
        let registry = SinkRegistry::with_defaults();
        let err = registry
            .create_sinks(&[SinkConfig::new("kafka")], &ctx())
            .err()
            .unwrap();
        assert!(matches!(err, DispatcherError::UnknownSink { ref name } if name == "kafka"));
        assert_eq!(err.to_string(), "sink with name 'kafka' is not registered");
    }

    #[test]
    fn test_invalid_sink_config_is_creation_error() {
        let registry = SinkRegistry::with_defaults();
        let err = registry
            .create(&SinkConfig::new("newRelicInfra"), &ctx())
            .err()
            .unwrap();
        assert!(matches!(err, DispatcherError::SinkCreation { ref name, .. } if name == "newRelicInfra"));
        assert!(err.to_string().contains("clusterName"));
    }

    #[test]
    fn test_custom_factory() {
        let mut registry = SinkRegistry::empty();
        registry.register("console", create_stdout);
        let sink = registry.create(&SinkConfig::new("console"), &ctx()).unwrap();
        assert_eq!(sink.events.name(), "console");
    }
}
