//! NewRelicInfraSink - ships events and descriptions to the local
//! infrastructure agent over HTTP

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use tracing::{debug, instrument};

use contracts::{ContractError, KubeEvent, KubeObject, Sink, SinkConfig};

use crate::flatten::{flatten, Attributes};
use crate::metrics::HttpSinkMetrics;
use crate::split::{limit_split, NRDB_LIMIT, SPLIT_MAX_COLS};

use super::describe::{DefaultDescriber, ObjectDescriber};
use super::payload::{EntityData, IntegrationPayload, INTEGRATION_NAME};
use super::retry::{RetryPolicy, RetryingClient};

/// Entity namespace prefix
const ENTITY_NAMESPACE: &str = "k8s";

/// Per-attempt HTTP timeout when `agentHTTPTimeout` is not set
pub const DEFAULT_AGENT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings read from the sink configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRelicInfraSettings {
    pub cluster_name: String,
    pub agent_endpoint: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl NewRelicInfraSettings {
    /// Parse settings
    ///
    /// # Errors
    /// Missing `clusterName` / `agentEndpoint`, or unparsable optional keys.
    pub fn from_config(config: &SinkConfig) -> Result<Self, ContractError> {
        let defaults = RetryPolicy::default();
        Ok(Self {
            cluster_name: config.require_string("clusterName")?.to_string(),
            agent_endpoint: config.require_string("agentEndpoint")?.to_string(),
            timeout: config.duration_or("agentHTTPTimeout", DEFAULT_AGENT_HTTP_TIMEOUT)?,
            retry: RetryPolicy {
                max_attempts: config.parse_or("agentHTTPMaxRetries", defaults.max_attempts)?,
                base_delay: config.duration_or("agentHTTPBackoff", defaults.base_delay)?,
                concurrency: config.parse_or("agentHTTPConcurrency", defaults.concurrency)?,
                ..defaults
            },
        })
    }
}

/// Sink posting integration payloads to the infrastructure agent
pub struct NewRelicInfraSink {
    name: String,
    cluster_name: String,
    agent_endpoint: String,
    integration_version: String,
    client: RetryingClient,
    describer: Arc<dyn ObjectDescriber>,
    metrics: Arc<HttpSinkMetrics>,
}

impl NewRelicInfraSink {
    /// Create the sink from its configuration block
    pub fn from_config(
        config: &SinkConfig,
        integration_version: &str,
        metrics: Arc<HttpSinkMetrics>,
    ) -> Result<Self, ContractError> {
        let settings = NewRelicInfraSettings::from_config(config)?;
        Self::new(&config.name, settings, integration_version, metrics)
    }

    /// Create the sink from parsed settings
    pub fn new(
        name: impl Into<String>,
        settings: NewRelicInfraSettings,
        integration_version: impl Into<String>,
        metrics: Arc<HttpSinkMetrics>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let client = RetryingClient::new(settings.timeout, settings.retry.clone())
            .map_err(|e| ContractError::sink_write(&name, format!("cannot build HTTP client: {e}")))?;

        debug!(
            sink = %name,
            cluster = %settings.cluster_name,
            endpoint = %settings.agent_endpoint,
            timeout = ?settings.timeout,
            max_attempts = settings.retry.max_attempts,
            concurrency = settings.retry.concurrency,
            "NewRelicInfraSink configured"
        );

        Ok(Self {
            name,
            cluster_name: settings.cluster_name,
            agent_endpoint: settings.agent_endpoint,
            integration_version: integration_version.into(),
            client,
            describer: Arc::new(DefaultDescriber),
            metrics,
        })
    }

    /// Replace the object describer
    pub fn with_describer(mut self, describer: Arc<dyn ObjectDescriber>) -> Self {
        self.describer = describer;
        self
    }

    fn decorate_attrs(&self, attrs: &mut Attributes) {
        attrs.insert(
            "eventRouterVersion".into(),
            self.integration_version.clone().into(),
        );
        attrs.insert(
            "integrationVersion".into(),
            self.integration_version.clone().into(),
        );
        attrs.insert("integrationName".into(), INTEGRATION_NAME.into());
        attrs.insert("clusterName".into(), self.cluster_name.clone().into());
    }

    /// Serialize and POST a payload; success is exactly 204 No Content
    async fn send_payload(&self, payload: &IntegrationPayload<'_>) -> Result<(), ContractError> {
        let body = Bytes::from(serde_json::to_vec(payload)?);

        let response = match self.client.post_json(&self.agent_endpoint, body).await {
            Ok(response) => response,
            Err(e) => {
                self.metrics.inc_transport_failures();
                return Err(ContractError::sink_transport(&self.name, e.to_string()));
            }
        };

        let status = response.status();
        // Read to the end so the connection can be reused.
        if let Err(e) = response.bytes().await {
            debug!(sink = %self.name, error = %e, "Could not discard response body");
        }

        self.metrics.inc_response(status.as_u16());

        if status != StatusCode::NO_CONTENT {
            return Err(ContractError::UnexpectedStatus {
                sink_name: self.name.clone(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    fn description_attrs(&self, kind: &str, name: &str, parts: &[&str]) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("type".into(), format!("{kind}.Description").into());
        attrs.insert("displayName".into(), name.into());
        for idx in 0..SPLIT_MAX_COLS {
            let part = parts.get(idx).copied().unwrap_or("");
            attrs.insert(format!("summary.part[{idx}]"), part.into());
        }
        self.decorate_attrs(&mut attrs);
        attrs
    }
}

/// Entity `(type, name)` for an event
///
/// `k8s:<cluster>[:<namespace>]:<kind>`, named after the involved object.
pub fn format_entity_id(cluster_name: &str, notification: &KubeEvent) -> (String, String) {
    let object = &notification.event.involved_object;
    let mut parts = vec![ENTITY_NAMESPACE, cluster_name];
    if !object.namespace.is_empty() {
        parts.push(&object.namespace);
    }
    let kind = object.kind.to_lowercase();
    parts.push(&kind);

    (parts.join(":"), object.name.clone())
}

#[async_trait]
impl Sink<KubeEvent> for NewRelicInfraSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "nri_sink_event",
        skip_all,
        fields(sink = %self.name, verb = %notification.verb)
    )]
    async fn deliver(&self, notification: &KubeEvent) -> Result<(), ContractError> {
        let (entity_type, entity_name) = format_entity_id(&self.cluster_name, notification);

        let mut attrs = flatten(notification)?;
        self.decorate_attrs(&mut attrs);

        let payload = IntegrationPayload::single(
            &self.integration_version,
            EntityData::with_event(
                entity_name,
                entity_type,
                notification.event.message.clone(),
                attrs,
            ),
        );
        self.send_payload(&payload).await
    }
}

#[async_trait]
impl Sink<KubeObject> for NewRelicInfraSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "nri_sink_object",
        skip_all,
        fields(sink = %self.name, kind = notification.kind())
    )]
    async fn deliver(&self, notification: &KubeObject) -> Result<(), ContractError> {
        let kind = notification.kind();

        let description = match self.describer.describe(&notification.obj) {
            Ok(text) => text,
            Err(e) => {
                self.metrics.inc_description_error(kind);
                return Err(e);
            }
        };
        self.metrics
            .observe_description_size(kind, description.len());

        let parts = limit_split(&description, NRDB_LIMIT as isize);
        let Some(summary) = parts.first().copied() else {
            return Ok(());
        };

        let (namespace, name) = notification.namespace_and_name()?;
        let entity_type = format!(
            "{ENTITY_NAMESPACE}:{}:{namespace}:{}",
            self.cluster_name,
            kind.to_lowercase()
        );
        let attrs = self.description_attrs(kind, name, &parts);

        let payload = IntegrationPayload::single(
            &self.integration_version,
            EntityData::with_event(name, entity_type, summary, attrs),
        );
        self.send_payload(&payload).await
    }
}
