//! Pipeline orchestrator - builds sinks and routers, wires replay sources,
//! and waits for everything to finish.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use contracts::{AppConfig, KubeEvent, KubeObject};
use dispatcher::{
    DispatcherError, Filterable, MetricsRegistry, Producer, Router, RouterConfig, RunSummary,
    SinkContext, SinkRegistry,
};

use super::source::{replay, ReplayRecord, SourceStats};
use super::PipelineStats;

type RouterTask = JoinHandle<Result<RunSummary, DispatcherError>>;
type SourceTask = JoinHandle<Result<SourceStats>>;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Loaded and validated process configuration
    pub app: AppConfig,

    /// Event replay input (None for both inputs = wait for the stop signal)
    pub events: Option<PathBuf>,

    /// Object replay input for the descriptions router
    pub objects: Option<PathBuf>,

    /// Version stamped on shipped events
    pub integration_version: String,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Build sinks and routers without starting them
    ///
    /// Any configuration problem surfaces here, before notifications flow.
    fn build(
        &self,
        metrics: &MetricsRegistry,
    ) -> Result<(Router<KubeEvent>, Option<Router<KubeObject>>)> {
        let app = &self.config.app;
        let ctx = SinkContext::new(&self.config.integration_version, metrics.http_sink());

        let (event_sinks, object_sinks) = SinkRegistry::with_defaults()
            .create_sinks(&app.sinks, &ctx)
            .context("Failed to create sinks")?;

        let events = Router::new(
            RouterConfig::for_events(app)?,
            event_sinks,
            app.exclude_filters.as_slice(),
            metrics.events(),
        )
        .context("Failed to build events router")?;

        let descriptions = match &app.descriptions {
            Some(desc) => Some(
                Router::new(
                    RouterConfig::for_descriptions(app, desc)?,
                    object_sinks,
                    desc.exclude_filters.as_slice(),
                    metrics.descriptions(),
                )
                .context("Failed to build descriptions router")?,
            ),
            None => None,
        };

        Ok((events, descriptions))
    }

    /// Build everything and report what would run
    pub fn check(&self) -> Result<Vec<String>> {
        let (events, descriptions) = self.build(&MetricsRegistry::new())?;
        let mut lines = vec![format!(
            "events router: capacity {}, sinks {:?}",
            events.capacity(),
            events.sink_names()
        )];
        if let Some(router) = descriptions {
            lines.push(format!(
                "descriptions router: capacity {}, sinks {:?}",
                router.capacity(),
                router.sink_names()
            ));
        }
        Ok(lines)
    }

    /// Run until every source is exhausted or `stop` fires
    ///
    /// Metric handles bind to the recorder installed when they are created,
    /// so the exporter must be installed before this is called. A router
    /// that fails cancels `stop` so the rest of the pipeline winds down with
    /// it. Without any source the routers wait for `stop`; otherwise a
    /// router without its own source drains once the others are exhausted.
    pub async fn run(self, stop: CancellationToken) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let metrics = MetricsRegistry::new();
        let (events, descriptions) = self.build(&metrics)?;

        let mut sources = Vec::new();
        let mut routers = Vec::new();
        let idle_release = stop.child_token();

        sources.extend(attach_source(
            &events,
            self.config.events.clone(),
            &stop,
            &idle_release,
        ));
        routers.push(spawn_router(events, stop.clone()));

        match descriptions {
            Some(router) => {
                sources.extend(attach_source(
                    &router,
                    self.config.objects.clone(),
                    &stop,
                    &idle_release,
                ));
                routers.push(spawn_router(router, stop.clone()));
            }
            None if self.config.objects.is_some() => {
                warn!("Object source given but no descriptions router is configured, ignoring it");
            }
            None => {}
        }

        info!(routers = routers.len(), sources = sources.len(), "Pipeline running");

        let mut stats = PipelineStats::default();
        let mut first_error = None;

        // A failed router cancels `stop`, which also ends its source.
        let had_sources = !sources.is_empty();
        for task in sources {
            match task.await.context("Source task panicked")? {
                Ok(source) => stats.sources.push(source),
                Err(e) => warn!(error = %e, "Replay source failed"),
            }
        }
        if had_sources {
            idle_release.cancel();
        }

        for task in routers {
            match task.await.context("Router task panicked")? {
                Ok(summary) => stats.routers.push(summary),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e).context("Router stopped with an error");
        }

        let http = metrics.http_sink();
        stats.http_transport_failures = http.transport_failures();
        stats.http_responses = http.total_responses();
        stats.duration = start_time.elapsed();
        Ok(stats)
    }
}

/// Spawn a router that cancels `stop` when it fails
fn spawn_router<N>(router: Router<N>, stop: CancellationToken) -> RouterTask
where
    N: Filterable + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let result = router.run(stop.clone()).await;
        if result.is_err() {
            stop.cancel();
        }
        result
    })
}

/// Feed `router` from `path`, or hold its queue open until `release` fires
fn attach_source<N>(
    router: &Router<N>,
    path: Option<PathBuf>,
    stop: &CancellationToken,
    release: &CancellationToken,
) -> Option<SourceTask>
where
    N: Filterable + ReplayRecord,
{
    let producer: Producer<N> = router.producer();
    match path {
        Some(path) => Some(tokio::spawn(replay(path, producer, stop.clone()))),
        None => {
            let release = release.clone();
            tokio::spawn(async move {
                release.cancelled().await;
                drop(producer);
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{DescriptionsConfig, SinkConfig};
    use dispatcher::StopReason;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::io::Write;
    use std::time::Duration;

    fn app(sinks: Vec<SinkConfig>) -> AppConfig {
        AppConfig {
            sinks,
            ..Default::default()
        }
    }

    fn write_lines(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    #[tokio::test]
    async fn test_replay_drains_and_exits() {
        let input = write_lines(&[
            r#"{"reason":"Scheduled","involvedObject":{"kind":"Pod","name":"a"}}"#,
            "garbage",
            "",
            r#"{"verb":"ADDED","event":{"reason":"Pulled"}}"#,
        ]);
        let pipeline = Pipeline::new(PipelineConfig {
            app: app(vec![SinkConfig::new("stdout")]),
            events: Some(input.path().to_path_buf()),
            objects: None,
            integration_version: "test".into(),
        });

        let stats = pipeline.run(CancellationToken::new()).await.unwrap();

        assert_eq!(stats.routers.len(), 1);
        assert_eq!(stats.processed(), 2);
        assert_eq!(stats.sources[0].enqueued, 2);
        assert_eq!(stats.sources[0].skipped, 1);
        assert_eq!(stats.routers[0].metrics.sinks["stdout"].received, 2);
    }

    #[tokio::test]
    async fn test_filters_apply_per_router() {
        let events = write_lines(&[
            r#"{"reason":"Pulled"}"#,
            r#"{"reason":"BackOff"}"#,
        ]);
        let objects = write_lines(&[
            r#"{"kind":"Secret","metadata":{"name":"s"}}"#,
            r#"{"kind":"Pod","metadata":{"name":"p"}}"#,
        ]);
        let mut config = app(vec![SinkConfig::new("stdout")]);
        config.exclude_filters = vec![r#"event.reason == "Pulled""#.into()];
        config.descriptions = Some(DescriptionsConfig {
            work_queue_length: Some(4),
            exclude_filters: vec![r#"obj.kind == "Secret""#.into()],
        });

        let pipeline = Pipeline::new(PipelineConfig {
            app: config,
            events: Some(events.path().to_path_buf()),
            objects: Some(objects.path().to_path_buf()),
            integration_version: "test".into(),
        });
        let stats = pipeline.run(CancellationToken::new()).await.unwrap();

        assert_eq!(stats.routers.len(), 2);
        for router in &stats.routers {
            assert_eq!(router.metrics.processed, 2);
            assert_eq!(router.metrics.filtered, 1);
            assert_eq!(router.metrics.sinks["stdout"].received, 1);
        }
    }

    #[tokio::test]
    async fn test_filter_abort_fails_run() {
        let events = write_lines(&[r#"{"reason":"Pulled"}"#]);
        let mut config = app(vec![SinkConfig::new("stdout")]);
        config.exclude_filters = vec!["event.reason.missing.deeper".into()];

        let pipeline = Pipeline::new(PipelineConfig {
            app: config,
            events: Some(events.path().to_path_buf()),
            objects: None,
            integration_version: "test".into(),
        });
        let err = pipeline.run(CancellationToken::new()).await.unwrap_err();
        assert!(format!("{err:#}").contains("exclude filter failed at runtime"));
    }

    #[test]
    fn test_unknown_sink_fails_before_start() {
        let pipeline = Pipeline::new(PipelineConfig {
            app: app(vec![SinkConfig::new("kafka")]),
            events: None,
            objects: None,
            integration_version: "test".into(),
        });
        let err = pipeline.check().unwrap_err();
        assert!(format!("{err:#}").contains("sink with name 'kafka' is not registered"));
    }

    #[tokio::test]
    async fn test_no_source_waits_for_stop() {
        let pipeline = Pipeline::new(PipelineConfig {
            app: app(vec![SinkConfig::new("stdout")]),
            events: None,
            objects: None,
            integration_version: "test".into(),
        });
        let stop = CancellationToken::new();
        let handle = tokio::spawn(pipeline.run(stop.clone()));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        stop.cancel();
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.processed(), 0);
        assert!(stats.sources.is_empty());
    }

    #[tokio::test]
    async fn test_router_without_source_drains_with_others() {
        let events = write_lines(&[r#"{"reason":"Pulled"}"#]);
        let mut config = app(vec![SinkConfig::new("stdout")]);
        config.descriptions = Some(DescriptionsConfig::default());

        let pipeline = Pipeline::new(PipelineConfig {
            app: config,
            events: Some(events.path().to_path_buf()),
            objects: None,
            integration_version: "test".into(),
        });
        let stats = tokio::time::timeout(
            Duration::from_secs(5),
            pipeline.run(CancellationToken::new()),
        )
        .await
        .expect("pipeline should exit once the events input is exhausted")
        .unwrap();

        assert_eq!(stats.routers.len(), 2);
        assert!(stats
            .routers
            .iter()
            .all(|r| r.reason == StopReason::Drained));
        assert_eq!(stats.processed(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_metrics_bind_to_recorder_installed_after_pipeline_new() {
        let events = write_lines(&[
            r#"{"reason":"Pulled"}"#,
            r#"{"reason":"BackOff"}"#,
        ]);
        let mut config = app(vec![SinkConfig::new("newRelicInfra")
            .with("clusterName", "test-cluster")
            .with("agentEndpoint", "http://127.0.0.1:1/v1/data")
            .with("agentHTTPMaxRetries", "1")
            .with("agentHTTPBackoff", "1ms")]);
        config.exclude_filters = vec![r#"event.reason == "Pulled""#.into()];

        let pipeline = Pipeline::new(PipelineConfig {
            app: config,
            events: Some(events.path().to_path_buf()),
            objects: None,
            integration_version: "test".into(),
        });

        // Same order as the run command: pipeline first, exporter second.
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let stats = pipeline.run(CancellationToken::new()).await.unwrap();
        assert_eq!(stats.http_transport_failures, 1);

        let rendered = handle.render();
        for series in [
            "nr_kube_events_workqueue_length",
            "nr_kube_events_filtered_events_total 1",
            "nr_http_sink_infra_sink_http_failures_total 1",
        ] {
            assert!(rendered.contains(series), "missing {series} in:\n{rendered}");
        }
    }
}
