//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置合约测试
//! - 端到端测试：Router → NewRelicInfra sink → 模拟 agent
//! - 过滤、背压与关闭行为

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{FilterErrorPolicy, KubeEvent};

    const CONFIG: &str = r#"
workQueueLength = 16
filterErrorPolicy = "skip"
excludeFilters = ['event.reason == "Pulled"']

[descriptions]
workQueueLength = 8
excludeFilters = ['obj.kind == "Secret"']

[[sinks]]
name = "stdout"

[[sinks]]
name = "newRelicInfra"
[sinks.config]
clusterName = "minikube"
agentEndpoint = "http://localhost:8001/v1/data"
agentHTTPTimeout = "10s"
"#;

    #[test]
    fn test_documented_config_loads() {
        let app = ConfigLoader::load_from_str(CONFIG, ConfigFormat::Toml).unwrap();
        assert_eq!(app.work_queue_length, Some(16));
        assert_eq!(app.filter_error_policy, FilterErrorPolicy::Skip);
        assert_eq!(app.sinks.len(), 2);
        assert_eq!(
            app.sinks[1].require_string("clusterName").unwrap(),
            "minikube"
        );
        let desc = app.descriptions.as_ref().unwrap();
        assert_eq!(desc.work_queue_length, Some(8));

        let json = ConfigLoader::to_json(&app).unwrap();
        let again = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(again, app);
    }

    #[test]
    fn test_notification_wire_format() {
        let raw = r#"{"verb":"ADDED","event":{"reason":"Scheduled","involvedObject":{"kind":"Pod"}}}"#;
        let ke: KubeEvent = serde_json::from_str(raw).unwrap();
        let back = serde_json::to_value(&ke).unwrap();
        assert_eq!(back["event"]["involvedObject"]["kind"], "Pod");
        assert!(back.get("old_event").is_none());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::{http::StatusCode, routing::post, Json};
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{AppConfig, Event, KubeEvent, KubeObject, ObjectReference, Sink};
    use dispatcher::{
        MetricsRegistry, Router, RouterConfig, SinkContext, SinkRegistry, StopReason,
    };
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    /// Mocked infrastructure agent
    ///
    /// Answers with the scripted statuses in order, then 204 forever, and
    /// records every request body.
    struct MockAgent {
        url: String,
        bodies: Arc<Mutex<Vec<Value>>>,
    }

    impl MockAgent {
        async fn start(script: Vec<u16>) -> Self {
            let bodies = Arc::new(Mutex::new(Vec::new()));
            let script = Arc::new(Mutex::new(VecDeque::from(script)));

            let recorded = Arc::clone(&bodies);
            let app = axum::Router::new().route(
                "/v1/data",
                post(move |Json(body): Json<Value>| {
                    let recorded = Arc::clone(&recorded);
                    let script = Arc::clone(&script);
                    async move {
                        recorded.lock().unwrap().push(body);
                        let code = script.lock().unwrap().pop_front().unwrap_or(204);
                        StatusCode::from_u16(code).unwrap()
                    }
                }),
            );

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            Self {
                url: format!("http://{addr}/v1/data"),
                bodies,
            }
        }

        fn bodies(&self) -> Vec<Value> {
            self.bodies.lock().unwrap().clone()
        }
    }

    fn config_for(agent: &MockAgent, extra: &str) -> AppConfig {
        let toml = format!(
            r#"
{extra}

[[sinks]]
name = "newRelicInfra"
[sinks.config]
clusterName = "e2e"
agentEndpoint = "{url}"
agentHTTPTimeout = "2s"
agentHTTPMaxRetries = "2"
agentHTTPBackoff = "1ms"
"#,
            url = agent.url
        );
        ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap()
    }

    fn event(reason: &str, kind: &str, name: &str) -> Event {
        Event {
            reason: reason.into(),
            message: format!("{reason} {name}"),
            involved_object: ObjectReference {
                kind: kind.into(),
                name: name.into(),
                namespace: "default".into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn events_router(app: &AppConfig, metrics: &MetricsRegistry) -> Router<KubeEvent> {
        let ctx = SinkContext::new("1.2.3", metrics.http_sink());
        let (sinks, _) = SinkRegistry::with_defaults()
            .create_sinks(&app.sinks, &ctx)
            .unwrap();
        Router::new(
            RouterConfig::for_events(app).unwrap(),
            sinks,
            app.exclude_filters.as_slice(),
            metrics.events(),
        )
        .unwrap()
    }

    /// Router → NewRelicInfra sink → agent, with one event filtered out
    #[tokio::test]
    async fn test_e2e_events_to_agent() {
        let agent = MockAgent::start(vec![]).await;
        let app = config_for(&agent, r#"excludeFilters = ['event.reason == "Pulled"']"#);
        let metrics = MetricsRegistry::new();
        let router = events_router(&app, &metrics);

        let producer = router.producer();
        let handle = router.spawn(CancellationToken::new());

        producer.on_add(event("Scheduled", "Pod", "nginx")).await.unwrap();
        producer.on_add(event("Pulled", "Pod", "nginx")).await.unwrap();
        producer
            .on_update(event("BackOff", "Pod", "nginx"), event("BackOff", "Pod", "nginx"))
            .await
            .unwrap();
        drop(producer);

        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.reason, StopReason::Drained);
        assert_eq!(summary.metrics.processed, 3);
        assert_eq!(summary.metrics.filtered, 1);

        let sink = &summary.metrics.sinks["newRelicInfra"];
        assert_eq!(sink.received, 2);
        assert_eq!(sink.failed, 0);
        assert_eq!(metrics.http_sink().responses(204), 2);

        let bodies = agent.bodies();
        assert_eq!(bodies.len(), 2);
        let first = &bodies[0]["data"][0];
        assert_eq!(first["entity"]["type"], "k8s:e2e:default:pod");
        assert_eq!(first["events"][0]["attributes"]["event.reason"], "Scheduled");
        assert_eq!(first["events"][0]["attributes"]["integrationVersion"], "1.2.3");

        let second = &bodies[1]["data"][0]["events"][0]["attributes"];
        assert_eq!(second["verb"], "UPDATE");
        assert_eq!(second["old_event.reason"], "BackOff");
    }

    /// A 5xx is retried; once attempts run out the delivery fails but the
    /// router keeps going.
    #[tokio::test]
    async fn test_e2e_agent_errors_are_isolated() {
        let agent = MockAgent::start(vec![503, 500, 400]).await;
        let app = config_for(&agent, "");
        let metrics = MetricsRegistry::new();
        let router = events_router(&app, &metrics);

        let producer = router.producer();
        let handle = router.spawn(CancellationToken::new());
        for name in ["a", "b", "c"] {
            producer.on_add(event("Created", "Pod", name)).await.unwrap();
        }
        drop(producer);

        let summary = handle.await.unwrap().unwrap();
        let sink = &summary.metrics.sinks["newRelicInfra"];
        assert_eq!(sink.received, 3);
        // a: 503 then 500 (attempts exhausted); b: 400; c: 204
        assert_eq!(sink.failed, 2);

        let http = metrics.http_sink();
        assert_eq!(http.responses(500), 1);
        assert_eq!(http.responses(503), 0);
        assert_eq!(http.responses(400), 1);
        assert_eq!(http.responses(204), 1);
        assert_eq!(agent.bodies().len(), 4);
    }

    /// Objects are described, split and shipped as description events
    #[tokio::test]
    async fn test_e2e_descriptions_to_agent() {
        let agent = MockAgent::start(vec![]).await;
        let app = config_for(
            &agent,
            "[descriptions]\nexcludeFilters = ['obj.kind == \"Secret\"']",
        );
        let metrics = MetricsRegistry::new();
        let desc = app.descriptions.clone().unwrap();

        let ctx = SinkContext::new("1.2.3", metrics.http_sink());
        let (_, sinks) = SinkRegistry::with_defaults()
            .create_sinks(&app.sinks, &ctx)
            .unwrap();
        let router: Router<KubeObject> = Router::new(
            RouterConfig::for_descriptions(&app, &desc).unwrap(),
            sinks,
            desc.exclude_filters.as_slice(),
            metrics.descriptions(),
        )
        .unwrap();

        let producer = router.producer();
        let handle = router.spawn(CancellationToken::new());
        producer
            .on_add(json!({"kind": "Secret", "metadata": {"name": "token", "namespace": "kube-system"}}))
            .await
            .unwrap();
        producer
            .on_add(json!({
                "kind": "Deployment",
                "metadata": {"name": "web", "namespace": "shop", "labels": {"app": "web"}},
                "spec": {"replicas": 3}
            }))
            .await
            .unwrap();
        drop(producer);

        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.metrics.filtered, 1);
        assert_eq!(metrics.http_sink().description_size_observations("Deployment"), 1);

        let bodies = agent.bodies();
        assert_eq!(bodies.len(), 1);
        let data = &bodies[0]["data"][0];
        assert_eq!(data["entity"]["type"], "k8s:e2e:shop:deployment");
        assert_eq!(data["entity"]["name"], "web");

        let attrs = &data["events"][0]["attributes"];
        assert_eq!(attrs["type"], "Deployment.Description");
        assert_eq!(attrs["displayName"], "web");
        let summary_text = attrs["summary.part[0]"].as_str().unwrap();
        assert!(summary_text.contains("web"));
        assert!(summary_text.contains("app=web"));
        assert_eq!(attrs["summary.part[1]"], "");
    }

    /// Sink that waits for a signal before every delivery
    struct GatedSink {
        gate: Arc<tokio::sync::Semaphore>,
    }

    #[async_trait::async_trait]
    impl Sink<KubeEvent> for GatedSink {
        fn name(&self) -> &str {
            "gated"
        }

        async fn deliver(&self, _: &KubeEvent) -> Result<(), contracts::ContractError> {
            let permit = self.gate.acquire().await.unwrap();
            permit.forget();
            Ok(())
        }
    }

    fn gated_router(capacity: i64) -> (Router<KubeEvent>, Arc<tokio::sync::Semaphore>) {
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let mut sinks: BTreeMap<String, Arc<dyn Sink<KubeEvent>>> = BTreeMap::new();
        sinks.insert(
            "gated".into(),
            Arc::new(GatedSink {
                gate: Arc::clone(&gate),
            }),
        );
        let config = RouterConfig::new()
            .with_work_queue_length(Some(capacity))
            .unwrap();
        let router = Router::new(
            config,
            sinks,
            &[] as &[&str],
            MetricsRegistry::new().events(),
        )
        .unwrap();
        (router, gate)
    }

    /// A full queue blocks producers until the consumer catches up
    #[tokio::test]
    async fn test_e2e_backpressure() {
        let (router, gate) = gated_router(2);
        let producer = router.producer();
        let handle = router.spawn(CancellationToken::new());

        // One in the sink, two queued.
        for name in ["a", "b", "c"] {
            producer.on_add(event("Created", "Pod", name)).await.unwrap();
        }
        let blocked = tokio::time::timeout(
            Duration::from_millis(100),
            producer.on_add(event("Created", "Pod", "d")),
        )
        .await;
        assert!(blocked.is_err(), "enqueue should wait on a full queue");

        gate.add_permits(10);
        producer.on_add(event("Created", "Pod", "d")).await.unwrap();
        drop(producer);

        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.reason, StopReason::Drained);
        assert_eq!(summary.metrics.sinks["gated"].received, 4);
    }

    /// Cancelling stops the router at the next boundary; queued items stay
    #[tokio::test]
    async fn test_e2e_shutdown_leaves_queue() {
        let (router, gate) = gated_router(8);
        let producer = router.producer();
        let stop = CancellationToken::new();
        let handle = router.spawn(stop.clone());

        for name in ["a", "b", "c", "d"] {
            producer.on_add(event("Created", "Pod", name)).await.unwrap();
        }
        // The router is now parked inside the first delivery.
        tokio::time::sleep(Duration::from_millis(20)).await;
        stop.cancel();
        gate.add_permits(10);

        let summary = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        // The producer is still alive, so only the stop token ends the loop.
        assert_eq!(summary.reason, StopReason::Cancelled);
        let received = summary.metrics.sinks["gated"].received;
        assert!(received >= 1);
        assert_eq!(received + summary.metrics.queue_len as u64, 4);
        drop(producer);
    }
}
