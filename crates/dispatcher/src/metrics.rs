//! Router and sink metrics
//!
//! Every value is kept in an atomic so tests and the CLI summary can read it,
//! and mirrored to the `metrics` facade for the Prometheus exporter.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use observability::metrics::{
    RouterMetricNames, DESCRIPTIONS, DESCRIPTION_ERRORS, DESCRIPTION_SIZE, EVENTS,
    HTTP_SINK_FAILURES, HTTP_SINK_RESPONSES,
};

/// Metrics for a single sink within one router
pub struct SinkMetrics {
    received: AtomicU64,
    failed: AtomicU64,
    deliveries: AtomicU64,
    latency_total_us: AtomicU64,
    latency_max_us: AtomicU64,
    received_counter: Counter,
    failed_counter: Counter,
    duration: Histogram,
}

impl SinkMetrics {
    fn new(names: &RouterMetricNames, sink: &str) -> Self {
        let label = sink.to_string();
        Self {
            received: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            latency_total_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            received_counter: counter!(names.received, "sink" => label.clone()),
            failed_counter: counter!(names.failed, "sink" => label.clone()),
            duration: histogram!(names.request_duration, "sink" => label),
        }
    }

    /// Notifications handed to the sink
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Increment received count
    pub fn inc_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
        self.received_counter.increment(1);
    }

    /// Failed deliveries
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Increment failure count
    pub fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.failed_counter.increment(1);
    }

    /// Record the duration of one delivery call
    pub fn observe(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.deliveries.fetch_add(1, Ordering::Relaxed);
        self.latency_total_us.fetch_add(micros, Ordering::Relaxed);
        self.latency_max_us.fetch_max(micros, Ordering::Relaxed);
        self.duration.record(elapsed.as_secs_f64());
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let deliveries = self.deliveries.load(Ordering::Relaxed);
        let total = self.latency_total_us.load(Ordering::Relaxed);
        MetricsSnapshot {
            received: self.received(),
            failed: self.failed(),
            observed: deliveries,
            mean_latency: Duration::from_micros(total.checked_div(deliveries).unwrap_or(0)),
            max_latency: Duration::from_micros(self.latency_max_us.load(Ordering::Relaxed)),
        }
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub received: u64,
    pub failed: u64,
    /// Deliveries timed by the instrumented wrapper
    pub observed: u64,
    pub mean_latency: Duration,
    pub max_latency: Duration,
}

/// Metrics for one router instance
pub struct RouterMetrics {
    names: RouterMetricNames,
    sinks: Mutex<BTreeMap<String, Arc<SinkMetrics>>>,
    processed: AtomicU64,
    filtered: AtomicU64,
    filter_errors: AtomicU64,
    queue_len: AtomicUsize,
    filtered_counter: Counter,
    filter_error_counter: Counter,
    queue_gauge: Gauge,
}

impl RouterMetrics {
    /// Metrics under the given name set
    pub fn new(names: RouterMetricNames) -> Self {
        Self {
            names,
            sinks: Mutex::new(BTreeMap::new()),
            processed: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            filter_errors: AtomicU64::new(0),
            queue_len: AtomicUsize::new(0),
            filtered_counter: counter!(names.filtered),
            filter_error_counter: counter!(names.filter_errors),
            queue_gauge: gauge!(names.workqueue_length),
        }
    }

    /// Router name used in logs
    pub fn router(&self) -> &'static str {
        self.names.router
    }

    /// Per-sink metrics, created on first use
    pub fn sink(&self, name: &str) -> Arc<SinkMetrics> {
        let mut sinks = self.sinks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            sinks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(SinkMetrics::new(&self.names, name))),
        )
    }

    /// Count a notification popped from the queue
    pub fn inc_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a notification dropped by an exclude filter
    pub fn inc_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
        self.filtered_counter.increment(1);
    }

    /// Count a filter evaluation failure
    pub fn inc_filter_errors(&self) {
        self.filter_errors.fetch_add(1, Ordering::Relaxed);
        self.filter_error_counter.increment(1);
    }

    /// Publish the current queue depth
    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
        self.queue_gauge.set(len as f64);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> RouterSnapshot {
        let sinks = self.sinks.lock().unwrap_or_else(PoisonError::into_inner);
        RouterSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            filter_errors: self.filter_errors.load(Ordering::Relaxed),
            queue_len: self.queue_len.load(Ordering::Relaxed),
            sinks: sinks
                .iter()
                .map(|(name, m)| (name.clone(), m.snapshot()))
                .collect(),
        }
    }
}

/// Snapshot of router metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterSnapshot {
    pub processed: u64,
    pub filtered: u64,
    pub filter_errors: u64,
    pub queue_len: usize,
    pub sinks: BTreeMap<String, MetricsSnapshot>,
}

/// Counters owned by the HTTP delivery sink
pub struct HttpSinkMetrics {
    transport_failures: AtomicU64,
    responses: Mutex<BTreeMap<u16, u64>>,
    description_errors: Mutex<BTreeMap<String, u64>>,
    description_sizes: Mutex<BTreeMap<String, u64>>,
    failures_counter: Counter,
}

impl Default for HttpSinkMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpSinkMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self {
            transport_failures: AtomicU64::new(0),
            responses: Mutex::new(BTreeMap::new()),
            description_errors: Mutex::new(BTreeMap::new()),
            description_sizes: Mutex::new(BTreeMap::new()),
            failures_counter: counter!(HTTP_SINK_FAILURES),
        }
    }

    /// Count a request that never produced a response
    pub fn inc_transport_failures(&self) {
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
        self.failures_counter.increment(1);
    }

    /// Transport failure count
    pub fn transport_failures(&self) -> u64 {
        self.transport_failures.load(Ordering::Relaxed)
    }

    /// Count a response by status code
    pub fn inc_response(&self, code: u16) {
        *self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(code)
            .or_default() += 1;
        counter!(HTTP_SINK_RESPONSES, "code" => code.to_string()).increment(1);
    }

    /// Responses seen with this status code
    pub fn responses(&self, code: u16) -> u64 {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&code)
            .copied()
            .unwrap_or(0)
    }

    /// Total responses, any code
    pub fn total_responses(&self) -> u64 {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }

    /// Count a description that could not be built
    pub fn inc_description_error(&self, kind: &str) {
        *self
            .description_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind.to_string())
            .or_default() += 1;
        counter!(DESCRIPTION_ERRORS, "obj_kind" => kind.to_string()).increment(1);
    }

    /// Description errors for a kind
    pub fn description_errors(&self, kind: &str) -> u64 {
        self.description_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .copied()
            .unwrap_or(0)
    }

    /// Record the size of a generated description
    pub fn observe_description_size(&self, kind: &str, bytes: usize) {
        *self
            .description_sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind.to_string())
            .or_default() += 1;
        histogram!(DESCRIPTION_SIZE, "obj_kind" => kind.to_string()).record(bytes as f64);
    }

    /// Number of size observations for a kind
    pub fn description_size_observations(&self, kind: &str) -> u64 {
        self.description_sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .copied()
            .unwrap_or(0)
    }
}

/// All metrics of the process, passed explicitly to routers and sinks
#[derive(Clone)]
pub struct MetricsRegistry {
    events: Arc<RouterMetrics>,
    descriptions: Arc<RouterMetrics>,
    http_sink: Arc<HttpSinkMetrics>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    /// Create a registry with empty counters
    pub fn new() -> Self {
        Self {
            events: Arc::new(RouterMetrics::new(EVENTS)),
            descriptions: Arc::new(RouterMetrics::new(DESCRIPTIONS)),
            http_sink: Arc::new(HttpSinkMetrics::new()),
        }
    }

    /// Event router metrics
    pub fn events(&self) -> Arc<RouterMetrics> {
        Arc::clone(&self.events)
    }

    /// Description router metrics
    pub fn descriptions(&self) -> Arc<RouterMetrics> {
        Arc::clone(&self.descriptions)
    }

    /// HTTP sink metrics
    pub fn http_sink(&self) -> Arc<HttpSinkMetrics> {
        Arc::clone(&self.http_sink)
    }
}
