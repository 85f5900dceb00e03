//! Router - bounded work queue, exclude filters and fan-out to sinks

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use contracts::{Event, FilterErrorPolicy, KubeEvent, KubeObject, Sink};
use serde_json::Value;

use crate::config::RouterConfig;
use crate::error::DispatcherError;
use crate::filter::{ExcludeFilters, Filterable};
use crate::metrics::{RouterMetrics, RouterSnapshot};
use crate::observed::ObservedSink;

/// Why a router loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The stop token was cancelled; queued items may remain
    Cancelled,
    /// Every producer was dropped and the queue ran empty
    Drained,
}

/// Outcome of [`Router::run`]
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub router: &'static str,
    pub reason: StopReason,
    pub duration: Duration,
    pub metrics: RouterSnapshot,
}

/// Handle used by watch callbacks to push notifications
///
/// Cloning is cheap; the router keeps running until every clone is dropped
/// or the stop token fires.
pub struct Producer<N> {
    tx: mpsc::Sender<N>,
    metrics: Arc<RouterMetrics>,
}

impl<N> Clone for Producer<N> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<N> Producer<N> {
    /// Queue a notification, waiting while the queue is full
    ///
    /// # Errors
    /// `QueueClosed` once the router has stopped.
    pub async fn enqueue(&self, notification: N) -> Result<(), DispatcherError> {
        self.tx
            .send(notification)
            .await
            .map_err(|_| DispatcherError::QueueClosed)?;
        self.metrics.set_queue_len(self.len());
        Ok(())
    }

    /// Queue a notification from synchronous code, blocking the thread while
    /// the queue is full
    ///
    /// Must not be called from within an async execution context.
    pub fn blocking_enqueue(&self, notification: N) -> Result<(), DispatcherError> {
        self.tx
            .blocking_send(notification)
            .map_err(|_| DispatcherError::QueueClosed)?;
        self.metrics.set_queue_len(self.len());
        Ok(())
    }

    /// Notifications currently queued
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue capacity
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

impl Producer<KubeEvent> {
    /// Watch callback for a newly observed event
    pub async fn on_add(&self, event: Event) -> Result<(), DispatcherError> {
        self.enqueue(KubeEvent::added(event)).await
    }

    /// Watch callback for a changed event
    pub async fn on_update(&self, old: Event, new: Event) -> Result<(), DispatcherError> {
        self.enqueue(KubeEvent::updated(old, new)).await
    }
}

impl Producer<KubeObject> {
    /// Watch callback for a newly observed object
    pub async fn on_add(&self, obj: Value) -> Result<(), DispatcherError> {
        self.enqueue(KubeObject::added(obj)).await
    }

    /// Watch callback for a changed object
    pub async fn on_update(&self, old: Value, new: Value) -> Result<(), DispatcherError> {
        self.enqueue(KubeObject::updated(old, new)).await
    }
}

/// Filter and fan-out state, borrowed by the consumer loop
struct Dispatch<N> {
    config: RouterConfig,
    sinks: Vec<(String, ObservedSink<N>)>,
    filters: ExcludeFilters<N>,
    metrics: Arc<RouterMetrics>,
}

impl<N> Dispatch<N>
where
    N: Filterable + Send + Sync + 'static,
{
    async fn publish(&self, notification: N) -> Result<(), DispatcherError> {
        let router = self.metrics.router();
        self.metrics.inc_processed();

        match self.filters.excludes(&notification) {
            Ok(true) => {
                debug!(router, "Notification excluded by filter");
                self.metrics.inc_filtered();
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => {
                self.metrics.inc_filter_errors();
                match self.config.filter_error_policy() {
                    FilterErrorPolicy::Abort => {
                        error!(router, error = %e, "Exclude filter failed, stopping router");
                        return Err(DispatcherError::FilterRuntime(e));
                    }
                    FilterErrorPolicy::Skip => {
                        warn!(router, error = %e, "Exclude filter failed, notification dropped");
                        return Ok(());
                    }
                }
            }
        }

        for (name, sink) in &self.sinks {
            sink.observer().inc_received();
            if let Err(e) = sink.deliver(&notification).await {
                warn!(router, sink = %name, error = %e, "Sink delivery failed");
                sink.observer().inc_failed();
            }
        }
        Ok(())
    }
}

/// Bounded-queue router for one notification type
pub struct Router<N> {
    tx: mpsc::Sender<N>,
    rx: mpsc::Receiver<N>,
    dispatch: Dispatch<N>,
}

impl<N> Router<N>
where
    N: Filterable + Send + Sync + 'static,
{
    /// Build a router; sinks are visited in name order
    ///
    /// # Errors
    /// `FilterCompile` when an exclude filter does not compile.
    pub fn new<S: AsRef<str>>(
        config: RouterConfig,
        sinks: BTreeMap<String, Arc<dyn Sink<N>>>,
        exclude_filters: &[S],
        metrics: Arc<RouterMetrics>,
    ) -> Result<Self, DispatcherError> {
        let filters =
            ExcludeFilters::compile(exclude_filters).map_err(DispatcherError::FilterCompile)?;

        let sinks = sinks
            .into_iter()
            .map(|(name, sink)| {
                let observed = ObservedSink::new(sink, metrics.sink(&name));
                (name, observed)
            })
            .collect();

        let (tx, rx) = mpsc::channel(config.work_queue_length());
        metrics.set_queue_len(0);

        Ok(Self {
            tx,
            rx,
            dispatch: Dispatch {
                config,
                sinks,
                filters,
                metrics,
            },
        })
    }

    /// New producer handle for this router's queue
    pub fn producer(&self) -> Producer<N> {
        Producer {
            tx: self.tx.clone(),
            metrics: Arc::clone(&self.dispatch.metrics),
        }
    }

    /// Queue capacity
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Names of the registered sinks, in delivery order
    pub fn sink_names(&self) -> Vec<&str> {
        self.dispatch.sinks.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Run the consumer loop
    ///
    /// Returns when `stop` is cancelled, or when every producer has been
    /// dropped and the queue is empty. A cancellation racing with a ready
    /// notification may win; queued notifications are then not delivered.
    ///
    /// # Errors
    /// `FilterRuntime` when a filter fails under the abort policy.
    #[instrument(
        name = "router_run",
        skip(self, stop),
        fields(router = self.dispatch.metrics.router())
    )]
    pub async fn run(self, stop: CancellationToken) -> Result<RunSummary, DispatcherError> {
        let Router { tx, mut rx, dispatch } = self;
        // Only producers keep the queue open from here on.
        drop(tx);

        let router = dispatch.metrics.router();
        info!(
            router,
            sinks = dispatch.sinks.len(),
            filters = dispatch.filters.len(),
            capacity = dispatch.config.work_queue_length(),
            "Router started"
        );

        let started = Instant::now();
        let reason = loop {
            tokio::select! {
                _ = stop.cancelled() => break StopReason::Cancelled,
                next = rx.recv() => match next {
                    Some(notification) => {
                        dispatch.metrics.set_queue_len(rx.len());
                        dispatch.publish(notification).await?;
                    }
                    None => break StopReason::Drained,
                },
            }
        };

        let summary = RunSummary {
            router,
            reason,
            duration: started.elapsed(),
            metrics: dispatch.metrics.snapshot(),
        };
        info!(
            router,
            reason = ?summary.reason,
            processed = summary.metrics.processed,
            left_in_queue = rx.len(),
            "Router stopped"
        );
        Ok(summary)
    }

    /// Spawn the router as a background task
    pub fn spawn(
        self,
        stop: CancellationToken,
    ) -> JoinHandle<Result<RunSummary, DispatcherError>> {
        tokio::spawn(self.run(stop))
    }
}
