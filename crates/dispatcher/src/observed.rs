//! ObservedSink - times every delivery of the wrapped sink

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use contracts::{ContractError, Sink};

use crate::metrics::SinkMetrics;

/// Decorator recording delivery latency, success or not
pub struct ObservedSink<N> {
    inner: Arc<dyn Sink<N>>,
    observer: Arc<SinkMetrics>,
}

impl<N> ObservedSink<N> {
    /// Wrap `inner`, reporting into `observer`
    pub fn new(inner: Arc<dyn Sink<N>>, observer: Arc<SinkMetrics>) -> Self {
        Self { inner, observer }
    }

    /// Metrics this wrapper reports into
    pub fn observer(&self) -> &Arc<SinkMetrics> {
        &self.observer
    }
}

#[async_trait]
impl<N> Sink<N> for ObservedSink<N>
where
    N: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn deliver(&self, notification: &N) -> Result<(), ContractError> {
        let start = Instant::now();
        let result = self.inner.deliver(notification).await;
        self.observer.observe(start.elapsed());
        result
    }
}
