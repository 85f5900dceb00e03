//! Pipeline statistics and metrics.

use std::time::Duration;

use dispatcher::{RunSummary, StopReason};

use super::SourceStats;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Total duration of the run
    pub duration: Duration,

    /// One summary per router that ran
    pub routers: Vec<RunSummary>,

    /// One entry per replay source
    pub sources: Vec<SourceStats>,

    /// Agent requests that never got a response
    pub http_transport_failures: u64,

    /// Agent responses, any status
    pub http_responses: u64,
}

impl PipelineStats {
    /// Notifications taken off all queues
    pub fn processed(&self) -> u64 {
        self.routers.iter().map(|r| r.metrics.processed).sum()
    }

    /// Failed deliveries across all routers and sinks
    pub fn failed_deliveries(&self) -> u64 {
        self.routers
            .iter()
            .flat_map(|r| r.metrics.sinks.values())
            .map(|s| s.failed)
            .sum()
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Router Statistics ===\n");
        println!("Duration: {:.2}s", self.duration.as_secs_f64());

        for source in &self.sources {
            println!(
                "Source {}: {} enqueued, {} skipped",
                source.path, source.enqueued, source.skipped
            );
        }

        for router in &self.routers {
            let m = &router.metrics;
            let reason = match router.reason {
                StopReason::Cancelled => "cancelled",
                StopReason::Drained => "drained",
            };
            println!(
                "\nRouter '{}' ({reason}): processed {}, filtered {}, filter errors {}, left in queue {}",
                router.router, m.processed, m.filtered, m.filter_errors, m.queue_len
            );
            println!(
                "  {:<20} {:>10} {:>10} {:>12} {:>12}",
                "sink", "received", "failed", "mean (ms)", "max (ms)"
            );
            for (name, sink) in &m.sinks {
                println!(
                    "  {:<20} {:>10} {:>10} {:>12.3} {:>12.3}",
                    name,
                    sink.received,
                    sink.failed,
                    sink.mean_latency.as_secs_f64() * 1000.0,
                    sink.max_latency.as_secs_f64() * 1000.0
                );
            }
        }

        if self.http_responses > 0 || self.http_transport_failures > 0 {
            println!(
                "\nAgent HTTP: {} responses, {} transport failures",
                self.http_responses, self.http_transport_failures
            );
        }

        println!();
    }
}
