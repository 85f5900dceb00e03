//! Replay source - feeds a router from newline-delimited JSON.
//!
//! Each line is either a full notification (`{"verb": ..., ...}`) or a bare
//! resource, which is treated as ADDED. Unparseable lines are skipped.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use contracts::{Event, KubeEvent, KubeObject};
use dispatcher::Producer;

/// A notification that can be read from a replay line
pub trait ReplayRecord: DeserializeOwned + Send + Sync + 'static {
    /// Wrap a bare resource as an ADDED notification
    fn from_raw(value: Value) -> Result<Self, serde_json::Error>;

    /// Parse one line
    fn parse_line(line: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(line)?;
        if value.get("verb").is_some() {
            serde_json::from_value(value)
        } else {
            Self::from_raw(value)
        }
    }
}

impl ReplayRecord for KubeEvent {
    fn from_raw(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value::<Event>(value).map(KubeEvent::added)
    }
}

impl ReplayRecord for KubeObject {
    fn from_raw(value: Value) -> Result<Self, serde_json::Error> {
        Ok(KubeObject::added(value))
    }
}

/// Counters for one replay source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub path: String,
    pub enqueued: u64,
    pub skipped: u64,
}

/// Open a replay file, `-` meaning stdin
async fn open(path: &Path) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open replay source {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Push every notification in `path` into `producer`
///
/// Returns when the input ends, `stop` fires, or the router goes away.
/// The producer is dropped on return so the router can drain.
#[instrument(name = "replay_source", skip(producer, stop), fields(path = %path.display()))]
pub async fn replay<N: ReplayRecord>(
    path: PathBuf,
    producer: Producer<N>,
    stop: CancellationToken,
) -> Result<SourceStats> {
    let mut lines = open(&path).await?.lines();
    let mut stats = SourceStats {
        path: path.display().to_string(),
        ..Default::default()
    };
    let mut line_no = 0u64;

    loop {
        let line = tokio::select! {
            _ = stop.cancelled() => break,
            line = lines.next_line() => line
                .with_context(|| format!("Failed to read {}", path.display()))?,
        };
        let Some(line) = line else { break };
        line_no += 1;

        if line.trim().is_empty() {
            continue;
        }

        let notification = match N::parse_line(&line) {
            Ok(n) => n,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping unparseable notification");
                stats.skipped += 1;
                continue;
            }
        };

        tokio::select! {
            _ = stop.cancelled() => break,
            sent = producer.enqueue(notification) => {
                if let Err(e) = sent {
                    debug!(error = %e, "Router is gone, stopping replay");
                    break;
                }
            }
        }
        stats.enqueued += 1;
    }

    info!(
        enqueued = stats.enqueued,
        skipped = stats.skipped,
        "Replay source finished"
    );
    Ok(stats)
}
