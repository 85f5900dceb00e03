//! # Dispatcher
//!
//! 通知路由模块。
//!
//! 负责：
//! - 有界工作队列（满时阻塞生产者）
//! - 排除过滤（QuickJS 表达式）
//! - 按名称顺序 fan-out 到多个 sinks，单个 sink 失败不影响其它 sink
//! - stdout / newRelicInfra sink 实现

pub mod config;
pub mod error;
pub mod filter;
pub mod flatten;
pub mod metrics;
pub mod observed;
pub mod registry;
pub mod router;
pub mod sinks;
pub mod split;

pub use crate::config::{RouterConfig, DEFAULT_WORK_QUEUE_LENGTH};
pub use crate::error::DispatcherError;
pub use crate::filter::{ExcludeFilters, FilterEngine, FilterError, FilterProgram, Filterable};
pub use crate::flatten::{flatten, Attributes};
pub use crate::metrics::{
    HttpSinkMetrics, MetricsRegistry, MetricsSnapshot, RouterMetrics, RouterSnapshot, SinkMetrics,
};
pub use crate::observed::ObservedSink;
pub use crate::registry::{
    RegisteredSink, SinkContext, SinkFactory, SinkRegistry, SinkSet, NEW_RELIC_INFRA_SINK,
    STDOUT_SINK,
};
pub use crate::router::{Producer, Router, RunSummary, StopReason};
pub use crate::sinks::{NewRelicInfraSink, StdoutSink};
pub use crate::split::{limit_split, NRDB_LIMIT, SPLIT_MAX_COLS};
pub use contracts::{KubeEvent, KubeObject, Sink};
