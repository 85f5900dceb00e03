//! # Observability
//!
//! 可观测性模块：Tracing + Prometheus 指标。
//!
//! ## 功能
//!
//! - Tracing 初始化 (JSON/Pretty/Compact 格式)
//! - Prometheus 指标导出（含描述大小的自定义 buckets）
//! - 路由器与 sink 指标名称
//!
//! ## 使用示例
//!
//! ```ignore
//! use observability::{init_metrics_only, metrics::EVENTS};
//!
//! init_metrics_only("0.0.0.0:8080".parse()?)?;
//! metrics::counter!(EVENTS.received, "sink" => "stdout").increment(1);
//! ```

pub mod metrics;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use crate::metrics::{describe_metrics, RouterMetricNames, DESCRIPTIONS, EVENTS};

/// 默认 histogram buckets（秒）
pub const DEFAULT_DURATION_BUCKETS: [f64; 11] =
    [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// 默认指标监听地址
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";

/// 可观测性配置
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// 日志格式
    pub log_format: LogFormat,
    /// Prometheus 监听地址 (None = 禁用)
    pub metrics_addr: Option<SocketAddr>,
    /// 默认日志级别（RUST_LOG 优先）
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_addr: DEFAULT_METRICS_ADDR.parse().ok(),
            default_log_level: "info".to_string(),
        }
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON 结构化日志
    #[default]
    Json,
    /// 人类可读格式
    Pretty,
    /// 紧凑单行格式
    Compact,
}

/// 初始化可观测性（Tracing + Prometheus）
pub fn init() -> Result<()> {
    init_with_config(ObservabilityConfig::default())
}

/// 使用自定义配置初始化
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_log_level));
    init_tracing(filter, config.log_format)?;

    if let Some(addr) = config.metrics_addr {
        init_metrics_only(addr)?;
    }

    tracing::info!(
        log_format = ?config.log_format,
        metrics_addr = ?config.metrics_addr,
        "Observability initialized"
    );

    Ok(())
}

/// 安装 tracing subscriber
///
/// 全局只能安装一次，重复调用返回错误。
pub fn init_tracing(filter: EnvFilter, format: LogFormat) -> Result<()> {
    let fmt_layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")
}

/// 仅初始化 Prometheus 指标（不初始化 Tracing）
///
/// 用于 Tracing 已由其他模块初始化的场景。
pub fn init_metrics_only(addr: SocketAddr) -> Result<()> {
    prometheus_builder(addr)?
        .install()
        .context("Failed to install Prometheus recorder")?;

    describe_metrics();

    tracing::info!(%addr, "Prometheus metrics endpoint initialized");
    Ok(())
}

/// 带默认 buckets 的 exporter builder
fn prometheus_builder(addr: SocketAddr) -> Result<PrometheusBuilder> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets(&DEFAULT_DURATION_BUCKETS)
        .context("Invalid default histogram buckets")?
        .set_buckets_for_metric(
            Matcher::Full(crate::metrics::DESCRIPTION_SIZE.to_string()),
            &crate::metrics::DESCRIPTION_SIZE_BUCKETS,
        )
        .context("Invalid description size buckets")
}
