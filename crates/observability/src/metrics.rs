//! 指标名称与描述
//!
//! 所有指标名称集中在这里，路由器与 sink 通过常量引用，
//! Prometheus 导出器据此设置 help 文本和 histogram buckets。

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// 单个路由器（events / descriptions）使用的指标名称
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterMetricNames {
    /// 日志中使用的路由器名称
    pub router: &'static str,
    /// 每个 sink 的投递耗时 (histogram, label: sink)
    pub request_duration: &'static str,
    /// 每个 sink 收到的通知数 (counter, label: sink)
    pub received: &'static str,
    /// 每个 sink 投递失败数 (counter, label: sink)
    pub failed: &'static str,
    /// 工作队列当前长度 (gauge)
    pub workqueue_length: &'static str,
    /// 被过滤掉的通知数 (counter)
    pub filtered: &'static str,
    /// 过滤表达式运行失败数 (counter)
    pub filter_errors: &'static str,
}

/// 事件路由器
pub const EVENTS: RouterMetricNames = RouterMetricNames {
    router: "events",
    request_duration: "nr_kube_events_sink_request_duration_seconds",
    received: "nr_kube_events_received_events_total",
    failed: "nr_kube_events_failed_events_total",
    workqueue_length: "nr_kube_events_workqueue_length",
    filtered: "nr_kube_events_filtered_events_total",
    filter_errors: "nr_kube_events_filter_errors_total",
};

/// 资源描述路由器
pub const DESCRIPTIONS: RouterMetricNames = RouterMetricNames {
    router: "descriptions",
    request_duration: "nr_k8s_descriptions_sink_request_duration_seconds",
    received: "nr_k8s_descriptions_received",
    failed: "nr_k8s_descriptions_failed",
    workqueue_length: "nr_k8s_descriptions_workqueue_length",
    filtered: "nr_k8s_descriptions_filtered",
    filter_errors: "nr_k8s_descriptions_filter_errors",
};

/// HTTP 传输层失败 (counter)
pub const HTTP_SINK_FAILURES: &str = "nr_http_sink_infra_sink_http_failures_total";

/// HTTP 响应数 (counter, label: code)
pub const HTTP_SINK_RESPONSES: &str = "nr_http_sink_infra_sink_http_responses_total";

/// 描述文本大小 (histogram, label: obj_kind)
pub const DESCRIPTION_SIZE: &str = "nr_k8s_descriptions_size";

/// 描述生成失败 (counter, label: obj_kind)
pub const DESCRIPTION_ERRORS: &str = "nr_k8s_descriptions_err";

/// 描述大小 histogram buckets: 2048 起，指数 2，共 6 个
pub const DESCRIPTION_SIZE_BUCKETS: [f64; 6] = [2048.0, 4096.0, 8192.0, 16384.0, 32768.0, 65536.0];

/// 注册所有指标的 help 文本
///
/// 需在安装 recorder 之后调用，否则描述会被丢弃。
pub fn describe_metrics() {
    for names in [EVENTS, DESCRIPTIONS] {
        describe_histogram!(
            names.request_duration,
            Unit::Seconds,
            "Duration of a sink delivery call"
        );
        describe_counter!(names.received, "Notifications handed to a sink");
        describe_counter!(names.failed, "Notifications a sink failed to deliver");
        describe_gauge!(
            names.workqueue_length,
            "Notifications currently queued in the workqueue"
        );
        describe_counter!(names.filtered, "Notifications dropped by an exclude filter");
        describe_counter!(names.filter_errors, "Exclude filter evaluation failures");
    }

    describe_counter!(
        HTTP_SINK_FAILURES,
        "Total failed HTTP requests to the infrastructure agent"
    );
    describe_counter!(
        HTTP_SINK_RESPONSES,
        "HTTP responses from the infrastructure agent by status code"
    );
    describe_histogram!(
        DESCRIPTION_SIZE,
        Unit::Bytes,
        "Size of generated object descriptions"
    );
    describe_counter!(
        DESCRIPTION_ERRORS,
        "Errors while generating object descriptions"
    );
}
