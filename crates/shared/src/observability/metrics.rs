//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::ObservabilityConfig;

/// Metrics 资源守卫
pub struct MetricsHandle {
    server_handle: tokio::task::JoinHandle<()>,
}

impl Drop for MetricsHandle {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle { server_handle })
}

/// 注册通用指标描述，出现在 /metrics 端点的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "a2a_records_received_total",
        "Total number of Kafka records received"
    );
    metrics::describe_counter!(
        "a2a_records_acked_total",
        "Total number of Kafka records acknowledged"
    );
    metrics::describe_counter!(
        "a2a_records_unacked_total",
        "Total number of Kafka records left unacknowledged"
    );
    metrics::describe_counter!(
        "a2a_tasks_submitted_total",
        "Total number of tasks submitted to the task backend"
    );
    metrics::describe_counter!(
        "a2a_task_poll_timeouts_total",
        "Total number of task result waits that timed out"
    );
    metrics::describe_counter!(
        "a2a_tasks_completed_total",
        "Total number of tasks finished by the task backend"
    );
    metrics::describe_gauge!(
        "a2a_partition_blocked",
        "Whether offset commits are paused on a partition by an unacknowledged record"
    );
    metrics::describe_histogram!(
        "a2a_dispatch_duration_seconds",
        "Record dispatch duration in seconds"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录收到的消息
#[inline]
pub fn record_received(topic: &str) {
    metrics::counter!("a2a_records_received_total", "topic" => topic.to_string()).increment(1);
}

/// 记录消息确认结果，`reason` 仅在未确认时有意义
#[inline]
pub fn record_ack(topic: &str, acked: bool, reason: &str) {
    if acked {
        metrics::counter!("a2a_records_acked_total", "topic" => topic.to_string()).increment(1);
    } else {
        metrics::counter!(
            "a2a_records_unacked_total",
            "topic" => topic.to_string(),
            "reason" => reason.to_string()
        )
        .increment(1);
    }
}

/// 记录任务提交和分发耗时
#[inline]
pub fn record_dispatch(message_type: &str, submitted: bool, duration_secs: f64) {
    if submitted {
        metrics::counter!(
            "a2a_tasks_submitted_total",
            "message_type" => message_type.to_string()
        )
        .increment(1);
    }

    metrics::histogram!(
        "a2a_dispatch_duration_seconds",
        "message_type" => message_type.to_string()
    )
    .record(duration_secs);
}

/// 记录等待任务结果超时
#[inline]
pub fn record_poll_timeout(message_type: &str) {
    metrics::counter!(
        "a2a_task_poll_timeouts_total",
        "message_type" => message_type.to_string()
    )
    .increment(1);
}

/// 记录分区是否因未确认消息暂停提交
#[inline]
pub fn record_partition_blocked(topic: &str, partition: i32, blocked: bool) {
    metrics::gauge!(
        "a2a_partition_blocked",
        "topic" => topic.to_string(),
        "partition" => partition.to_string()
    )
    .set(if blocked { 1.0 } else { 0.0 });
}

/// 记录任务后端完成的任务
#[inline]
pub fn record_task_finished(status: &str) {
    metrics::counter!("a2a_tasks_completed_total", "status" => status.to_string()).increment(1);
}
