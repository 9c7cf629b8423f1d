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

use super::ObservabilityConfig;

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册通用指标描述，出现在 /metrics 端点的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "herald_records_total",
        "Total number of records handled, by consumer, group and outcome"
    );
    metrics::describe_histogram!(
        "herald_record_duration_seconds",
        "Record handling duration in seconds"
    );
    metrics::describe_gauge!(
        "herald_consumers_provisioned",
        "Number of group consumers provisioned at startup"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

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

/// 记录一条消息的处理结果
///
/// `consumer` 区分分组消费者与撤回消费者，`group` 为消费组标识。
#[inline]
pub fn record_outcome(consumer: &'static str, group: &str, outcome: &'static str, duration_secs: f64) {
    metrics::counter!(
        "herald_records_total",
        "consumer" => consumer,
        "group" => group.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    metrics::histogram!(
        "herald_record_duration_seconds",
        "consumer" => consumer,
        "outcome" => outcome
    )
    .record(duration_secs);
}

/// 记录启动时创建的分组消费者数量
#[inline]
pub fn set_consumers_provisioned(count: usize) {
    metrics::gauge!("herald_consumers_provisioned").set(count as f64);
}
