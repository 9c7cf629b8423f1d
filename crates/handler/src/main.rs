//! 分组扇出消息处理服务
//!
//! 按分组注册表为每个消费组启动一个消费者，另启动一个撤回消费者，
//! 收到 Ctrl+C 或 SIGTERM 后等待在途消息处理完毕再退出。

use std::sync::Arc;

use anyhow::Result;
use herald_handler::consumer::GroupConsumer;
use herald_handler::filter::TagFilter;
use herald_handler::group::{ChannelGroupMapping, GroupIdMapping, GroupRegistry};
use herald_handler::pool::ConsumerPool;
use herald_handler::recall::RecallConsumer;
use herald_handler::sink::{ConsumeService, LoggingConsumeService};
use herald_shared::config::AppConfig;
use herald_shared::observability;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load("herald-handler")?;

    let obs_config = config.observability.clone().with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!(environment = %config.environment, "Starting herald-handler...");

    let mapping: Arc<dyn GroupIdMapping> = Arc::new(ChannelGroupMapping);
    let registry = GroupRegistry::from_mapping(mapping.as_ref())?;
    info!(groups = registry.len(), "分组注册表已加载");

    let sink: Arc<dyn ConsumeService> = Arc::new(LoggingConsumeService);
    let filter = TagFilter::from_config(&config.business);

    let requested = config.business.group_consumers.unwrap_or(registry.len());
    let mut pool = ConsumerPool::provision(&registry, requested, |binding| {
        GroupConsumer::new(binding, filter.clone(), mapping.clone(), sink.clone())
    })?;
    pool.subscribe_all(&config.kafka, &config.business.topic)?;

    let mut recall = RecallConsumer::from_config(&config.business, sink.clone());
    recall.subscribe(&config.kafka, &config.business.recall_topic)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pool_task = tokio::spawn(pool.run(shutdown_rx.clone()));
    let recall_task = tokio::spawn(recall.run(shutdown_rx));

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    let mut failed = false;
    for (name, task) in [("group", pool_task), ("recall", recall_task)] {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(consumer = name, error = %e, "消费者退出时出错");
                failed = true;
            }
            Err(e) => {
                error!(consumer = name, error = %e, "消费者任务异常终止");
                failed = true;
            }
        }
    }

    if failed {
        anyhow::bail!("部分消费者未能正常关闭");
    }

    info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
