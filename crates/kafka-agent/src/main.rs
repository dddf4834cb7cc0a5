//! Kafka -> A2A 任务代理服务
//!
//! 消费业务事件并分发为异步任务。

use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use a2a_shared::config::AppConfig;
use a2a_shared::observability;
use a2a_shared::task::TaskClient;
use a2a_task_backend::{ActionRegistry, LocalTaskClient, TracingStatusCallback};
use kafka_a2a_agent::{AgentConsumer, TaskDispatcher};

const SERVICE_NAME: &str = "kafka-a2a-agent";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置，失败时使用默认值
    let config = AppConfig::load(SERVICE_NAME).unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {e}");
        AppConfig {
            service_name: SERVICE_NAME.to_string(),
            ..AppConfig::default()
        }
    });

    // 2. 初始化日志和指标
    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting {SERVICE_NAME}...");
    info!(
        environment = %config.environment,
        production = config.is_production(),
        brokers = %config.kafka.brokers,
        group_id = %config.kafka.consumer_group,
        wait_for_result = config.dispatcher.wait_for_result,
        poll_timeout_secs = config.dispatcher.poll_timeout_secs,
        "Configuration loaded"
    );

    // 3. 任务后端，进程内唯一实例
    let registry = ActionRegistry::with_defaults(Arc::new(TracingStatusCallback));
    let backend = LocalTaskClient::start(&config.task_backend, registry);
    let client: Arc<dyn TaskClient> = Arc::new(backend.clone());

    // 4. 分发器与消费者
    let dispatcher = Arc::new(TaskDispatcher::new(client, config.dispatcher.clone()));
    let consumer = AgentConsumer::new(&config.kafka, dispatcher)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer_handle = tokio::spawn(consumer.run(shutdown_rx));

    info!("{SERVICE_NAME} started");

    shutdown_signal().await;

    // 5. 先停止消费，再排空任务后端
    let _ = shutdown_tx.send(true);
    if let Err(e) = consumer_handle.await {
        error!(error = %e, "消费者任务异常退出");
    }
    backend.shutdown().await;

    info!("Service shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
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
