//! Kafka 消费者与消息分发
//!
//! 每个 topic 一个监听器，各自持有消费组内的一个 `KafkaConsumer`，
//! 作为独立的 tokio 任务并发运行。监听器内部逐条处理消息：
//! 查找消息类型 -> 交给分发器 -> 根据结果决定是否确认。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use a2a_shared::config::KafkaConfig;
use a2a_shared::kafka::{AckDecision, ConsumerMessage, KafkaConsumer};
use a2a_shared::observability::metrics;
use a2a_shared::task::Task;

use crate::dispatcher::TaskDispatcher;
use crate::error::AgentError;
use crate::routes::{ROUTES, message_type_for};

struct Listener {
    topic: &'static str,
    consumer: KafkaConsumer,
}

/// Topic 消费者
pub struct AgentConsumer {
    listeners: Vec<Listener>,
    dispatcher: Arc<TaskDispatcher>,
}

impl AgentConsumer {
    /// 为每个已知 topic 创建消费者并完成订阅
    pub fn new(config: &KafkaConfig, dispatcher: Arc<TaskDispatcher>) -> Result<Self, AgentError> {
        let mut listeners = Vec::with_capacity(ROUTES.len());
        for route in ROUTES {
            let consumer = KafkaConsumer::new(config)?;
            consumer.subscribe(&[route.topic])?;
            listeners.push(Listener {
                topic: route.topic,
                consumer,
            });
        }

        Ok(Self {
            listeners,
            dispatcher,
        })
    }

    /// 启动全部监听器，直到收到 shutdown 信号且所有监听器退出
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let mut tasks = JoinSet::new();

        for Listener { topic, consumer } in self.listeners {
            let dispatcher = self.dispatcher.clone();
            let shutdown = shutdown.clone();

            tasks.spawn(async move {
                info!(topic, "topic 监听器已启动");
                consumer
                    .start(shutdown, |msg| {
                        let dispatcher = &dispatcher;
                        async move { on_record(dispatcher, msg).await }
                    })
                    .await;
                info!(topic, "topic 监听器已停止");
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "topic 监听器异常退出");
            }
        }
    }
}

/// 处理单条消息并给出确认决定
///
/// 处理过程中的任何错误（包括 panic）都在这里被捕获，消息不被确认，监听器继续运行。
pub async fn on_record(dispatcher: &TaskDispatcher, msg: ConsumerMessage) -> AckDecision {
    metrics::record_received(&msg.topic);
    info!(
        topic = %msg.topic,
        partition = msg.partition,
        offset = msg.offset,
        key = msg.key_str(),
        "收到消息"
    );

    let outcome = AssertUnwindSafe(handle_record(dispatcher, &msg))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(AgentError::HandlerPanic(panic_message(panic.as_ref()))));

    match outcome {
        Ok(task) => {
            debug!(
                topic = %msg.topic,
                partition = msg.partition,
                offset = msg.offset,
                task_id = %task.id,
                "消息处理完成，确认"
            );
            metrics::record_ack(&msg.topic, true, "");
            AckDecision::ack()
        }
        Err(e) => {
            error!(
                topic = %msg.topic,
                partition = msg.partition,
                offset = msg.offset,
                key = msg.key_str(),
                error = %e,
                "消息处理失败，不确认"
            );
            metrics::record_ack(&msg.topic, false, e.reason());
            AckDecision::withhold()
        }
    }
}

async fn handle_record(dispatcher: &TaskDispatcher, msg: &ConsumerMessage) -> Result<Task, AgentError> {
    let message_type = message_type_for(&msg.topic)?;
    let value = msg.payload_str()?;
    dispatcher
        .handle(message_type, &msg.topic, msg.key_str(), value)
        .await
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
