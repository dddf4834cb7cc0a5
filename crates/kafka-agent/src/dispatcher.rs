//! 任务分发器
//!
//! 把一条 Kafka 消息格式化为任务描述，提交给任务后端，
//! 并按配置在超时范围内等待任务结果。
//!
//! 只有提交失败会返回错误；等待超时或查询失败只记录日志，返回提交时拿到的任务。

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use a2a_shared::config::DispatcherConfig;
use a2a_shared::error::A2aError;
use a2a_shared::observability::metrics;
use a2a_shared::task::{Task, TaskClient, TaskDescription};

use crate::error::AgentError;

/// 任务分发器
///
/// 除共享的任务后端句柄外不保存任何跨消息状态。
pub struct TaskDispatcher {
    client: Arc<dyn TaskClient>,
    config: DispatcherConfig,
}

impl TaskDispatcher {
    pub fn new(client: Arc<dyn TaskClient>, config: DispatcherConfig) -> Self {
        Self { client, config }
    }

    /// 分发一条消息
    pub async fn handle(
        &self,
        message_type: &str,
        topic: &str,
        key: &str,
        value: &str,
    ) -> Result<Task, AgentError> {
        let start = Instant::now();
        let description = TaskDescription::new(message_type, topic, key, value).to_string();

        let submitted = match self.client.send_task(&description).await {
            Ok(task) => task,
            Err(e) => {
                error!(
                    message_type,
                    topic,
                    key,
                    error = %e,
                    retryable = e.is_retryable(),
                    "任务提交失败，消息将不被确认"
                );
                metrics::record_dispatch(message_type, false, start.elapsed().as_secs_f64());
                return Err(AgentError::Submission(e));
            }
        };

        info!(
            task_id = %submitted.id,
            message_type,
            topic,
            key,
            "任务已创建"
        );

        let task = if self.config.wait_for_result {
            self.await_result(message_type, submitted).await
        } else {
            submitted
        };

        metrics::record_dispatch(message_type, true, start.elapsed().as_secs_f64());
        Ok(task)
    }

    async fn await_result(&self, message_type: &str, submitted: Task) -> Task {
        match self
            .client
            .get_task(&submitted.id, self.config.poll_timeout())
            .await
        {
            Ok(task) => {
                info!(
                    task_id = %task.id,
                    status = %task.status,
                    result = task.result.as_deref().unwrap_or_default(),
                    "任务结果"
                );
                task
            }
            Err(A2aError::TaskTimeout { task_id, waited }) => {
                let err = AgentError::Timeout { task_id, waited };
                warn!(message_type, error = %err, "任务结果未在超时内就绪，继续确认消息");
                metrics::record_poll_timeout(message_type);
                submitted
            }
            Err(e) => {
                warn!(task_id = %submitted.id, error = %e, "查询任务结果失败，继续确认消息");
                submitted
            }
        }
    }
}
