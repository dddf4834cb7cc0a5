//! Kafka 代理服务错误类型
//!
//! 在共享库 A2aError 基础上定义单条消息处理过程中的错误。
//! 除 `Timeout` 只记录日志外，其余错误都会使该消息不被确认。

use std::time::Duration;

use a2a_shared::error::A2aError;

/// 单条消息处理错误
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// 消息来自未配置路由的 topic
    #[error("未知的 topic: {topic}")]
    UnknownTopic { topic: String },

    /// 任务后端拒绝或不可达
    #[error("任务提交失败: {0}")]
    Submission(A2aError),

    /// 等待任务结果超时，不影响确认
    #[error("等待任务结果超时: {task_id} ({waited:?})")]
    Timeout { task_id: String, waited: Duration },

    /// 处理过程中发生 panic
    #[error("处理消息时发生 panic: {0}")]
    HandlerPanic(String),

    #[error(transparent)]
    Shared(#[from] A2aError),
}

impl AgentError {
    /// 未确认原因，用作指标标签
    pub fn reason(&self) -> &'static str {
        match self {
            Self::UnknownTopic { .. } => "unknown_topic",
            Self::Submission(_) => "submission",
            Self::Timeout { .. } => "timeout",
            Self::HandlerPanic(_) => "panic",
            Self::Shared(_) => "invalid_record",
        }
    }
}
