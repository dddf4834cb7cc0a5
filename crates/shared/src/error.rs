//! 统一错误处理模块
//!
//! 定义 Kafka 接入层与任务后端共享的错误类型，使用 thiserror 提供良好的错误信息。

use std::time::Duration;

use thiserror::Error;

/// 系统错误类型
#[derive(Debug, Error)]
pub enum A2aError {
    // ==================== Kafka 错误 ====================
    #[error("Kafka 错误: {0}")]
    Kafka(String),

    // ==================== 配置错误 ====================
    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),

    // ==================== 任务后端错误 ====================
    #[error("任务后端不可用: {0}")]
    BackendUnavailable(String),

    #[error("任务被拒绝: {reason}")]
    TaskRejected { reason: String },

    #[error("任务未找到: task_id={task_id}")]
    TaskNotFound { task_id: String },

    #[error("等待任务结果超时: task_id={task_id}, 已等待 {waited:?}")]
    TaskTimeout { task_id: String, waited: Duration },

    // ==================== 动作执行错误 ====================
    #[error("未注册的动作: {0}")]
    ActionNotFound(String),

    #[error("动作参数无效: {action} - {message}")]
    InvalidActionArgs { action: String, message: String },
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, A2aError>;

impl A2aError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Kafka(_) => "KAFKA_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            Self::TaskRejected { .. } => "TASK_REJECTED",
            Self::TaskNotFound { .. } => "TASK_NOT_FOUND",
            Self::TaskTimeout { .. } => "TASK_TIMEOUT",
            Self::ActionNotFound(_) => "ACTION_NOT_FOUND",
            Self::InvalidActionArgs { .. } => "INVALID_ACTION_ARGS",
        }
    }

    /// 是否为可重试错误
    ///
    /// 可重试意味着消息不确认、等待 broker 重新投递后再次处理可能成功。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Kafka(_) | Self::BackendUnavailable(_) | Self::TaskTimeout { .. }
        )
    }
}
