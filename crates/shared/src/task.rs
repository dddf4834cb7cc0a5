//! 任务模型与任务后端抽象
//!
//! 定义 Kafka 消息转换出的任务描述、任务后端返回的任务实体，
//! 以及 `TaskClient` trait 作为任务后端的统一接口。
//! 任务后端由进程内共享，实现必须可以被多个消费者并发调用。

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

// ---------------------------------------------------------------------------
// TaskStatus: 任务状态
// ---------------------------------------------------------------------------

/// 任务状态
///
/// PENDING -> IN_PROGRESS -> COMPLETED | FAILED，终态不再变化。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Task: 任务实体
// ---------------------------------------------------------------------------

/// 任务后端持有的任务实体
///
/// 分发器只保留 `id` 用于轮询结果，其余字段是后端返回时的快照。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: TaskStatus::Pending,
            result: None,
            description: description.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// ---------------------------------------------------------------------------
// TaskDescription: 任务描述
// ---------------------------------------------------------------------------

const DESCRIPTION_PREFIX: &str = "kafka-message:";
const VALUE_SEPARATOR: &str = " value:";

/// 由一条 Kafka 消息派生的任务描述
///
/// 文本格式固定为 `kafka-message:{message_type} topic:{topic} key:{key} value:{value}`，
/// 任务后端据此选择要执行的动作。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescription {
    pub message_type: String,
    pub topic: String,
    pub key: String,
    pub value: String,
}

impl TaskDescription {
    pub fn new(
        message_type: impl Into<String>,
        topic: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            message_type: message_type.into(),
            topic: topic.into(),
            key: key.into(),
            value: value.into(),
        }
    }

    /// 从文本格式解析
    ///
    /// value 是最后一个字段，可以包含空格和任意 JSON。
    /// key 来自消息本身，也可能包含 ` value:`，因此按出现顺序选取
    /// 第一个使 value 成为合法 JSON 的切分点；都不合法时退回第一个切分点。
    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.strip_prefix(DESCRIPTION_PREFIX)?;
        let (message_type, rest) = rest.split_once(" topic:")?;
        let (topic, rest) = rest.split_once(" key:")?;

        let mut splits = rest
            .match_indices(VALUE_SEPARATOR)
            .map(|(at, sep)| (&rest[..at], &rest[at + sep.len()..]));
        let first = splits.next()?;
        let (key, value) = std::iter::once(first)
            .chain(splits)
            .find(|(_, value)| serde_json::from_str::<serde::de::IgnoredAny>(value).is_ok())
            .unwrap_or(first);

        Some(Self::new(message_type, topic, key, value))
    }
}

impl std::fmt::Display for TaskDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{DESCRIPTION_PREFIX}{} topic:{} key:{} value:{}",
            self.message_type, self.topic, self.key, self.value
        )
    }
}

// ---------------------------------------------------------------------------
// TaskClient: 任务后端接口
// ---------------------------------------------------------------------------

/// 任务后端的抽象接口
///
/// 提取 trait 使得分发器可以通过 `Arc<dyn TaskClient>` 注入依赖，
/// 测试时无需启动真实后端。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskClient: Send + Sync {
    /// 创建任务
    ///
    /// 后端不可达或拒绝创建时返回 `BackendUnavailable` / `TaskRejected`。
    async fn send_task(&self, description: &str) -> Result<Task>;

    /// 在 `timeout` 内等待任务进入终态
    ///
    /// 超时返回 `TaskTimeout`，未知任务返回 `TaskNotFound`。
    async fn get_task(&self, task_id: &str, timeout: Duration) -> Result<Task>;
}
