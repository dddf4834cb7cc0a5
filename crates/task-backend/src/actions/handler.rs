//! 动作处理器 Trait 定义
//!
//! 每个动作（处理订单、处理支付、处理告警）实现 [`ActionHandler`]，
//! 由 [`ActionRegistry`](super::ActionRegistry) 按名称统一管理。
//! 动作的能力描述（所属分组、说明）是普通的配置数据，注册时显式给出。

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use a2a_shared::error::{A2aError, Result};

/// 动作所属的能力分组
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentGroup {
    pub name: String,
    pub description: String,
}

impl AgentGroup {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// 动作的静态描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    /// 动作名称，注册表内唯一
    pub name: String,
    pub description: String,
    /// 由该动作处理的消息类型，例如 `order-processing`
    pub message_type: String,
    pub group: AgentGroup,
}

/// 一次动作调用的输入
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub topic: String,
    pub key: String,
    pub value: Value,
}

impl ActionRequest {
    /// 把消息体解码为动作的类型化参数
    pub fn args<T: DeserializeOwned>(&self, action: &str) -> Result<T> {
        serde_json::from_value(self.value.clone()).map_err(|e| A2aError::InvalidActionArgs {
            action: action.to_string(),
            message: e.to_string(),
        })
    }
}

/// 动作处理器
#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn spec(&self) -> &ActionSpec;

    /// 执行动作，返回结果文本
    async fn invoke(&self, request: &ActionRequest) -> Result<String>;
}

/// 参数字段转文本：字符串去掉引号，其余类型按 JSON 输出
pub(crate) fn field_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "unknown".to_string(),
        Some(other) => other.to_string(),
    }
}
