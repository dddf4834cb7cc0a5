//! 动作注册表
//!
//! 以动作名称为 key 存储处理器，同时维护消息类型到动作名称的索引，
//! 任务后端据此把任务描述路由到具体动作。

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use a2a_shared::error::{A2aError, Result};
use a2a_shared::task::TaskDescription;

use super::handler::{ActionHandler, ActionRequest, AgentGroup};
use super::handlers::{AlertAction, OrderAction, PaymentAction};
use crate::callback::StatusCallback;

/// 动作注册表
///
/// 构造完成后只读，可通过 Arc 在多个任务间共享。
#[derive(Default)]
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
    by_message_type: HashMap<String, String>,
}

impl ActionRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个处理器
    ///
    /// 同名动作或同一消息类型已存在时会被替换。
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) -> &mut Self {
        let spec = handler.spec();
        debug!(
            action = %spec.name,
            message_type = %spec.message_type,
            group = %spec.group.name,
            "注册动作处理器"
        );
        self.by_message_type
            .insert(spec.message_type.clone(), spec.name.clone());
        self.handlers.insert(spec.name.clone(), handler);
        self
    }

    /// 按名称获取处理器
    pub fn get(&self, action: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(action).cloned()
    }

    /// 按消息类型获取处理器
    pub fn for_message_type(&self, message_type: &str) -> Option<Arc<dyn ActionHandler>> {
        self.by_message_type
            .get(message_type)
            .and_then(|name| self.get(name))
    }

    /// 已注册动作的名称，按字母序
    pub fn action_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// 已注册动作涉及的能力分组（去重）
    pub fn groups(&self) -> Vec<AgentGroup> {
        let mut groups: Vec<AgentGroup> = Vec::new();
        for handler in self.handlers.values() {
            let group = &handler.spec().group;
            if !groups.contains(group) {
                groups.push(group.clone());
            }
        }
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        groups
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// 创建包含订单、支付、告警三个默认动作的注册表
    pub fn with_defaults(callback: Arc<dyn StatusCallback>) -> Self {
        let mut registry = Self::new();
        registry
            .register(Arc::new(OrderAction::new(callback.clone())))
            .register(Arc::new(PaymentAction::new(callback.clone())))
            .register(Arc::new(AlertAction::new(callback)));

        info!(
            action_count = registry.len(),
            group_count = registry.groups().len(),
            actions = ?registry.action_names(),
            "默认动作处理器初始化完成"
        );

        registry
    }

    /// 执行任务描述对应的动作
    ///
    /// 描述无法解析、消息类型没有对应动作、或消息体不是 JSON 时返回错误。
    pub async fn execute(&self, description: &str) -> Result<String> {
        let desc = TaskDescription::parse(description).ok_or_else(|| A2aError::TaskRejected {
            reason: format!("无法解析任务描述: {description}"),
        })?;

        let handler = self
            .for_message_type(&desc.message_type)
            .ok_or_else(|| A2aError::ActionNotFound(desc.message_type.clone()))?;

        let action = handler.spec().name.clone();
        let value = serde_json::from_str(&desc.value).map_err(|e| A2aError::InvalidActionArgs {
            action: action.clone(),
            message: format!("消息体不是合法 JSON: {e}"),
        })?;

        let request = ActionRequest {
            topic: desc.topic,
            key: desc.key,
            value,
        };

        debug!(action = %action, topic = %request.topic, key = %request.key, "执行动作");
        handler.invoke(&request).await
    }
}
