//! Topic 到消息类型的固定映射
//!
//! 消费者只订阅这里列出的 topic，消息类型决定任务后端执行哪个动作。

use a2a_shared::kafka::topics;

use crate::error::AgentError;

/// 一条 topic 路由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicRoute {
    pub topic: &'static str,
    pub message_type: &'static str,
}

pub const ROUTES: [TopicRoute; 3] = [
    TopicRoute {
        topic: topics::ORDERS,
        message_type: "order-processing",
    },
    TopicRoute {
        topic: topics::PAYMENTS,
        message_type: "payment-processing",
    },
    TopicRoute {
        topic: topics::ALERTS,
        message_type: "system-alert",
    },
];

/// 查找 topic 对应的消息类型
pub fn message_type_for(topic: &str) -> Result<&'static str, AgentError> {
    ROUTES
        .iter()
        .find(|route| route.topic == topic)
        .map(|route| route.message_type)
        .ok_or_else(|| AgentError::UnknownTopic {
            topic: topic.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_mapping() {
        assert_eq!(message_type_for("orders").unwrap(), "order-processing");
        assert_eq!(message_type_for("payments").unwrap(), "payment-processing");
        assert_eq!(message_type_for("alerts").unwrap(), "system-alert");
    }

    #[test]
    fn test_unknown_topic() {
        let err = message_type_for("inventory").unwrap_err();
        assert!(matches!(err, AgentError::UnknownTopic { topic } if topic == "inventory"));

        // 大小写敏感
        assert!(message_type_for("Orders").is_err());
    }

    #[test]
    fn test_every_known_topic_has_route() {
        for topic in topics::ALL {
            assert!(message_type_for(topic).is_ok(), "missing route for {topic}");
        }
    }
}
