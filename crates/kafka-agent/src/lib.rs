//! Kafka -> A2A 任务代理
//!
//! 消费 orders / payments / alerts 三个 topic，把每条消息转换为任务提交给任务后端，
//! 任务提交成功后才确认消息。

pub mod consumer;
pub mod dispatcher;
pub mod error;
pub mod routes;

pub use consumer::{AgentConsumer, on_record};
pub use dispatcher::TaskDispatcher;
pub use error::AgentError;
