//! 进程内任务后端
//!
//! 接收 Kafka 消息转换出的任务描述，按消息类型执行注册的动作，
//! 并向等待结果的调用方提供任务终态。

pub mod actions;
pub mod callback;
pub mod client;

pub use actions::{ActionHandler, ActionRegistry, ActionRequest, ActionSpec, AgentGroup};
pub use callback::{ActionState, NoopStatusCallback, StatusCallback, TracingStatusCallback};
pub use client::LocalTaskClient;
