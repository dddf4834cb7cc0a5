//! 共享库
//!
//! 包含 Kafka 接入服务与任务后端共用的配置、错误处理、Kafka 封装、
//! 任务模型和可观测性等基础设施代码。

pub mod config;
pub mod error;
pub mod kafka;
pub mod observability;
pub mod task;
