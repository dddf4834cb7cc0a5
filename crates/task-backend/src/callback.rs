//! 动作状态回调
//!
//! 动作处理器在执行过程中通过回调上报状态。回调在构造处理器时注入且始终存在，
//! 不需要状态上报的场景使用 [`NoopStatusCallback`]。

use tracing::info;

/// 动作执行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Working,
    Completed,
    Failed,
}

impl std::fmt::Display for ActionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Working => "WORKING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// 状态上报接口
pub trait StatusCallback: Send + Sync {
    fn send_status(&self, message: &str, state: ActionState);
}

/// 丢弃所有状态
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStatusCallback;

impl StatusCallback for NoopStatusCallback {
    fn send_status(&self, _message: &str, _state: ActionState) {}
}

/// 把状态写入日志
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusCallback;

impl StatusCallback for TracingStatusCallback {
    fn send_status(&self, message: &str, state: ActionState) {
        info!(state = %state, message, "动作状态更新");
    }
}
