//! 动作注册与执行
//!
//! 任务后端处理任务时，按任务描述中的消息类型在注册表中找到动作并执行。

pub mod handler;
pub mod handlers;
pub mod registry;

pub use handler::{ActionHandler, ActionRequest, ActionSpec, AgentGroup};
pub use handlers::{AlertAction, OrderAction, PaymentAction};
pub use registry::ActionRegistry;
