//! 内置动作处理器
//!
//! 订单、支付、告警三个动作只做参数提取和结果格式化。
//! 状态通过注入的 [`StatusCallback`] 上报：开始时 WORKING，
//! 参数解码失败时 FAILED，完成后 COMPLETED。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use a2a_shared::error::Result;

use super::handler::{ActionHandler, ActionRequest, ActionSpec, AgentGroup, field_text};
use crate::callback::{ActionState, StatusCallback};

pub const PROCESS_NEW_ORDER: &str = "process_new_order";
pub const PROCESS_PAYMENT: &str = "process_payment";
pub const PROCESS_ALERT: &str = "process_alert";

/// 上报 WORKING 并解码参数，解码失败时上报 FAILED
fn begin<T: DeserializeOwned>(
    callback: &dyn StatusCallback,
    spec: &ActionSpec,
    request: &ActionRequest,
) -> Result<T> {
    callback.send_status(
        &format!("Running {} for key {}", spec.name, request.key),
        ActionState::Working,
    );
    request.args(&spec.name).inspect_err(|e| {
        callback.send_status(&e.to_string(), ActionState::Failed);
    })
}

/// 消息体中缺少 id 时以消息 key 作为业务 ID
fn id_or_key(id: Option<&Value>, request: &ActionRequest) -> String {
    match id {
        Some(Value::Null) | None => request.key.clone(),
        Some(v) => field_text(Some(v)),
    }
}

// ---------------------------------------------------------------------------
// 订单
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OrderArgs {
    id: Option<Value>,
    status: Option<Value>,
    amount: Option<Value>,
}

pub struct OrderAction {
    spec: ActionSpec,
    callback: Arc<dyn StatusCallback>,
}

impl OrderAction {
    pub fn new(callback: Arc<dyn StatusCallback>) -> Self {
        Self {
            spec: ActionSpec {
                name: PROCESS_NEW_ORDER.to_string(),
                description: "Process a new order".to_string(),
                message_type: "order-processing".to_string(),
                group: AgentGroup::new("order support", "actions related to order support"),
            },
            callback,
        }
    }
}

#[async_trait]
impl ActionHandler for OrderAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn invoke(&self, request: &ActionRequest) -> Result<String> {
        let args: OrderArgs = begin(self.callback.as_ref(), &self.spec, request)?;
        let order_id = id_or_key(args.id.as_ref(), request);
        info!(order_id = %order_id, "处理新订单");

        let result = format!(
            "Processed your order Order ID: {}, Status: {}, Amount: {}",
            order_id,
            field_text(args.status.as_ref()),
            field_text(args.amount.as_ref()),
        );
        self.callback.send_status(&result, ActionState::Completed);
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// 支付
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PaymentArgs {
    id: Option<Value>,
    status: Option<Value>,
    amount: Option<Value>,
}

pub struct PaymentAction {
    spec: ActionSpec,
    callback: Arc<dyn StatusCallback>,
}

impl PaymentAction {
    pub fn new(callback: Arc<dyn StatusCallback>) -> Self {
        Self {
            spec: ActionSpec {
                name: PROCESS_PAYMENT.to_string(),
                description: "Process a payment".to_string(),
                message_type: "payment-processing".to_string(),
                group: AgentGroup::new("payment support", "actions related to payment processing"),
            },
            callback,
        }
    }
}

#[async_trait]
impl ActionHandler for PaymentAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn invoke(&self, request: &ActionRequest) -> Result<String> {
        let args: PaymentArgs = begin(self.callback.as_ref(), &self.spec, request)?;
        let payment_id = id_or_key(args.id.as_ref(), request);
        info!(payment_id = %payment_id, "处理支付");

        let result = format!(
            "Processed payment ID: {}, Status: {}, Amount: {}",
            payment_id,
            field_text(args.status.as_ref()),
            field_text(args.amount.as_ref()),
        );
        self.callback.send_status(&result, ActionState::Completed);
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// 告警
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AlertArgs {
    #[serde(rename = "type")]
    alert_type: Option<Value>,
    severity: Option<Value>,
}

pub struct AlertAction {
    spec: ActionSpec,
    callback: Arc<dyn StatusCallback>,
}

impl AlertAction {
    pub fn new(callback: Arc<dyn StatusCallback>) -> Self {
        Self {
            spec: ActionSpec {
                name: PROCESS_ALERT.to_string(),
                description: "Process system alert".to_string(),
                message_type: "system-alert".to_string(),
                group: AgentGroup::new("alert support", "actions related to system alerts"),
            },
            callback,
        }
    }
}

#[async_trait]
impl ActionHandler for AlertAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn invoke(&self, request: &ActionRequest) -> Result<String> {
        let args: AlertArgs = begin(self.callback.as_ref(), &self.spec, request)?;
        // 告警消息体里没有 id，告警 ID 即消息 key
        let alert_id = &request.key;
        info!(alert_id = %alert_id, "处理系统告警");

        let result = format!(
            "Processed alert ID: {}, Type: {}, Severity: {}",
            alert_id,
            field_text(args.alert_type.as_ref()),
            field_text(args.severity.as_ref()),
        );
        self.callback.send_status(&result, ActionState::Completed);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::testing::RecordingCallback;
    use serde_json::json;

    fn request(topic: &str, key: &str, value: Value) -> ActionRequest {
        ActionRequest {
            topic: topic.to_string(),
            key: key.to_string(),
            value,
        }
    }

    #[tokio::test]
    async fn test_order_action_formats_result_and_reports_status() {
        let callback = Arc::new(RecordingCallback::default());
        let action = OrderAction::new(callback.clone());

        let result = action
            .invoke(&request(
                "orders",
                "ORD-1",
                json!({"id": "ORD-1", "status": "created", "amount": 150.5}),
            ))
            .await
            .unwrap();

        assert_eq!(
            result,
            "Processed your order Order ID: ORD-1, Status: created, Amount: 150.5"
        );
        let statuses = callback.statuses.lock().unwrap();
        assert_eq!(
            *statuses,
            vec![
                (
                    "Running process_new_order for key ORD-1".to_string(),
                    ActionState::Working
                ),
                (result.clone(), ActionState::Completed),
            ]
        );
    }

    #[tokio::test]
    async fn test_order_amount_keeps_decimal_literal() {
        let action = OrderAction::new(Arc::new(crate::callback::NoopStatusCallback));
        let value: Value =
            serde_json::from_str(r#"{"id":"ORD-1","status":"created","amount":150.00}"#).unwrap();

        let result = action.invoke(&request("orders", "ORD-1", value)).await.unwrap();

        assert_eq!(
            result,
            "Processed your order Order ID: ORD-1, Status: created, Amount: 150.00"
        );
    }

    #[tokio::test]
    async fn test_payment_action_falls_back_to_key() {
        let action = PaymentAction::new(Arc::new(crate::callback::NoopStatusCallback));

        let result = action
            .invoke(&request(
                "payments",
                "PAY-1",
                json!({"status": "authorized", "amount": "150.00"}),
            ))
            .await
            .unwrap();

        assert_eq!(
            result,
            "Processed payment ID: PAY-1, Status: authorized, Amount: 150.00"
        );
    }

    #[tokio::test]
    async fn test_alert_action_uses_key_as_id() {
        let action = AlertAction::new(Arc::new(crate::callback::NoopStatusCallback));

        let result = action
            .invoke(&request(
                "alerts",
                "ALT-1",
                json!({"type": "CPU_USAGE", "severity": "HIGH", "value": 95.2}),
            ))
            .await
            .unwrap();

        assert_eq!(
            result,
            "Processed alert ID: ALT-1, Type: CPU_USAGE, Severity: HIGH"
        );
    }

    #[tokio::test]
    async fn test_action_rejects_non_object_payload() {
        let callback = Arc::new(RecordingCallback::default());
        let action = OrderAction::new(callback.clone());

        let err = action
            .invoke(&request("orders", "ORD-2", json!("plain text")))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "INVALID_ACTION_ARGS");
        let statuses = callback.statuses.lock().unwrap();
        let states: Vec<ActionState> = statuses.iter().map(|(_, state)| *state).collect();
        assert_eq!(states, vec![ActionState::Working, ActionState::Failed]);
        assert_eq!(statuses[1].0, err.to_string());
    }

    #[test]
    fn test_specs() {
        let cb: Arc<dyn StatusCallback> = Arc::new(crate::callback::NoopStatusCallback);
        assert_eq!(OrderAction::new(cb.clone()).spec().message_type, "order-processing");
        assert_eq!(PaymentAction::new(cb.clone()).spec().group.name, "payment support");
        assert_eq!(AlertAction::new(cb).spec().name, PROCESS_ALERT);
    }
}
