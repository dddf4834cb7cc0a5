//! 本地任务后端集成测试
//!
//! 通过 `TaskClient` trait 对象使用后端，覆盖：
//! - 三类默认消息的完整处理流程
//! - 状态回调上报
//! - 并发提交与关闭时的排空

use std::sync::{Arc, Mutex};
use std::time::Duration;

use a2a_shared::config::TaskBackendConfig;
use a2a_shared::task::{TaskClient, TaskDescription, TaskStatus};
use a2a_task_backend::{ActionRegistry, ActionState, LocalTaskClient, StatusCallback};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct CollectingCallback {
    statuses: Mutex<Vec<(String, ActionState)>>,
}

impl CollectingCallback {
    fn messages_in(&self, state: ActionState) -> Vec<String> {
        self.statuses
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| *s == state)
            .map(|(message, _)| message.clone())
            .collect()
    }
}

impl StatusCallback for CollectingCallback {
    fn send_status(&self, message: &str, state: ActionState) {
        self.statuses
            .lock()
            .unwrap()
            .push((message.to_string(), state));
    }
}

fn backend(callback: Arc<dyn StatusCallback>) -> LocalTaskClient {
    LocalTaskClient::start(
        &TaskBackendConfig::default(),
        ActionRegistry::with_defaults(callback),
    )
}

fn description(message_type: &str, topic: &str, key: &str, value: &str) -> String {
    TaskDescription::new(message_type, topic, key, value).to_string()
}

// ============================================================================
// 默认动作
// ============================================================================

#[tokio::test]
async fn test_default_actions_through_trait_object() {
    let callback = Arc::new(CollectingCallback::default());
    let client: Arc<dyn TaskClient> = Arc::new(backend(callback.clone()));

    let cases = [
        (
            description(
                "order-processing",
                "orders",
                "ORD-1",
                r#"{"id":"ORD-1","status":"created","amount":"150.00"}"#,
            ),
            "Processed your order Order ID: ORD-1, Status: created, Amount: 150.00",
        ),
        (
            description(
                "payment-processing",
                "payments",
                "PAY-1",
                r#"{"id":"PAY-1","status":"authorized","amount":"150.00"}"#,
            ),
            "Processed payment ID: PAY-1, Status: authorized, Amount: 150.00",
        ),
        (
            description(
                "system-alert",
                "alerts",
                "ALT-1",
                r#"{"type":"CPU_USAGE","severity":"HIGH","value":95.2}"#,
            ),
            "Processed alert ID: ALT-1, Type: CPU_USAGE, Severity: HIGH",
        ),
    ];

    for (desc, expected) in &cases {
        let task = client.send_task(desc).await.unwrap();
        let done = client.get_task(&task.id, WAIT).await.unwrap();

        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.result.as_deref(), Some(*expected));
        assert_eq!(&done.description, desc);
    }

    let expected: Vec<String> = cases.iter().map(|(_, e)| e.to_string()).collect();
    assert_eq!(callback.messages_in(ActionState::Completed), expected);
    assert_eq!(callback.messages_in(ActionState::Working).len(), 3);
    assert!(callback.messages_in(ActionState::Failed).is_empty());
}

#[tokio::test]
async fn test_invalid_payload_fails_task_and_reports_failure() {
    let callback = Arc::new(CollectingCallback::default());
    let client = backend(callback.clone());

    let task = client
        .send_task(&description("order-processing", "orders", "ORD-9", r#""plain text""#))
        .await
        .unwrap();
    let done = client.get_task(&task.id, WAIT).await.unwrap();

    assert_eq!(done.status, TaskStatus::Failed);
    assert!(callback.messages_in(ActionState::Completed).is_empty());
    assert_eq!(callback.messages_in(ActionState::Failed).len(), 1);
}

#[tokio::test]
async fn test_non_json_payload_fails_before_action_runs() {
    let callback = Arc::new(CollectingCallback::default());
    let client = backend(callback.clone());

    let task = client
        .send_task(&description("order-processing", "orders", "ORD-9", "not json"))
        .await
        .unwrap();
    let done = client.get_task(&task.id, WAIT).await.unwrap();

    assert_eq!(done.status, TaskStatus::Failed);
    assert!(callback.statuses.lock().unwrap().is_empty());
}

// ============================================================================
// 并发与关闭
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_get_distinct_ids() {
    let client = LocalTaskClient::start(
        &TaskBackendConfig {
            max_concurrent_tasks: 2,
            ..Default::default()
        },
        ActionRegistry::with_defaults(Arc::new(a2a_task_backend::NoopStatusCallback)),
    );

    let mut handles = Vec::new();
    for i in 0..20 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let desc = description("system-alert", "alerts", &format!("ALT-{i}"), "{}");
            let task = client.send_task(&desc).await.unwrap();
            client.get_task(&task.id, WAIT).await.unwrap()
        }));
    }

    let mut ids = std::collections::HashSet::new();
    for handle in handles {
        let task = handle.await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        ids.insert(task.id);
    }
    assert_eq!(ids.len(), 20);
    assert_eq!(client.task_count(), 20);
}

#[tokio::test]
async fn test_shutdown_drains_submitted_tasks() {
    let client = backend(Arc::new(a2a_task_backend::NoopStatusCallback));

    let mut ids = Vec::new();
    for i in 0..5 {
        let desc = description("system-alert", "alerts", &format!("ALT-{i}"), "{}");
        ids.push(client.send_task(&desc).await.unwrap().id);
    }

    client.shutdown().await;

    for id in &ids {
        let task = client.snapshot(id).unwrap();
        assert!(task.is_terminal(), "task {id} not finished: {}", task.status);
    }
}
