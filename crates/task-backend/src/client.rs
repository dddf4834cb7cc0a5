//! 进程内任务后端
//!
//! `LocalTaskClient` 实现 [`TaskClient`]：创建任务后立即返回，
//! 在后台按任务描述执行注册表中的动作，并通过每个任务独立的 `watch` channel
//! 通知等待结果的调用方。
//!
//! 生命周期与进程一致：启动时构造一次，以 `Arc<dyn TaskClient>` 共享给所有消费者，
//! 退出前调用 [`LocalTaskClient::shutdown`] 等待执行中的任务结束。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use futures::FutureExt;
use tokio::sync::{Semaphore, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use a2a_shared::config::TaskBackendConfig;
use a2a_shared::error::{A2aError, Result};
use a2a_shared::observability::metrics;
use a2a_shared::task::{Task, TaskClient, TaskStatus};

use crate::actions::ActionRegistry;

/// 清理已结束任务的间隔
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

struct Inner {
    tasks: DashMap<String, Arc<watch::Sender<Task>>>,
    registry: ActionRegistry,
    permits: Arc<Semaphore>,
    /// 已提交但尚未到达终态的任务数
    in_flight: watch::Sender<usize>,
    accepting: AtomicBool,
    retention: Duration,
}

/// 进程内任务后端
///
/// 内部状态由 Arc 共享，clone 是廉价操作。
#[derive(Clone)]
pub struct LocalTaskClient {
    inner: Arc<Inner>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl LocalTaskClient {
    /// 创建任务后端并启动已结束任务的清理协程
    ///
    /// 必须在 tokio 运行时内调用。
    pub fn start(config: &TaskBackendConfig, registry: ActionRegistry) -> Self {
        let max_permits = config.max_concurrent_tasks.max(1);
        let inner = Arc::new(Inner {
            tasks: DashMap::new(),
            registry,
            permits: Arc::new(Semaphore::new(max_permits as usize)),
            in_flight: watch::Sender::new(0),
            accepting: AtomicBool::new(true),
            retention: config.task_retention(),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(sweep_loop(inner.clone(), shutdown_rx));

        info!(
            max_concurrent_tasks = max_permits,
            retention_secs = config.task_retention_secs,
            "本地任务后端已启动"
        );

        Self {
            inner,
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    /// 当前内存中的任务数量
    pub fn task_count(&self) -> usize {
        self.inner.tasks.len()
    }

    /// 读取任务当前快照，不等待
    pub fn snapshot(&self, task_id: &str) -> Option<Task> {
        self.inner.tasks.get(task_id).map(|tx| tx.borrow().clone())
    }

    /// 清理结束时间早于保留期的任务，返回清理数量
    pub fn evict_finished(&self) -> usize {
        self.inner.evict_finished()
    }

    /// 停止接收新任务，并等待执行中的任务结束
    pub async fn shutdown(&self) {
        if !self.inner.accepting.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("本地任务后端开始关闭，等待执行中的任务");

        let mut in_flight = self.inner.in_flight.subscribe();
        if in_flight.wait_for(|n| *n == 0).await.is_err() {
            warn!("任务计数通道已关闭");
        }
        self.inner.permits.close();
        let _ = self.shutdown_tx.send(true);

        info!(remaining = self.task_count(), "本地任务后端已关闭");
    }
}

impl Inner {
    fn update(&self, task_id: &str, status: TaskStatus, result: Option<String>) {
        if let Some(tx) = self.tasks.get(task_id) {
            tx.send_modify(|task| {
                task.status = status;
                task.result = result;
                task.updated_at = Utc::now();
            });
        }
    }

    /// 后台执行一个任务直到终态
    async fn process(self: Arc<Self>, task_id: String) {
        self.run(&task_id).await;
        self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }

    async fn run(&self, task_id: &str) {
        let Some(description) = self
            .tasks
            .get(task_id)
            .map(|tx| tx.borrow().description.clone())
        else {
            return;
        };

        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!(task_id = %task_id, "任务后端已关闭，任务未执行");
                self.update(task_id, TaskStatus::Failed, Some("任务后端已关闭".to_string()));
                metrics::record_task_finished(&TaskStatus::Failed.to_string());
                return;
            }
        };

        self.update(task_id, TaskStatus::InProgress, None);
        debug!(task_id = %task_id, "任务开始执行");

        let outcome = AssertUnwindSafe(self.registry.execute(&description))
            .catch_unwind()
            .await;

        let (status, result) = match outcome {
            Ok(Ok(result)) => (TaskStatus::Completed, result),
            Ok(Err(e)) => {
                warn!(task_id = %task_id, error = %e, "任务执行失败");
                (TaskStatus::Failed, e.to_string())
            }
            Err(_) => {
                error!(task_id = %task_id, "动作处理器 panic");
                (TaskStatus::Failed, "动作处理器 panic".to_string())
            }
        };

        info!(task_id = %task_id, status = %status, "任务执行结束");
        metrics::record_task_finished(&status.to_string());
        self.update(task_id, status, Some(result));
    }

    fn evict_finished(&self) -> usize {
        let retention = chrono::Duration::from_std(self.retention)
            .unwrap_or_else(|_| chrono::Duration::weeks(52));
        let cutoff = Utc::now() - retention;
        let before = self.tasks.len();

        self.tasks.retain(|_, tx| {
            let task = tx.borrow();
            !(task.is_terminal() && task.updated_at < cutoff)
        });

        let evicted = before.saturating_sub(self.tasks.len());
        if evicted > 0 {
            debug!(evicted, "已清理过期任务");
        }
        evicted
    }
}

async fn sweep_loop(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                inner.evict_finished();
            }
        }
    }
}

#[async_trait]
impl TaskClient for LocalTaskClient {
    async fn send_task(&self, description: &str) -> Result<Task> {
        if description.trim().is_empty() {
            return Err(A2aError::TaskRejected {
                reason: "任务描述为空".to_string(),
            });
        }

        // 先计入执行中再检查关闭标志：shutdown 要么等到这个任务结束，
        // 要么这里看到关闭标志并撤回计数
        self.inner.in_flight.send_modify(|n| *n += 1);
        if !self.inner.accepting.load(Ordering::SeqCst) {
            self.inner
                .in_flight
                .send_modify(|n| *n = n.saturating_sub(1));
            return Err(A2aError::BackendUnavailable("任务后端已关闭".to_string()));
        }

        let task = Task::new(Uuid::new_v4().to_string(), description);
        let (tx, _rx) = watch::channel(task.clone());
        self.inner.tasks.insert(task.id.clone(), Arc::new(tx));

        tokio::spawn(self.inner.clone().process(task.id.clone()));

        debug!(task_id = %task.id, "任务已创建");
        Ok(task)
    }

    async fn get_task(&self, task_id: &str, timeout: Duration) -> Result<Task> {
        let mut rx = self
            .inner
            .tasks
            .get(task_id)
            .map(|tx| tx.subscribe())
            .ok_or_else(|| A2aError::TaskNotFound {
                task_id: task_id.to_string(),
            })?;

        match tokio::time::timeout(timeout, rx.wait_for(Task::is_terminal)).await {
            Ok(Ok(task)) => Ok((*task).clone()),
            Ok(Err(_)) => Err(A2aError::TaskNotFound {
                task_id: task_id.to_string(),
            }),
            Err(_) => Err(A2aError::TaskTimeout {
                task_id: task_id.to_string(),
                waited: timeout,
            }),
        }
    }
}
