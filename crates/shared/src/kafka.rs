//! Kafka 基础设施封装
//!
//! 将 rdkafka 的底层 API 封装为业务友好的 Producer/Consumer 抽象，
//! 统一消息转换、错误映射、手动提交和优雅关闭语义。
//!
//! 消费者关闭了自动提交：只有处理函数返回 [`AckDecision::ack`] 的消息才会提交偏移量，
//! 且同一分区内按偏移量顺序提交，未确认的消息在重平衡或重启后会被重新投递。

use std::collections::HashMap;
use std::time::Duration;

use rdkafka::client::ClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{
    BaseConsumer, CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer,
};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{Offset, TopicPartitionList};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::KafkaConfig;
use crate::error::A2aError;
use crate::observability::metrics;

// ---------------------------------------------------------------------------
// Topic 常量
// ---------------------------------------------------------------------------

/// 集中管理所有 Kafka topic 名称，防止字符串散落在各处导致拼写不一致
pub mod topics {
    pub const ORDERS: &str = "orders";
    pub const PAYMENTS: &str = "payments";
    pub const ALERTS: &str = "alerts";

    pub const ALL: [&str; 3] = [ORDERS, PAYMENTS, ALERTS];
}

// ---------------------------------------------------------------------------
// ConsumerMessage
// ---------------------------------------------------------------------------

/// 消费到的 Kafka 消息的统一表示
///
/// 将 rdkafka 的 `BorrowedMessage`（带生命周期约束）转换为拥有所有权的结构体，
/// 使消息可以安全地跨 await 点传递给异步处理函数。
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub timestamp: Option<i64>,
    pub headers: HashMap<String, String>,
}

impl ConsumerMessage {
    /// 从 rdkafka 的借用消息构造，提取并拥有所有字段
    fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        let key = msg
            .key()
            .and_then(|k| std::str::from_utf8(k).ok())
            .map(String::from);

        let payload = msg.payload().map(|p| p.to_vec()).unwrap_or_default();

        let timestamp = msg.timestamp().to_millis();

        let mut headers = HashMap::new();
        if let Some(h) = msg.headers() {
            for idx in 0..h.count() {
                let header = h.get(idx);
                if let Some(raw) = header.value
                    && let Ok(value) = std::str::from_utf8(raw)
                {
                    headers.insert(header.key.to_string(), value.to_string());
                }
            }
        }

        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key,
            payload,
            timestamp,
            headers,
        }
    }

    /// 消息 key，缺失时为空字符串
    pub fn key_str(&self) -> &str {
        self.key.as_deref().unwrap_or_default()
    }

    /// 将负载视为 UTF-8 字符串返回
    pub fn payload_str(&self) -> Result<&str, A2aError> {
        std::str::from_utf8(&self.payload)
            .map_err(|e| A2aError::Kafka(format!("负载非 UTF-8 编码: {e}")))
    }
}

// ---------------------------------------------------------------------------
// AckDecision
// ---------------------------------------------------------------------------

/// 单条消息处理后的确认决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckDecision {
    pub success: bool,
}

impl AckDecision {
    pub fn ack() -> Self {
        Self { success: true }
    }

    pub fn withhold() -> Self {
        Self { success: false }
    }
}

// ---------------------------------------------------------------------------
// AckTracker: 分区内有序确认
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartitionState {
    /// 下一个待提交的位置
    Open { next: i64 },
    /// 该偏移量未确认，之后的确认都不能越过它提交
    Blocked { at: i64 },
}

/// 需要提交到 broker 的位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitPosition {
    pub topic: String,
    pub partition: i32,
    /// 下一条要读取的偏移量，即已确认消息的 offset + 1
    pub next_offset: i64,
}

/// 按分区跟踪确认状态，计算可以安全提交的偏移量
///
/// Kafka 提交的是"下一条要读的位置"，提交 N+1 等于确认了 N 及之前的全部消息。
/// 因此某条消息未确认后，同分区后续消息即使处理成功也不能提交，
/// 否则失败的消息就不会再被投递。
///
/// 被阻塞的分区会一直停止提交，直到该消息被重新投递（重启、重平衡回退）
/// 或分区被撤销/重新分配后由 [`AckTracker::forget`] 清除状态。
#[derive(Debug, Default)]
pub struct AckTracker {
    partitions: HashMap<(String, i32), PartitionState>,
}

impl AckTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 收到消息时调用，识别重平衡或重启之后的重新投递
    pub fn observe(&mut self, topic: &str, partition: i32, offset: i64) {
        let key = (topic.to_string(), partition);
        let redelivered = match self.partitions.get(&key) {
            None => false,
            Some(PartitionState::Open { next }) => offset < *next,
            Some(PartitionState::Blocked { at }) => offset <= *at,
        };

        if redelivered {
            debug!(topic, partition, offset, "检测到分区回退，重置确认状态");
            self.partitions.insert(key, PartitionState::Open { next: offset });
        }
    }

    /// 确认一条消息，返回需要提交的偏移量（None 表示分区被阻塞，不提交）
    pub fn ack(&mut self, topic: &str, partition: i32, offset: i64) -> Option<i64> {
        let state = self
            .partitions
            .entry((topic.to_string(), partition))
            .or_insert(PartitionState::Open { next: offset });

        match *state {
            PartitionState::Open { .. } => {
                *state = PartitionState::Open { next: offset + 1 };
                Some(offset + 1)
            }
            PartitionState::Blocked { at } => {
                warn!(
                    topic,
                    partition,
                    offset,
                    blocked_at = at,
                    "分区存在未确认消息，跳过提交"
                );
                None
            }
        }
    }

    /// 拒绝确认一条消息，阻塞该分区后续的提交
    pub fn nack(&mut self, topic: &str, partition: i32, offset: i64) {
        let state = self
            .partitions
            .entry((topic.to_string(), partition))
            .or_insert(PartitionState::Open { next: offset });

        if let PartitionState::Open { .. } = *state {
            warn!(topic, partition, offset, "消息未确认，分区暂停提交直到重新投递");
            *state = PartitionState::Blocked { at: offset };
        }
    }

    /// 根据处理结果更新分区状态，返回需要提交的位置
    pub fn settle(
        &mut self,
        topic: &str,
        partition: i32,
        offset: i64,
        decision: AckDecision,
    ) -> Option<CommitPosition> {
        if decision.success {
            self.ack(topic, partition, offset)
                .map(|next_offset| CommitPosition {
                    topic: topic.to_string(),
                    partition,
                    next_offset,
                })
        } else {
            self.nack(topic, partition, offset);
            None
        }
    }

    /// 清除分区状态，分区被撤销或重新分配时调用
    ///
    /// 分区可能已由组内其他消费者越过未确认消息提交，旧的阻塞状态不再有效。
    pub fn forget(&mut self, topic: &str, partition: i32) {
        if self
            .partitions
            .remove(&(topic.to_string(), partition))
            .is_some()
        {
            debug!(topic, partition, "分区确认状态已清除");
        }
    }

    /// 分区当前是否被未确认消息阻塞
    pub fn is_blocked(&self, topic: &str, partition: i32) -> bool {
        matches!(
            self.partitions.get(&(topic.to_string(), partition)),
            Some(PartitionState::Blocked { .. })
        )
    }
}

// ---------------------------------------------------------------------------
// KafkaProducer
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 生产者
///
/// 封装 `FutureProducer`，内部已派生 Clone（`FutureProducer` 本身是 Arc 包装的）。
#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
}

impl KafkaProducer {
    /// 根据配置创建生产者
    ///
    /// 设置 `message.timeout.ms` 为 5 秒，超过则由调用方决定是否重试。
    pub fn new(config: &KafkaConfig) -> Result<Self, A2aError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| A2aError::Kafka(format!("创建生产者失败: {e}")))?;

        info!(brokers = %config.brokers, "Kafka 生产者已初始化");
        Ok(Self { producer })
    }

    /// 发布一条文本消息
    pub async fn publish(
        &self,
        topic: &str,
        key: &str,
        value: &str,
    ) -> Result<(i32, i64), A2aError> {
        let record = FutureRecord::to(topic).key(key).payload(value);

        // rdkafka 0.39+ 返回 Delivery 结构体而非元组
        let delivery = self
            .producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| A2aError::Kafka(format!("发送消息失败: {e}")))?;

        debug!(
            topic,
            key,
            partition = delivery.partition,
            offset = delivery.offset,
            "消息已发送"
        );
        Ok((delivery.partition, delivery.offset))
    }
}

// ---------------------------------------------------------------------------
// KafkaConsumer
// ---------------------------------------------------------------------------

/// 重平衡回调
///
/// 回调运行在 rdkafka 的轮询线程上，只把撤销或新分配的分区转发给消费循环，
/// 由消费循环清除对应的确认状态。
struct RebalanceContext {
    changes: mpsc::UnboundedSender<(String, i32)>,
}

impl RebalanceContext {
    fn notify(&self, tpl: &TopicPartitionList, kind: &str) {
        for elem in tpl.elements() {
            info!(topic = elem.topic(), partition = elem.partition(), kind, "分区重平衡");
            // 接收端只在消费循环退出后关闭
            let _ = self.changes.send((elem.topic().to_string(), elem.partition()));
        }
    }
}

impl ClientContext for RebalanceContext {}

impl ConsumerContext for RebalanceContext {
    fn pre_rebalance(&self, _consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        if let Rebalance::Revoke(tpl) = rebalance {
            self.notify(tpl, "revoke");
        }
    }

    fn post_rebalance(&self, _consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Assign(tpl) => self.notify(tpl, "assign"),
            Rebalance::Error(e) => warn!(error = %e, "分区重平衡出错"),
            Rebalance::Revoke(_) => {}
        }
    }
}

/// 面向业务的 Kafka 消费者
///
/// 封装 `StreamConsumer`，提供手动提交和基于 `watch` channel 的优雅关闭语义。
pub struct KafkaConsumer {
    consumer: StreamConsumer<RebalanceContext>,
    partition_changes: mpsc::UnboundedReceiver<(String, i32)>,
}

impl KafkaConsumer {
    /// 创建消费者，加入配置中的消费组
    pub fn new(config: &KafkaConfig) -> Result<Self, A2aError> {
        let (tx, partition_changes) = mpsc::unbounded_channel();
        let consumer: StreamConsumer<RebalanceContext> = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.consumer_group)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .set("enable.auto.commit", "false")
            .create_with_context(RebalanceContext { changes: tx })
            .map_err(|e| A2aError::Kafka(format!("创建消费者失败: {e}")))?;

        info!(
            brokers = %config.brokers,
            group_id = %config.consumer_group,
            "Kafka 消费者已初始化"
        );
        Ok(Self {
            consumer,
            partition_changes,
        })
    }

    /// 订阅指定的 topic 列表
    pub fn subscribe(&self, topics: &[&str]) -> Result<(), A2aError> {
        self.consumer
            .subscribe(topics)
            .map_err(|e| A2aError::Kafka(format!("订阅 topic 失败: {e}")))?;

        info!(?topics, "已订阅 Kafka topics");
        Ok(())
    }

    /// 启动消费循环
    ///
    /// 使用 `tokio::select!` 同时监听消息流和关闭信号：
    /// - 收到消息时调用 handler 处理，处理完成后才拉取下一条；
    ///   handler 的返回值决定是否提交该消息的偏移量。
    /// - 关闭信号变为 `true` 时退出循环，正在执行的 handler 会先自然完成。
    pub async fn start<F, Fut>(self, mut shutdown: watch::Receiver<bool>, handler: F)
    where
        F: Fn(ConsumerMessage) -> Fut,
        Fut: std::future::Future<Output = AckDecision>,
    {
        use futures::StreamExt;

        let Self {
            consumer,
            mut partition_changes,
        } = self;
        let stream = consumer.stream();
        futures::pin_mut!(stream);

        let mut tracker = AckTracker::new();

        info!("Kafka 消费循环已启动");

        loop {
            tokio::select! {
                // 偏向关闭信号，保证收到关闭时能尽快退出
                biased;

                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("收到关闭信号，Kafka 消费循环退出");
                        break;
                    }
                }

                msg_result = stream.next() => {
                    let Some(msg_result) = msg_result else {
                        warn!("Kafka 消息流意外结束");
                        break;
                    };

                    // 借用消息在 await 之前释放
                    let msg = match msg_result {
                        Ok(borrowed_msg) => ConsumerMessage::from_borrowed(&borrowed_msg),
                        Err(e) => {
                            error!(error = %e, "接收 Kafka 消息出错");
                            continue;
                        }
                    };

                    let (topic, partition, offset) = (msg.topic.clone(), msg.partition, msg.offset);
                    debug!(topic = %topic, partition, offset, "收到 Kafka 消息");

                    while let Ok((topic, partition)) = partition_changes.try_recv() {
                        tracker.forget(&topic, partition);
                        metrics::record_partition_blocked(&topic, partition, false);
                    }

                    tracker.observe(&topic, partition, offset);

                    let decision = handler(msg).await;
                    if let Some(position) = tracker.settle(&topic, partition, offset, decision) {
                        match commit(&consumer, &position) {
                            Ok(()) => debug!(
                                topic = %topic,
                                partition,
                                next = position.next_offset,
                                "偏移量已提交"
                            ),
                            Err(e) => warn!(error = %e, topic = %topic, partition, "偏移量提交失败"),
                        }
                    }
                    metrics::record_partition_blocked(
                        &topic,
                        partition,
                        tracker.is_blocked(&topic, partition),
                    );
                }
            }
        }
    }
}

/// 异步提交一个分区的偏移量
fn commit(
    consumer: &StreamConsumer<RebalanceContext>,
    position: &CommitPosition,
) -> Result<(), A2aError> {
    let mut tpl = TopicPartitionList::new();
    tpl.add_partition_offset(
        &position.topic,
        position.partition,
        Offset::Offset(position.next_offset),
    )
    .map_err(|e| A2aError::Kafka(format!("构造提交偏移量失败: {e}")))?;

    consumer
        .commit(&tpl, CommitMode::Async)
        .map_err(|e| A2aError::Kafka(format!("提交偏移量失败: {e}")))
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_constants() {
        assert_eq!(topics::ORDERS, "orders");
        assert_eq!(topics::PAYMENTS, "payments");
        assert_eq!(topics::ALERTS, "alerts");
        assert_eq!(topics::ALL.len(), 3);
    }

    #[test]
    fn test_consumer_message_accessors() {
        let msg = ConsumerMessage {
            topic: "orders".to_string(),
            partition: 0,
            offset: 42,
            key: Some("ORD-1".to_string()),
            payload: br#"{"id":"ORD-1"}"#.to_vec(),
            timestamp: Some(1_700_000_000_000),
            headers: HashMap::from([("trace-id".to_string(), "abc-123".to_string())]),
        };

        assert_eq!(msg.key_str(), "ORD-1");
        assert_eq!(msg.payload_str().unwrap(), r#"{"id":"ORD-1"}"#);
        assert_eq!(msg.headers.get("trace-id").unwrap(), "abc-123");
    }

    #[test]
    fn test_consumer_message_missing_key_and_invalid_utf8() {
        let msg = ConsumerMessage {
            topic: "alerts".to_string(),
            partition: 0,
            offset: 0,
            key: None,
            payload: vec![0xFF, 0xFE],
            timestamp: None,
            headers: HashMap::new(),
        };

        assert_eq!(msg.key_str(), "");
        assert!(msg.payload_str().is_err());
    }

    #[test]
    fn test_ack_tracker_commits_in_order() {
        let mut tracker = AckTracker::new();

        tracker.observe("orders", 0, 10);
        assert_eq!(tracker.ack("orders", 0, 10), Some(11));
        tracker.observe("orders", 0, 11);
        assert_eq!(tracker.ack("orders", 0, 11), Some(12));
        assert!(!tracker.is_blocked("orders", 0));
    }

    #[test]
    fn test_ack_tracker_nack_blocks_later_commits() {
        let mut tracker = AckTracker::new();

        tracker.observe("orders", 0, 5);
        tracker.nack("orders", 0, 5);
        assert!(tracker.is_blocked("orders", 0));

        // 后续成功的消息不能越过未确认的 5 提交
        tracker.observe("orders", 0, 6);
        assert_eq!(tracker.ack("orders", 0, 6), None);

        // 其他分区不受影响
        tracker.observe("orders", 1, 6);
        assert_eq!(tracker.ack("orders", 1, 6), Some(7));
    }

    #[test]
    fn test_ack_tracker_keeps_earliest_block() {
        let mut tracker = AckTracker::new();

        tracker.nack("payments", 0, 3);
        tracker.nack("payments", 0, 4);

        // 4 之后重新从 3 开始投递，视为回退
        tracker.observe("payments", 0, 3);
        assert!(!tracker.is_blocked("payments", 0));
        assert_eq!(tracker.ack("payments", 0, 3), Some(4));
    }

    #[test]
    fn test_ack_tracker_resets_on_rewind() {
        let mut tracker = AckTracker::new();

        tracker.observe("alerts", 2, 100);
        assert_eq!(tracker.ack("alerts", 2, 100), Some(101));

        // 重平衡后从已提交位置之前重新消费
        tracker.observe("alerts", 2, 90);
        assert_eq!(tracker.ack("alerts", 2, 90), Some(91));
    }

    #[test]
    fn test_settle_ack_returns_commit_position() {
        let mut tracker = AckTracker::new();

        tracker.observe("orders", 0, 10);
        assert_eq!(
            tracker.settle("orders", 0, 10, AckDecision::ack()),
            Some(CommitPosition {
                topic: "orders".to_string(),
                partition: 0,
                next_offset: 11,
            })
        );
    }

    #[test]
    fn test_settle_withhold_commits_nothing() {
        let mut tracker = AckTracker::new();

        tracker.observe("payments", 1, 4);
        assert_eq!(tracker.settle("payments", 1, 4, AckDecision::withhold()), None);
        assert!(tracker.is_blocked("payments", 1));
    }

    #[test]
    fn test_settle_success_after_withhold_stays_pinned() {
        let mut tracker = AckTracker::new();

        tracker.observe("orders", 0, 5);
        assert_eq!(tracker.settle("orders", 0, 5, AckDecision::withhold()), None);
        tracker.observe("orders", 0, 6);
        assert_eq!(tracker.settle("orders", 0, 6, AckDecision::ack()), None);

        // 重新投递 5 后恢复提交
        tracker.observe("orders", 0, 5);
        assert_eq!(
            tracker.settle("orders", 0, 5, AckDecision::ack()).map(|p| p.next_offset),
            Some(6)
        );
    }

    #[test]
    fn test_forget_clears_block_after_partition_reassigned() {
        let mut tracker = AckTracker::new();

        tracker.observe("orders", 0, 5);
        tracker.nack("orders", 0, 5);

        // 分区被撤销期间其他消费者已越过 5 提交，重新分配后从 20 开始消费
        tracker.forget("orders", 0);
        tracker.observe("orders", 0, 20);
        assert_eq!(tracker.ack("orders", 0, 20), Some(21));
        tracker.observe("orders", 0, 21);
        assert_eq!(tracker.ack("orders", 0, 21), Some(22));
        assert!(!tracker.is_blocked("orders", 0));
    }

    #[test]
    fn test_rebalance_context_forwards_partitions() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let context = RebalanceContext { changes: tx };

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition("orders", 0);
        tpl.add_partition("orders", 3);
        context.notify(&tpl, "revoke");

        assert_eq!(rx.try_recv().unwrap(), ("orders".to_string(), 0));
        assert_eq!(rx.try_recv().unwrap(), ("orders".to_string(), 3));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_ack_decision() {
        assert!(AckDecision::ack().success);
        assert!(!AckDecision::withhold().success);
    }
}
