//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// Kafka 配置
///
/// 自动提交始终关闭，偏移量只在任务提交成功后由消费者手动提交。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub brokers: String,
    pub consumer_group: String,
    pub auto_offset_reset: String,
    pub session_timeout_ms: u32,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            consumer_group: "a2a-group".to_string(),
            auto_offset_reset: "earliest".to_string(),
            session_timeout_ms: 10_000,
        }
    }
}

/// 任务分发配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// 提交任务后是否等待任务结果
    pub wait_for_result: bool,
    /// 等待任务结果的上限（秒）
    pub poll_timeout_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            wait_for_result: true,
            poll_timeout_secs: 5,
        }
    }
}

impl DispatcherConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}

/// 本地任务后端配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaskBackendConfig {
    /// 同时执行的任务上限
    pub max_concurrent_tasks: u32,
    /// 已结束任务在内存中的保留时间（秒）
    pub task_retention_secs: u64,
}

impl Default for TaskBackendConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 64,
            task_retention_secs: 300,
        }
    }
}

impl TaskBackendConfig {
    pub fn task_retention(&self) -> Duration {
        Duration::from_secs(self.task_retention_secs)
    }
}

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// 服务名称，用于标识日志和指标的来源
    pub service_name: String,
    pub log_level: String,
    /// 日志输出格式：json（结构化）或 pretty（人类可读）
    pub log_format: String,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown-service".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
            metrics_port: 9090,
        }
    }
}

impl ObservabilityConfig {
    /// 注入服务名，配置文件里通常不单独填写
    pub fn with_service_name(mut self, service_name: &str) -> Self {
        self.service_name = service_name.to_string();
        self
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub kafka: KafkaConfig,
    pub dispatcher: DispatcherConfig,
    pub task_backend: TaskBackendConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（A2A_ 前缀，层级用双下划线，如 A2A_KAFKA__BROKERS -> kafka.brokers）
    ///
    /// 文件格式错误或字段类型不匹配时返回 `A2aError::Config`。
    pub fn load(service_name: &str) -> Result<Self> {
        // .env 文件不存在不是错误
        let _ = dotenvy::dotenv();

        let env = std::env::var("A2A_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        Self::load_from(service_name, &env, Path::new(&config_dir))
    }

    fn load_from(service_name: &str, env: &str, config_dir: &Path) -> Result<Self> {
        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{env}.toml"))).required(false))
            .add_source(
                File::from(config_dir.join(format!("{service_name}.toml"))).required(false),
            )
            .add_source(
                Environment::with_prefix("A2A")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.kafka.consumer_group, "a2a-group");
        assert_eq!(config.kafka.auto_offset_reset, "earliest");
        assert!(config.dispatcher.wait_for_result);
        assert_eq!(config.dispatcher.poll_timeout(), Duration::from_secs(5));
        assert_eq!(config.task_backend.max_concurrent_tasks, 64);
        assert_eq!(config.task_backend.task_retention(), Duration::from_secs(300));
    }

    #[test]
    fn test_load_without_files_uses_defaults() {
        let dir = Path::new("definitely-missing-config-dir");
        let config = AppConfig::load_from("kafka-a2a-agent", "test", dir).unwrap();

        assert_eq!(config.service_name, "kafka-a2a-agent");
        assert_eq!(config.environment, "test");
        assert_eq!(config.kafka.brokers, "localhost:9092");
        assert!(!config.is_production());
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = std::env::temp_dir().join(format!("a2a-config-malformed-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("default.toml"), "[kafka\nbrokers = ").unwrap();

        let err = AppConfig::load_from("kafka-a2a-agent", "test", &dir).unwrap_err();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(err.code(), "CONFIG_ERROR");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_observability_with_service_name() {
        let obs = ObservabilityConfig::default().with_service_name("kafka-a2a-agent");
        assert_eq!(obs.service_name, "kafka-a2a-agent");
        assert!(!obs.json_logs());

        let obs = ObservabilityConfig {
            log_format: "JSON".to_string(),
            ..Default::default()
        };
        assert!(obs.json_logs());
    }
}
