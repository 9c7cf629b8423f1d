//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::error::HeraldError;
use crate::observability::ObservabilityConfig;

/// Kafka 连接配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub brokers: String,
    pub auto_offset_reset: String,
    pub session_timeout_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            auto_offset_reset: "earliest".to_string(),
            session_timeout_ms: 30_000,
        }
    }
}

/// 业务 topic 与标签过滤配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusinessConfig {
    /// 所有消费者组共享的发送 topic
    pub topic: String,
    /// 撤回 topic
    pub recall_topic: String,
    /// 撤回消费者使用的固定消费组，不来自分组注册表
    pub recall_group: String,
    /// 标签 header 的 key
    pub tag_key: String,
    /// 标签 header 的值，命中时消息被过滤
    pub tag_value: String,
    /// 显式指定的分组消费者数量，缺省时等于注册表大小
    pub group_consumers: Option<usize>,
}

impl Default for BusinessConfig {
    fn default() -> Self {
        Self {
            topic: "herald.business".to_string(),
            recall_topic: "herald.recall".to_string(),
            recall_group: "herald.recall.group".to_string(),
            tag_key: "herald_tag".to_string(),
            tag_value: "herald.default".to_string(),
            group_consumers: None,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub kafka: KafkaConfig,
    pub business: BusinessConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（HERALD_ 前缀，双下划线分隔层级，如 HERALD_BUSINESS__TOPIC -> business.topic）
    pub fn load(service_name: &str) -> Result<Self, HeraldError> {
        let env = std::env::var("HERALD_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let config = Self::load_from(Path::new(&config_dir), service_name, &env)?;
        config.validate()?;
        Ok(config)
    }

    fn load_from(config_dir: &Path, service_name: &str, env: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{env}.toml"))).required(false))
            .add_source(File::from(config_dir.join(format!("{service_name}.toml"))).required(false))
            .add_source(
                Environment::with_prefix("HERALD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// 校验启动所必需的配置项
    ///
    /// 任何一项缺失都属于启动期配置错误，进程不应继续运行。
    pub fn validate(&self) -> Result<(), HeraldError> {
        let required = [
            ("kafka.brokers", &self.kafka.brokers),
            ("business.topic", &self.business.topic),
            ("business.recall_topic", &self.business.recall_topic),
            ("business.recall_group", &self.business.recall_group),
            ("business.tag_key", &self.business.tag_key),
        ];

        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(HeraldError::InvalidConfig {
                    field: field.to_string(),
                    message: "不能为空".to_string(),
                });
            }
        }

        if self.business.group_consumers == Some(0) {
            return Err(HeraldError::InvalidConfig {
                field: "business.group_consumers".to_string(),
                message: "分组消费者数量必须大于 0".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("herald-config-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.kafka.brokers, "localhost:9092");
        assert_eq!(config.business.topic, "herald.business");
        assert_eq!(config.business.recall_group, "herald.recall.group");
        assert!(config.business.group_consumers.is_none());
        tokio_test::assert_ok!(config.validate());
    }

    #[test]
    fn test_load_layers_files() {
        let dir = scratch_dir("layers");
        fs::write(
            dir.join("default.toml"),
            r#"
            [business]
            topic = "from-default"
            tag_value = "blue"
            "#,
        )
        .unwrap();
        fs::write(
            dir.join("herald-handler.toml"),
            r#"
            [business]
            topic = "from-service"
            group_consumers = 4
            "#,
        )
        .unwrap();

        let config = AppConfig::load_from(&dir, "herald-handler", "test").unwrap();
        assert_eq!(config.service_name, "herald-handler");
        assert_eq!(config.environment, "test");
        assert_eq!(config.business.topic, "from-service");
        assert_eq!(config.business.tag_value, "blue");
        assert_eq!(config.business.group_consumers, Some(4));
        // 未出现在文件中的配置保持默认值
        assert_eq!(config.business.recall_topic, "herald.recall");
        assert_eq!(config.kafka.auto_offset_reset, "earliest");

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_validate_rejects_blank_topic() {
        let mut config = AppConfig::default();
        config.business.topic = "  ".to_string();

        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIG");
        assert!(err.to_string().contains("business.topic"));
    }

    #[test]
    fn test_validate_rejects_zero_consumers() {
        let mut config = AppConfig::default();
        config.business.group_consumers = Some(0);
        tokio_test::assert_err!(config.validate());
    }
}
