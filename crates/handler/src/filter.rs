//! 标签过滤
//!
//! 在反序列化负载之前根据 header 丢弃消息，省去无关消息的解码开销。
//! 被丢弃的消息同样会被确认，不会重投。

use herald_shared::config::BusinessConfig;
use herald_shared::kafka::ConsumerMessage;

/// header 标签过滤器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
    key: String,
    value: String,
}

impl TagFilter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn from_config(config: &BusinessConfig) -> Self {
        Self::new(&config.tag_key, &config.tag_value)
    }

    /// 是否丢弃该消息
    ///
    /// 没有任何 header，或任一标签 header 的值等于配置值时丢弃；
    /// 其余情况（包括 header 中没有标签 key、只有 null 或二进制 header）保留。
    pub fn should_discard(&self, msg: &ConsumerMessage) -> bool {
        !msg.has_headers() || msg.has_header_value(&self.key, &self.value)
    }
}
