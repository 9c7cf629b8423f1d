//! 测试工具模块
//!
//! 提供构造 Kafka 消息与发送任务的辅助函数，
//! 让路由相关测试不必依赖真实 broker。

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};

use serde_json::json;

use crate::config::BusinessConfig;
use crate::kafka::ConsumerMessage;
use crate::message::{ChannelType, MessageType, RecallRequest, TaskInfo};

// ==================== 测试配置辅助 ====================

/// 测试用标签配置：`herald_tag=herald.default`
pub fn test_business_config() -> BusinessConfig {
    BusinessConfig {
        topic: "herald.business.test".to_string(),
        recall_topic: "herald.recall.test".to_string(),
        recall_group: "herald.recall.group.test".to_string(),
        ..Default::default()
    }
}

/// 生成单调递增的偏移量，便于在断言失败时定位消息
pub fn next_offset() -> i64 {
    static COUNTER: AtomicI64 = AtomicI64::new(0);
    COUNTER.fetch_add(1, Ordering::SeqCst)
}

// ==================== 测试数据生成器 ====================

/// 测试数据生成器
pub struct TestDataGenerator;

impl TestDataGenerator {
    /// 生成指定渠道与消息类型的发送任务
    pub fn task(channel: ChannelType, msg_type: MessageType) -> TaskInfo {
        TaskInfo {
            message_id: format!("msg-{}", next_offset()),
            biz_id: None,
            message_template_id: 1,
            business_id: 1_000_000_001,
            receiver: BTreeSet::from(["13800000000".to_string()]),
            id_type: 30,
            send_channel: channel.code(),
            template_type: 10,
            msg_type: msg_type.code(),
            shield_type: 10,
            content_model: json!({"content": "您的验证码为 123456"}),
            send_account: 10,
        }
    }

    /// 生成同一分组的一批任务
    pub fn batch(channel: ChannelType, msg_type: MessageType, size: usize) -> Vec<TaskInfo> {
        (0..size).map(|_| Self::task(channel, msg_type)).collect()
    }

    /// 生成撤回请求
    pub fn recall(template_id: i64) -> RecallRequest {
        RecallRequest {
            id: Some(template_id),
            name: Some(format!("template-{template_id}")),
            send_channel: Some(ChannelType::Sms.code()),
            msg_type: Some(MessageType::Marketing.code()),
            msg_status: Some(30),
            msg_content: Some(r#"{"content":"活动已结束"}"#.to_string()),
            send_account: Some(10),
            creator: Some("tester".to_string()),
            updated: Some(1_700_000_000),
        }
    }
}

// ==================== 消息构造 ====================

/// 以原始负载与 header 构造消息
pub fn record(topic: &str, payload: Option<&[u8]>, headers: &[(&str, &str)]) -> ConsumerMessage {
    ConsumerMessage {
        topic: topic.to_string(),
        partition: 0,
        offset: next_offset(),
        key: None,
        payload: payload.map(|p| p.to_vec()),
        timestamp: None,
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), Some(v.as_bytes().to_vec())))
            .collect(),
    }
}

/// 将一批任务序列化为发送 topic 上的消息
pub fn batch_record(tasks: &[TaskInfo], headers: &[(&str, &str)]) -> ConsumerMessage {
    let payload = serde_json::to_vec(tasks).expect("序列化测试任务失败");
    record("herald.business.test", Some(&payload), headers)
}

/// 将撤回请求序列化为撤回 topic 上的消息
pub fn recall_record(request: &RecallRequest, headers: &[(&str, &str)]) -> ConsumerMessage {
    let payload = serde_json::to_vec(request).expect("序列化测试撤回请求失败");
    record("herald.recall.test", Some(&payload), headers)
}
