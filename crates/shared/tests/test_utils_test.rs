//! test_utils 模块的集成测试
//!
//! 验证测试工具构造出的消息能被消费端按生产格式解码

use herald_shared::message::{ChannelType, MessageType, RecallRequest, TaskInfo};
use herald_shared::test_utils::*;

// ==================== 测试数据生成器测试 ====================

#[test]
fn test_task_generation() {
    let task = TestDataGenerator::task(ChannelType::Email, MessageType::Marketing);

    assert_eq!(task.channel(), Some(ChannelType::Email));
    assert_eq!(task.message_type(), Some(MessageType::Marketing));
    assert!(!task.receiver.is_empty());
    assert!(task.message_id.starts_with("msg-"));
}

#[test]
fn test_batch_generation_shares_group() {
    let batch = TestDataGenerator::batch(ChannelType::Push, MessageType::Notice, 5);

    assert_eq!(batch.len(), 5);
    assert!(batch.iter().all(|t| t.send_channel == ChannelType::Push.code()));
    assert!(batch.iter().all(|t| t.msg_type == MessageType::Notice.code()));
}

// ==================== 消息构造测试 ====================

#[test]
fn test_batch_record_round_trips_through_consumer_message() {
    let batch = TestDataGenerator::batch(ChannelType::Sms, MessageType::AuthCode, 2);
    let msg = batch_record(&batch, &[("herald_tag", "blue")]);

    assert_eq!(msg.header("herald_tag"), Some("blue"));
    let decoded: Vec<TaskInfo> = msg.deserialize_payload().expect("解码批次失败");
    assert_eq!(decoded, batch);
}

#[test]
fn test_recall_record_decodes() {
    let request = TestDataGenerator::recall(7);
    let msg = recall_record(&request, &[]);

    assert!(!msg.has_headers());
    let decoded: RecallRequest = msg.deserialize_payload().expect("解码撤回请求失败");
    assert_eq!(decoded.id, Some(7));
    assert_eq!(decoded, request);
}

#[test]
fn test_offsets_are_unique() {
    let a = record("t", None, &[]);
    let b = record("t", None, &[]);
    assert_ne!(a.offset, b.offset);
}

#[test]
fn test_business_config_defaults_tag() {
    let config = test_business_config();
    assert_eq!(config.tag_key, "herald_tag");
    assert_eq!(config.tag_value, "herald.default");
    assert_ne!(config.topic, config.recall_topic);
}
