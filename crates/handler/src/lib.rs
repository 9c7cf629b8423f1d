//! 分组扇出消息处理服务
//!
//! 所有消费组共享同一个发送 topic，broker 把每条消息复制给每个消费组。
//! 本服务在启动时按分组注册表为每个分组创建一个消费者，
//! 通过"header 标签过滤 + 负载分组匹配"两级过滤保证每批任务只被所属分组处理；
//! 另有独立的撤回消费者处理消息模板撤回请求。

pub mod consumer;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod group;
pub mod pool;
pub mod recall;
pub mod sink;
