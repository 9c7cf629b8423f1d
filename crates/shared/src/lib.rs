//! 共享库
//!
//! 包含消息路由服务共用的配置、错误处理、Kafka 封装、消息模型与可观测性等基础设施代码。

pub mod config;
pub mod error;
pub mod kafka;
pub mod message;
pub mod observability;
pub mod test_utils;
