//! 业务处理方
//!
//! 通过 `ConsumeService` trait 抽象"发送"和"撤回"两种业务能力，
//! 路由核心只负责把消息交给它，不关心具体如何发送。
//! 实现会被多个消费者任务并发调用，必须是 `Send + Sync`。

use async_trait::async_trait;
use herald_shared::message::{RecallRequest, TaskInfo};
use tracing::info;

use crate::error::SinkError;

/// 业务处理能力
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConsumeService: Send + Sync {
    /// 处理一整批发送任务
    async fn consume_to_send(&self, tasks: Vec<TaskInfo>) -> Result<(), SinkError>;

    /// 处理一条撤回请求
    async fn consume_to_recall(&self, request: RecallRequest) -> Result<(), SinkError>;
}

/// 仅记录日志的业务处理方
///
/// 在没有接入真实发送渠道时验证消费管道的完整性。
/// 接入时只需实现同一 trait 并在启动时替换。
pub struct LoggingConsumeService;

#[async_trait]
impl ConsumeService for LoggingConsumeService {
    async fn consume_to_send(&self, tasks: Vec<TaskInfo>) -> Result<(), SinkError> {
        for task in &tasks {
            info!(
                message_id = %task.message_id,
                message_template_id = task.message_template_id,
                send_channel = task.send_channel,
                msg_type = task.msg_type,
                receivers = task.receiver.len(),
                "模拟发送任务"
            );
        }
        Ok(())
    }

    async fn consume_to_recall(&self, request: RecallRequest) -> Result<(), SinkError> {
        info!(
            template_id = ?request.id,
            name = ?request.name,
            send_channel = ?request.send_channel,
            "模拟撤回消息模板"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_shared::message::{ChannelType, MessageType};
    use herald_shared::test_utils::TestDataGenerator;

    #[tokio::test]
    async fn test_logging_service_accepts_everything() {
        let service = LoggingConsumeService;

        let batch = TestDataGenerator::batch(ChannelType::Sms, MessageType::Notice, 3);
        tokio_test::assert_ok!(service.consume_to_send(batch).await);
        tokio_test::assert_ok!(service.consume_to_send(Vec::new()).await);
        tokio_test::assert_ok!(service.consume_to_recall(TestDataGenerator::recall(1)).await);
    }
}
