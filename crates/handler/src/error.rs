//! 消息处理服务错误类型
//!
//! 启动期错误（注册表、消费者创建、订阅）一律致命；
//! 单条消息的错误在 dispatch 内部消化，不会出现在这里。

use herald_shared::error::HeraldError;

use crate::consumer::ConsumerState;

/// 消息处理服务错误
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// 分组映射没有产生任何消费组，说明映射配置缺失
    #[error("分组注册表为空，至少需要一个消费组")]
    EmptyRegistry,

    /// 同一个消费组标识出现两次会让两个消费者处理同一批任务
    #[error("分组标识重复: {group_id}")]
    DuplicateGroup { group_id: String },

    /// 创建的消费者数量与注册表大小不一致
    #[error("消费者数量与分组注册表不一致: 请求 {requested}, 注册 {registered}")]
    ProvisioningMismatch { requested: usize, registered: usize },

    /// 工厂返回的消费者没有绑定到交给它的分组
    #[error("第 {index} 个消费者绑定错误: 期望 {expected}, 实际 {actual}")]
    BindingMismatch {
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("消费者 {consumer} 状态迁移非法: {from} -> {to}")]
    InvalidTransition {
        consumer: String,
        from: ConsumerState,
        to: ConsumerState,
    },

    /// tokio 任务 panic 或被取消
    #[error("消费者任务异常退出: {0}")]
    TaskFailed(String),

    /// 透传共享库错误，避免在每个 match 分支手动转换
    #[error(transparent)]
    Shared(#[from] HeraldError),
}

/// 业务处理方返回的错误
///
/// 核心只记录日志，不重试也不影响其他消息的确认。
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("发送处理失败: {0}")]
    Send(String),

    #[error("撤回处理失败: {0}")]
    Recall(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HandlerError::ProvisioningMismatch {
            requested: 3,
            registered: 2,
        };
        assert_eq!(err.to_string(), "消费者数量与分组注册表不一致: 请求 3, 注册 2");

        let err = HandlerError::DuplicateGroup {
            group_id: "sms.notice".to_string(),
        };
        assert_eq!(err.to_string(), "分组标识重复: sms.notice");

        let err = HandlerError::InvalidTransition {
            consumer: "sms.notice".to_string(),
            from: ConsumerState::Provisioned,
            to: ConsumerState::Running,
        };
        assert_eq!(
            err.to_string(),
            "消费者 sms.notice 状态迁移非法: Provisioned -> Running"
        );

        let err = HandlerError::Shared(HeraldError::Kafka("broker 不可达".to_string()));
        assert_eq!(err.to_string(), "Kafka 错误: broker 不可达");

        let err = SinkError::Recall("模板不存在".to_string());
        assert_eq!(err.to_string(), "撤回处理失败: 模板不存在");
    }
}
