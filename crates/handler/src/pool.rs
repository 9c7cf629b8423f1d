//! 分组消费者池
//!
//! 启动时按注册表顺序创建消费者，第 i 个消费者绑定注册表第 i 项。
//! 数量必须与注册表完全一致：多了会有消费者无组可绑，少了会有分组无人消费。

use herald_shared::config::KafkaConfig;
use herald_shared::observability::metrics;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::consumer::{ConsumerState, GroupConsumer};
use crate::error::HandlerError;
use crate::group::{GroupBinding, GroupRegistry};

/// 分组消费者池
pub struct ConsumerPool {
    consumers: Vec<GroupConsumer>,
}

impl ConsumerPool {
    /// 为注册表中的每个分组创建一个消费者
    ///
    /// `factory` 按注册顺序接收绑定并返回消费者；返回的消费者必须绑定到传入的分组。
    pub fn provision<F>(
        registry: &GroupRegistry,
        requested: usize,
        mut factory: F,
    ) -> Result<Self, HandlerError>
    where
        F: FnMut(GroupBinding) -> GroupConsumer,
    {
        if requested != registry.len() {
            return Err(HandlerError::ProvisioningMismatch {
                requested,
                registered: registry.len(),
            });
        }

        let mut consumers = Vec::with_capacity(requested);
        for binding in registry.bindings() {
            let expected = binding.clone();
            let consumer = factory(binding);
            if consumer.binding() != &expected {
                return Err(HandlerError::BindingMismatch {
                    index: expected.index(),
                    expected: expected.group_id().to_string(),
                    actual: consumer.group_id().to_string(),
                });
            }
            consumers.push(consumer);
        }

        metrics::set_consumers_provisioned(consumers.len());
        info!(count = consumers.len(), "分组消费者创建完成");
        Ok(Self { consumers })
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    pub fn consumers(&self) -> &[GroupConsumer] {
        &self.consumers
    }

    pub fn bindings(&self) -> Vec<&GroupBinding> {
        self.consumers.iter().map(GroupConsumer::binding).collect()
    }

    pub fn states(&self) -> Vec<ConsumerState> {
        self.consumers.iter().map(GroupConsumer::state).collect()
    }

    /// 让每个消费者以各自的分组订阅共享 topic
    ///
    /// 任一订阅失败都视为启动失败。
    pub fn subscribe_all(&mut self, config: &KafkaConfig, topic: &str) -> Result<(), HandlerError> {
        for consumer in &mut self.consumers {
            consumer.subscribe(config, topic)?;
        }
        info!(topic, count = self.consumers.len(), "全部分组消费者已订阅");
        Ok(())
    }

    /// 并发运行全部消费者直到收到关闭信号
    ///
    /// 每个消费者在独立的 tokio 任务中运行，互不阻塞；
    /// 全部退出后返回遇到的第一个错误。
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), HandlerError> {
        if let Some(consumer) = self
            .consumers
            .iter()
            .find(|c| c.state() != ConsumerState::Subscribed)
        {
            return Err(HandlerError::InvalidTransition {
                consumer: consumer.group_id().to_string(),
                from: consumer.state(),
                to: ConsumerState::Running,
            });
        }

        let mut tasks = JoinSet::new();
        for consumer in self.consumers {
            tasks.spawn(consumer.run(shutdown.clone()));
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(|e| HandlerError::TaskFailed(e.to_string())).and_then(|r| r);
            if let Err(e) = result {
                error!(error = %e, "分组消费者异常退出");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("全部分组消费者已停止");
                Ok(())
            }
        }
    }
}
