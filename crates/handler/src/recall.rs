//! 撤回消费者
//!
//! 以固定的撤回消费组订阅撤回 topic，每条消息是一个撤回请求。
//! 撤回消息不做标签过滤，也不做分组匹配。

use std::sync::Arc;
use std::time::Instant;

use herald_shared::config::{BusinessConfig, KafkaConfig};
use herald_shared::error::HeraldError;
use herald_shared::kafka::{ConsumerMessage, KafkaConsumer};
use herald_shared::message::RecallRequest;
use herald_shared::observability::metrics;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::consumer::{ConsumerState, Lifecycle, drive};
use crate::dispatch::Dispatch;
use crate::error::HandlerError;
use crate::group::GroupId;
use crate::sink::ConsumeService;

/// 撤回消费者
pub struct RecallConsumer {
    group_id: GroupId,
    sink: Arc<dyn ConsumeService>,
    kafka: Option<KafkaConsumer>,
    lifecycle: Lifecycle,
}

impl RecallConsumer {
    pub fn new(group_id: GroupId, sink: Arc<dyn ConsumeService>) -> Self {
        let lifecycle = Lifecycle::new(group_id.as_str());
        Self {
            group_id,
            sink,
            kafka: None,
            lifecycle,
        }
    }

    /// 使用配置中的撤回消费组
    pub fn from_config(config: &BusinessConfig, sink: Arc<dyn ConsumeService>) -> Self {
        Self::new(GroupId::new(config.recall_group.as_str()), sink)
    }

    pub fn group_id(&self) -> &GroupId {
        &self.group_id
    }

    pub fn state(&self) -> ConsumerState {
        self.lifecycle.current()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConsumerState> {
        self.lifecycle.watch()
    }

    pub fn subscribe(&mut self, config: &KafkaConfig, recall_topic: &str) -> Result<(), HandlerError> {
        self.lifecycle.check(ConsumerState::Subscribed)?;

        let kafka = KafkaConsumer::new(config, self.group_id.as_str())?;
        kafka.subscribe(&[recall_topic])?;
        self.kafka = Some(kafka);

        self.lifecycle.advance(ConsumerState::Subscribed)
    }

    /// 解码撤回请求并交给业务处理方
    pub async fn dispatch(&self, msg: &ConsumerMessage) -> Dispatch {
        let started = Instant::now();
        let outcome = self.route(msg).await;

        metrics::record_outcome(
            "recall",
            self.group_id.as_str(),
            outcome.as_str(),
            started.elapsed().as_secs_f64(),
        );
        outcome
    }

    async fn route(&self, msg: &ConsumerMessage) -> Dispatch {
        let request: RecallRequest = match msg.deserialize_payload() {
            Ok(request) => request,
            Err(e) => {
                warn!(
                    partition = msg.partition,
                    offset = msg.offset,
                    error = %e,
                    "撤回请求解码失败，确认并丢弃"
                );
                return Dispatch::Malformed;
            }
        };

        let template_id = request.id;
        match self.sink.consume_to_recall(request).await {
            Ok(()) => {
                info!(template_id = ?template_id, "撤回请求已转发");
                Dispatch::Forwarded
            }
            Err(e) => {
                error!(template_id = ?template_id, offset = msg.offset, error = %e, "业务处理方处理撤回请求失败");
                Dispatch::SinkFailed
            }
        }
    }

    pub async fn run(mut self, shutdown: watch::Receiver<bool>) -> Result<(), HandlerError> {
        self.lifecycle.check(ConsumerState::Running)?;
        let kafka = self.kafka.take().ok_or_else(|| {
            HandlerError::Shared(HeraldError::Internal(format!(
                "撤回消费者 {} 已订阅但缺少 Kafka 会话",
                self.group_id
            )))
        })?;

        info!(group_id = %self.group_id, "撤回消费者开始运行");

        let this = Arc::new(self);
        let handler_this = Arc::clone(&this);
        drive(&this.lifecycle, kafka, shutdown, move |msg| {
            let this = Arc::clone(&handler_this);
            async move {
                this.dispatch(&msg).await;
                Ok::<(), HeraldError>(())
            }
        })
        .await
    }
}
