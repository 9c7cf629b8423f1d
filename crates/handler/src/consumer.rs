//! 分组消费者
//!
//! 每个消费者绑定注册表中的一个分组，以该分组标识作为 `group.id` 订阅共享 topic。
//! 生命周期：`Provisioned -> Subscribed -> Running -> ShuttingDown -> Stopped`，
//! 状态通过 `watch` channel 对外发布。

use std::fmt;
use std::sync::Arc;

use herald_shared::config::KafkaConfig;
use herald_shared::error::HeraldError;
use herald_shared::kafka::{ConsumerMessage, KafkaConsumer, RecordSource};
use tokio::sync::watch;
use tracing::info;

use crate::dispatch::{Dispatch, GroupRouter};
use crate::error::HandlerError;
use crate::filter::TagFilter;
use crate::group::{GroupBinding, GroupId, GroupIdMapping};
use crate::sink::ConsumeService;

// ---------------------------------------------------------------------------
// ConsumerState
// ---------------------------------------------------------------------------

/// 消费者生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// 已绑定分组，尚未订阅
    Provisioned,
    /// 已以绑定分组订阅 topic
    Subscribed,
    /// 消费循环运行中
    Running,
    /// 收到关闭信号，正在提交偏移量并释放订阅
    ShuttingDown,
    Stopped,
}

impl ConsumerState {
    /// 只允许沿生命周期单向前进一步
    pub fn can_transition_to(self, next: ConsumerState) -> bool {
        use ConsumerState::*;
        matches!(
            (self, next),
            (Provisioned, Subscribed)
                | (Subscribed, Running)
                | (Running, ShuttingDown)
                | (ShuttingDown, Stopped)
        )
    }
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 状态机与其发布通道
///
/// 分组消费者和撤回消费者共用。
pub(crate) struct Lifecycle {
    name: String,
    state: watch::Sender<ConsumerState>,
}

impl Lifecycle {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        let (state, _) = watch::channel(ConsumerState::Provisioned);
        Self {
            name: name.into(),
            state,
        }
    }

    pub(crate) fn current(&self) -> ConsumerState {
        *self.state.borrow()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    /// 校验能否迁移到 `next`，不改变状态
    pub(crate) fn check(&self, next: ConsumerState) -> Result<(), HandlerError> {
        let current = self.current();
        if current.can_transition_to(next) {
            Ok(())
        } else {
            Err(HandlerError::InvalidTransition {
                consumer: self.name.clone(),
                from: current,
                to: next,
            })
        }
    }

    pub(crate) fn advance(&self, next: ConsumerState) -> Result<(), HandlerError> {
        self.check(next)?;
        let previous = self.state.send_replace(next);
        info!(consumer = %self.name, from = %previous, to = %next, "消费者状态变更");
        Ok(())
    }
}

/// 订阅后驱动消费循环直到关闭，再释放订阅
///
/// 正在处理的消息总能处理完毕，之后才进入 `ShuttingDown`。
pub(crate) async fn drive<C, F, Fut>(
    lifecycle: &Lifecycle,
    source: C,
    shutdown: watch::Receiver<bool>,
    handler: F,
) -> Result<(), HandlerError>
where
    C: RecordSource,
    F: Fn(ConsumerMessage) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<(), HeraldError>> + Send,
{
    lifecycle.advance(ConsumerState::Running)?;
    source.consume(shutdown, handler).await;

    lifecycle.advance(ConsumerState::ShuttingDown)?;
    source.release();
    lifecycle.advance(ConsumerState::Stopped)
}

// ---------------------------------------------------------------------------
// GroupConsumer
// ---------------------------------------------------------------------------

/// 分组消费者
///
/// 独占自己的 Kafka 会话；绑定分组在创建时显式传入，进程生命周期内不变。
pub struct GroupConsumer {
    binding: GroupBinding,
    router: GroupRouter,
    kafka: Option<KafkaConsumer>,
    lifecycle: Lifecycle,
}

impl GroupConsumer {
    pub fn new(
        binding: GroupBinding,
        filter: TagFilter,
        mapping: Arc<dyn GroupIdMapping>,
        sink: Arc<dyn ConsumeService>,
    ) -> Self {
        let router = GroupRouter::new(binding.group_id().clone(), filter, mapping, sink);
        let lifecycle = Lifecycle::new(binding.group_id().as_str());
        Self {
            binding,
            router,
            kafka: None,
            lifecycle,
        }
    }

    pub fn binding(&self) -> &GroupBinding {
        &self.binding
    }

    pub fn group_id(&self) -> &GroupId {
        self.binding.group_id()
    }

    pub fn state(&self) -> ConsumerState {
        self.lifecycle.current()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConsumerState> {
        self.lifecycle.watch()
    }

    /// 以绑定分组为 `group.id` 订阅共享 topic
    pub fn subscribe(&mut self, config: &KafkaConfig, topic: &str) -> Result<(), HandlerError> {
        self.lifecycle.check(ConsumerState::Subscribed)?;

        let kafka = KafkaConsumer::new(config, self.binding.group_id().as_str())?;
        kafka.subscribe(&[topic])?;
        self.kafka = Some(kafka);

        self.lifecycle.advance(ConsumerState::Subscribed)
    }

    /// 对单条消息执行过滤、解码和分组匹配
    pub async fn dispatch(&self, msg: &ConsumerMessage) -> Dispatch {
        self.router.dispatch(msg).await
    }

    /// 运行消费循环直到收到关闭信号
    pub async fn run(mut self, shutdown: watch::Receiver<bool>) -> Result<(), HandlerError> {
        self.lifecycle.check(ConsumerState::Running)?;
        let kafka = self.kafka.take().ok_or_else(|| {
            HandlerError::Shared(HeraldError::Internal(format!(
                "消费者 {} 已订阅但缺少 Kafka 会话",
                self.binding.group_id()
            )))
        })?;

        info!(
            group_id = %self.binding.group_id(),
            index = self.binding.index(),
            "分组消费者开始运行"
        );

        let router = self.router.clone();
        drive(&self.lifecycle, kafka, shutdown, move |msg| {
            let router = router.clone();
            async move {
                router.dispatch(&msg).await;
                Ok::<(), HeraldError>(())
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use crate::group::{ChannelGroupMapping, GroupRegistry};
    use crate::sink::LoggingConsumeService;
    use async_trait::async_trait;
    use futures::StreamExt;
    use herald_shared::kafka::consume_records;
    use herald_shared::message::{ChannelType, MessageType, RecallRequest, TaskInfo};
    use herald_shared::test_utils::{TestDataGenerator, batch_record};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn consumer() -> GroupConsumer {
        let registry = GroupRegistry::new(vec!["sms.notice".into()]).unwrap();
        let binding = registry.bindings().next().unwrap();
        GroupConsumer::new(
            binding,
            TagFilter::new("herald_tag", "herald.default"),
            Arc::new(ChannelGroupMapping),
            Arc::new(LoggingConsumeService),
        )
    }

    #[test]
    fn test_state_transitions() {
        use ConsumerState::*;

        assert!(Provisioned.can_transition_to(Subscribed));
        assert!(Subscribed.can_transition_to(Running));
        assert!(Running.can_transition_to(ShuttingDown));
        assert!(ShuttingDown.can_transition_to(Stopped));

        assert!(!Provisioned.can_transition_to(Running));
        assert!(!Running.can_transition_to(Subscribed));
        assert!(!Stopped.can_transition_to(Provisioned));
        assert!(!Subscribed.can_transition_to(Subscribed));
    }

    #[test]
    fn test_new_consumer_is_provisioned() {
        let consumer = consumer();
        assert_eq!(consumer.state(), ConsumerState::Provisioned);
        assert_eq!(consumer.group_id().as_str(), "sms.notice");
        assert_eq!(consumer.binding().index(), 0);
    }

    #[tokio::test]
    async fn test_run_requires_subscription() {
        let consumer = consumer();
        let (_tx, rx) = watch::channel(false);

        let err = consumer.run(rx).await.unwrap_err();
        assert!(matches!(
            err,
            HandlerError::InvalidTransition {
                from: ConsumerState::Provisioned,
                to: ConsumerState::Running,
                ..
            }
        ));
    }

    /// 按脚本产出记录的来源，记录确认与释放时的消费者状态
    struct ScriptedSource {
        records: Vec<ConsumerMessage>,
        states: watch::Receiver<ConsumerState>,
        acked: Arc<Mutex<Vec<(i64, ConsumerState)>>>,
        released_in: Arc<Mutex<Option<ConsumerState>>>,
    }

    impl RecordSource for ScriptedSource {
        fn consume<F, Fut>(
            &self,
            shutdown: watch::Receiver<bool>,
            handler: F,
        ) -> impl std::future::Future<Output = ()> + Send
        where
            F: Fn(ConsumerMessage) -> Fut + Send + Sync,
            Fut: std::future::Future<Output = Result<(), HeraldError>> + Send,
        {
            let stream = futures::stream::iter(
                self.records.clone().into_iter().map(Ok::<_, HeraldError>),
            )
            .chain(futures::stream::pending());
            let states = self.states.clone();
            let acked = self.acked.clone();

            async move {
                consume_records("sms.notice", stream, shutdown, handler, |msg: &ConsumerMessage| {
                    acked.lock().unwrap().push((msg.offset, *states.borrow()));
                })
                .await
            }
        }

        fn release(self) {
            *self.released_in.lock().unwrap() = Some(*self.states.borrow());
        }
    }

    /// 进入发送后阻塞，直到测试放行
    struct GatedSink {
        entered: Notify,
        release: Notify,
        states: watch::Receiver<ConsumerState>,
        finished_in: Mutex<Vec<ConsumerState>>,
    }

    #[async_trait]
    impl ConsumeService for GatedSink {
        async fn consume_to_send(&self, _tasks: Vec<TaskInfo>) -> Result<(), SinkError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.finished_in.lock().unwrap().push(*self.states.borrow());
            Ok(())
        }

        async fn consume_to_recall(&self, _request: RecallRequest) -> Result<(), SinkError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_in_flight_record_finishes_before_shutting_down() {
        let lifecycle = Lifecycle::new("sms.notice");
        let mut states = lifecycle.watch();

        let sink = Arc::new(GatedSink {
            entered: Notify::new(),
            release: Notify::new(),
            states: lifecycle.watch(),
            finished_in: Mutex::new(Vec::new()),
        });
        let router = GroupRouter::new(
            GroupId::from("sms.notice"),
            TagFilter::new("herald_tag", "herald.default"),
            Arc::new(ChannelGroupMapping),
            sink.clone(),
        );

        let batch = TestDataGenerator::batch(ChannelType::Sms, MessageType::Notice, 2);
        let mut first = batch_record(&batch, &[("herald_tag", "other-line")]);
        first.offset = 0;
        let mut second = first.clone();
        second.offset = 1;

        let acked = Arc::new(Mutex::new(Vec::new()));
        let released_in = Arc::new(Mutex::new(None));
        let source = ScriptedSource {
            records: vec![first, second],
            states: lifecycle.watch(),
            acked: acked.clone(),
            released_in: released_in.clone(),
        };

        // 手动推进到 Subscribed，drive 从 Running 开始
        lifecycle.advance(ConsumerState::Subscribed).unwrap();

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            drive(&lifecycle, source, rx, move |msg| {
                let router = router.clone();
                async move {
                    router.dispatch(&msg).await;
                    Ok::<(), HeraldError>(())
                }
            })
            .await
        });

        sink.entered.notified().await;
        tx.send(true).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // 关闭信号已发出，在途记录未完成前不得进入 ShuttingDown
        assert_eq!(*states.borrow_and_update(), ConsumerState::Running);
        assert!(acked.lock().unwrap().is_empty());
        assert!(released_in.lock().unwrap().is_none());

        sink.release.notify_one();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("关闭超时")
            .unwrap()
            .unwrap();

        assert_eq!(*sink.finished_in.lock().unwrap(), vec![ConsumerState::Running]);
        assert_eq!(*acked.lock().unwrap(), vec![(0, ConsumerState::Running)]);
        assert_eq!(*released_in.lock().unwrap(), Some(ConsumerState::ShuttingDown));
        assert_eq!(*states.borrow_and_update(), ConsumerState::Stopped);
    }

    #[tokio::test]
    async fn test_lifecycle_with_early_shutdown() {
        let mut consumer = consumer();
        let mut states = consumer.watch_state();

        let config = KafkaConfig {
            brokers: "127.0.0.1:1".to_string(),
            ..Default::default()
        };
        consumer.subscribe(&config, "herald.business.test").unwrap();
        assert_eq!(consumer.state(), ConsumerState::Subscribed);
        assert!(consumer.subscribe(&config, "herald.business.test").is_err());

        // 关闭信号先于运行到达：循环立即返回，依次走完剩余状态
        let (_tx, rx) = watch::channel(true);
        tokio::time::timeout(Duration::from_secs(30), consumer.run(rx))
            .await
            .expect("关闭超时")
            .unwrap();

        assert_eq!(*states.borrow_and_update(), ConsumerState::Stopped);
    }
}
