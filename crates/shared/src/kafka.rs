//! Kafka 基础设施封装
//!
//! 将 rdkafka 的底层 API 封装为业务友好的 Consumer 抽象，
//! 统一消息解码、错误映射、偏移量确认和优雅关闭语义，避免各消费者重复编写样板代码。

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;

use futures::{Stream, StreamExt};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::KafkaConfig;
use crate::error::HeraldError;
use crate::observability;

// ---------------------------------------------------------------------------
// ConsumerMessage
// ---------------------------------------------------------------------------

/// 消费到的 Kafka 消息的统一表示
///
/// 将 rdkafka 的 `BorrowedMessage`（带生命周期约束）转换为拥有所有权的结构体，
/// 使消息可以安全地跨 await 点传递给异步处理函数。
/// `payload` 为 `None` 表示墓碑消息（value 为 null），与空字节区分开。
/// `headers` 按原始顺序保留全部 header，包括重复 key、null 值和非 UTF-8 值。
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Option<Vec<u8>>,
    pub timestamp: Option<i64>,
    pub headers: Vec<(String, Option<Vec<u8>>)>,
}

impl ConsumerMessage {
    /// 从 rdkafka 的借用消息构造，提取并拥有所有字段
    fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        let key = msg
            .key()
            .and_then(|k| std::str::from_utf8(k).ok())
            .map(String::from);

        let payload = msg.payload().map(|p| p.to_vec());

        let timestamp = msg.timestamp().to_millis();

        let headers = msg
            .headers()
            .map(|h| {
                h.iter()
                    .map(|header| (header.key.to_string(), header.value.map(<[u8]>::to_vec)))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key,
            payload,
            timestamp,
            headers,
        }
    }

    /// 消息是否携带了任何 header，值为 null 或非 UTF-8 的也算
    pub fn has_headers(&self) -> bool {
        !self.headers.is_empty()
    }

    /// 按 key 读取第一个可按 UTF-8 解码的 header 值
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k == key)
            .find_map(|(_, v)| v.as_deref().and_then(|raw| std::str::from_utf8(raw).ok()))
    }

    /// 是否存在 key 与值都精确匹配的 header；同一 key 出现多次时逐个比较
    pub fn has_header_value(&self, key: &str, value: &str) -> bool {
        self.headers
            .iter()
            .any(|(k, v)| k == key && v.as_deref() == Some(value.as_bytes()))
    }

    /// 可按 UTF-8 解码的 header，同名时保留第一个，供追踪上下文提取
    pub fn text_headers(&self) -> HashMap<String, String> {
        let mut text = HashMap::with_capacity(self.headers.len());
        for (key, value) in &self.headers {
            if let Some(value) = value.as_deref().and_then(|raw| std::str::from_utf8(raw).ok()) {
                text.entry(key.clone()).or_insert_with(|| value.to_string());
            }
        }
        text
    }

    /// 将负载视为 UTF-8 字符串返回
    ///
    /// null 与空白负载都按 `EmptyPayload` 处理。
    pub fn payload_str(&self) -> Result<&str, HeraldError> {
        let raw = self.payload.as_deref().ok_or(HeraldError::EmptyPayload)?;
        let text = std::str::from_utf8(raw)?;
        if text.trim().is_empty() {
            return Err(HeraldError::EmptyPayload);
        }
        Ok(text)
    }

    /// 将 JSON 格式负载反序列化为目标类型
    pub fn deserialize_payload<T: DeserializeOwned>(&self) -> Result<T, HeraldError> {
        let text = self.payload_str()?;
        Ok(serde_json::from_str(text)?)
    }
}

// ---------------------------------------------------------------------------
// KafkaConsumer
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 消费者
///
/// 封装 `StreamConsumer` 并提供基于 `watch` channel 的优雅关闭语义。
/// 自动提交只提交显式存储过的偏移量：每条消息处理结束后才存储，
/// 因此正在处理的消息不会在关闭时被提前确认。
pub struct KafkaConsumer {
    consumer: StreamConsumer,
    group_id: String,
}

impl KafkaConsumer {
    /// 以指定消费组创建消费者
    ///
    /// 只建立客户端，不连接 broker；订阅失败才会暴露连接问题。
    pub fn new(config: &KafkaConfig, group_id: &str) -> Result<Self, HeraldError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", group_id)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .create()
            .map_err(|e| HeraldError::Kafka(format!("创建消费者失败: {e}")))?;

        info!(brokers = %config.brokers, group_id, "Kafka 消费者已初始化");
        Ok(Self {
            consumer,
            group_id: group_id.to_string(),
        })
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// 订阅指定的 topic 列表
    pub fn subscribe(&self, topics: &[&str]) -> Result<(), HeraldError> {
        self.consumer
            .subscribe(topics)
            .map_err(|e| HeraldError::Kafka(format!("订阅 topic 失败: {e}")))?;

        info!(group_id = %self.group_id, ?topics, "已订阅 Kafka topics");
        Ok(())
    }

    /// 启动消费循环
    ///
    /// 每条消息处理结束后存储其偏移量，由自动提交带走。
    pub async fn start<F, Fut>(&self, shutdown: watch::Receiver<bool>, handler: F)
    where
        F: Fn(ConsumerMessage) -> Fut,
        Fut: Future<Output = Result<(), HeraldError>>,
    {
        consume_records(
            &self.group_id,
            self.consumer.stream(),
            shutdown,
            handler,
            |msg: &BorrowedMessage<'_>| {
                if let Err(e) = self.consumer.store_offset_from_message(msg) {
                    warn!(group_id = %self.group_id, error = %e, "存储消费偏移量失败");
                }
            },
        )
        .await
    }

    /// 同步提交已存储的偏移量并释放订阅
    pub fn close(self) {
        if let Err(e) = self.consumer.commit_consumer_state(CommitMode::Sync) {
            // 没有任何已存储偏移量时 librdkafka 同样返回错误
            debug!(group_id = %self.group_id, error = %e, "关闭时提交偏移量未完成");
        }
        self.consumer.unsubscribe();
        info!(group_id = %self.group_id, "Kafka 订阅已释放");
    }
}

// ---------------------------------------------------------------------------
// 消费循环
// ---------------------------------------------------------------------------

/// 可转换为 [`ConsumerMessage`] 的入站记录
pub trait InboundRecord {
    fn to_consumer_message(&self) -> ConsumerMessage;
}

impl InboundRecord for BorrowedMessage<'_> {
    fn to_consumer_message(&self) -> ConsumerMessage {
        ConsumerMessage::from_borrowed(self)
    }
}

impl InboundRecord for ConsumerMessage {
    fn to_consumer_message(&self) -> ConsumerMessage {
        self.clone()
    }
}

/// 消费记录流直到收到关闭信号
///
/// 使用 `tokio::select!` 同时监听记录流和关闭信号：
/// - 收到记录时在独立 span 中调用 handler；handler 返回错误只记录日志而不中断循环，
///   无论成功与否都调用 `ack` 确认该记录，坏消息不会被重复投递。
/// - 关闭信号变为 `true` 时退出循环。handler 在分支内被完整 await，
///   因此正在处理的记录总能处理完毕并被确认，之后才会退出。
pub async fn consume_records<S, R, E, F, Fut, A>(
    group_id: &str,
    stream: S,
    mut shutdown: watch::Receiver<bool>,
    handler: F,
    ack: A,
) where
    S: Stream<Item = Result<R, E>>,
    R: InboundRecord,
    E: Display,
    F: Fn(ConsumerMessage) -> Fut,
    Fut: Future<Output = Result<(), HeraldError>>,
    A: Fn(&R),
{
    use tracing_opentelemetry::OpenTelemetrySpanExt;

    if *shutdown.borrow() {
        info!(group_id, "启动前已收到关闭信号，跳过消费循环");
        return;
    }

    futures::pin_mut!(stream);
    info!(group_id, "Kafka 消费循环已启动");

    loop {
        tokio::select! {
            // 偏向关闭信号，保证收到关闭时能尽快退出
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!(group_id, "收到关闭信号，Kafka 消费循环退出");
                    break;
                }
            }

            next = stream.next() => {
                let Some(next) = next else {
                    warn!(group_id, "Kafka 消息流意外结束");
                    break;
                };

                match next {
                    Ok(record) => {
                        let msg = record.to_consumer_message();
                        debug!(
                            topic = %msg.topic,
                            partition = msg.partition,
                            offset = msg.offset,
                            "收到 Kafka 消息"
                        );

                        let span = info_span!(
                            "kafka.record",
                            group_id,
                            topic = %msg.topic,
                            partition = msg.partition,
                            offset = msg.offset,
                        );
                        let parent = observability::tracing::extract_from_headers(&msg.text_headers());
                        if let Err(e) = span.set_parent(parent) {
                            debug!(group_id, error = ?e, "设置追踪父上下文失败");
                        }

                        if let Err(e) = handler(msg).instrument(span).await {
                            error!(group_id, error = %e, code = e.code(), "处理 Kafka 消息失败");
                        }

                        ack(&record);
                    }
                    Err(e) => {
                        error!(group_id, error = %e, "接收 Kafka 消息出错");
                    }
                }
            }
        }
    }
}

/// 已订阅的记录来源
///
/// 消费者通过它驱动消费循环并在关闭时释放订阅。
pub trait RecordSource: Send + Sized {
    fn consume<F, Fut>(
        &self,
        shutdown: watch::Receiver<bool>,
        handler: F,
    ) -> impl Future<Output = ()> + Send
    where
        F: Fn(ConsumerMessage) -> Fut + Send + Sync,
        Fut: Future<Output = Result<(), HeraldError>> + Send;

    fn release(self);
}

impl RecordSource for KafkaConsumer {
    fn consume<F, Fut>(
        &self,
        shutdown: watch::Receiver<bool>,
        handler: F,
    ) -> impl Future<Output = ()> + Send
    where
        F: Fn(ConsumerMessage) -> Fut + Send + Sync,
        Fut: Future<Output = Result<(), HeraldError>> + Send,
    {
        self.start(shutdown, handler)
    }

    fn release(self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------
