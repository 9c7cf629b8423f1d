//! 单条消息的分发流程
//!
//! 分组消费者的每条消息依次经过：
//! 标签过滤 -> 解码为任务批次 -> 取首个任务计算所属分组 -> 与自身绑定分组比对 -> 转发。
//! 任何一步失败都只影响当前消息，结果以 [`Dispatch`] 返回，由消费循环统一确认。

use std::sync::Arc;
use std::time::Instant;

use herald_shared::kafka::ConsumerMessage;
use herald_shared::message::TaskInfo;
use herald_shared::observability::metrics;
use tracing::{debug, error, info, trace, warn};

use crate::filter::TagFilter;
use crate::group::{GroupId, GroupIdMapping};
use crate::sink::ConsumeService;

/// 单条消息的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// 被标签过滤丢弃，未解码
    Filtered,
    /// 负载为空、非 UTF-8 或 JSON 解码失败
    Malformed,
    /// 批次为空或无法计算所属分组
    Unroutable,
    /// 属于其他分组，静默丢弃
    Mismatched,
    /// 已交给业务处理方
    Forwarded,
    /// 已交给业务处理方，但处理方返回错误
    SinkFailed,
}

impl Dispatch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Filtered => "filtered",
            Self::Malformed => "malformed",
            Self::Unroutable => "unroutable",
            Self::Mismatched => "mismatched",
            Self::Forwarded => "forwarded",
            Self::SinkFailed => "sink_failed",
        }
    }

    /// 业务处理方是否被调用过
    pub fn reached_sink(&self) -> bool {
        matches!(self, Self::Forwarded | Self::SinkFailed)
    }
}

/// 分组路由器
///
/// 持有绑定分组、标签过滤器、分组映射和业务处理方。
/// 克隆成本只是几个 `Arc`。
#[derive(Clone)]
pub struct GroupRouter {
    group_id: GroupId,
    filter: TagFilter,
    mapping: Arc<dyn GroupIdMapping>,
    sink: Arc<dyn ConsumeService>,
}

impl GroupRouter {
    pub fn new(
        group_id: GroupId,
        filter: TagFilter,
        mapping: Arc<dyn GroupIdMapping>,
        sink: Arc<dyn ConsumeService>,
    ) -> Self {
        Self {
            group_id,
            filter,
            mapping,
            sink,
        }
    }

    pub fn group_id(&self) -> &GroupId {
        &self.group_id
    }

    /// 处理一条消息并记录指标
    pub async fn dispatch(&self, msg: &ConsumerMessage) -> Dispatch {
        let started = Instant::now();
        let outcome = self.route(msg).await;

        metrics::record_outcome(
            "group",
            self.group_id.as_str(),
            outcome.as_str(),
            started.elapsed().as_secs_f64(),
        );
        outcome
    }

    async fn route(&self, msg: &ConsumerMessage) -> Dispatch {
        if self.filter.should_discard(msg) {
            debug!(group_id = %self.group_id, offset = msg.offset, "消息被标签过滤，确认并丢弃");
            return Dispatch::Filtered;
        }

        let tasks: Vec<TaskInfo> = match msg.deserialize_payload() {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(
                    group_id = %self.group_id,
                    partition = msg.partition,
                    offset = msg.offset,
                    error = %e,
                    "任务批次解码失败，确认并丢弃"
                );
                return Dispatch::Malformed;
            }
        };

        let Some(first) = tasks.first() else {
            warn!(group_id = %self.group_id, offset = msg.offset, "任务批次为空，确认并丢弃");
            return Dispatch::Unroutable;
        };

        let Some(declared) = self.mapping.group_id_of(first) else {
            warn!(
                group_id = %self.group_id,
                offset = msg.offset,
                send_channel = first.send_channel,
                msg_type = first.msg_type,
                "无法识别任务所属分组，确认并丢弃"
            );
            return Dispatch::Unroutable;
        };

        if declared != self.group_id {
            trace!(group_id = %self.group_id, declared = %declared, "任务属于其他分组");
            return Dispatch::Mismatched;
        }

        let task_count = tasks.len();
        match self.sink.consume_to_send(tasks).await {
            Ok(()) => {
                info!(group_id = %self.group_id, task_count, "任务批次已转发");
                Dispatch::Forwarded
            }
            Err(e) => {
                error!(
                    group_id = %self.group_id,
                    task_count,
                    offset = msg.offset,
                    error = %e,
                    "业务处理方处理任务批次失败"
                );
                Dispatch::SinkFailed
            }
        }
    }
}
