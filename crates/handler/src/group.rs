//! 消费组标识、分组映射与分组注册表
//!
//! 消费组标识既是 Kafka 的 `group.id`，也是与消息负载比对的路由键。
//! 注册表在启动时从分组映射读取一次，之后只读。

use std::collections::HashSet;
use std::fmt;

use herald_shared::message::{ChannelType, MessageType, TaskInfo};

use crate::error::HandlerError;

// ---------------------------------------------------------------------------
// GroupId
// ---------------------------------------------------------------------------

/// 消费组标识
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// ---------------------------------------------------------------------------
// GroupIdMapping
// ---------------------------------------------------------------------------

/// 分组映射
///
/// 必须是纯函数：同一个任务总是映射到同一个分组，
/// 这是"每批任务最多被一个消费者转发"的前提。
pub trait GroupIdMapping: Send + Sync {
    /// 任务所属的消费组；无法识别渠道或消息类型时返回 `None`
    fn group_id_of(&self, task: &TaskInfo) -> Option<GroupId>;

    /// 全部消费组，顺序即注册顺序
    fn all_group_ids(&self) -> Vec<GroupId>;
}

/// 按"渠道.消息类型"划分消费组
///
/// 每个渠道的每种消息类型独占一个消费组，例如 `sms.notice`、`email.marketing`。
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelGroupMapping;

impl ChannelGroupMapping {
    pub fn group_id(channel: ChannelType, msg_type: MessageType) -> GroupId {
        GroupId(format!("{}.{}", channel.code_en(), msg_type.code_en()))
    }
}

impl GroupIdMapping for ChannelGroupMapping {
    fn group_id_of(&self, task: &TaskInfo) -> Option<GroupId> {
        Some(Self::group_id(task.channel()?, task.message_type()?))
    }

    fn all_group_ids(&self) -> Vec<GroupId> {
        ChannelType::ALL
            .into_iter()
            .flat_map(|channel| {
                MessageType::ALL
                    .into_iter()
                    .map(move |msg_type| Self::group_id(channel, msg_type))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// GroupBinding
// ---------------------------------------------------------------------------

/// 消费者与消费组的绑定
///
/// 只能由 [`GroupRegistry::bindings`] 产生：第 `index` 个绑定对应注册表第 `index` 项，
/// 创建消费者时显式传入，不依赖任何共享计数器。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBinding {
    index: usize,
    group_id: GroupId,
}

impl GroupBinding {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn group_id(&self) -> &GroupId {
        &self.group_id
    }
}

// ---------------------------------------------------------------------------
// GroupRegistry
// ---------------------------------------------------------------------------

/// 分组注册表
///
/// 进程生命周期内不可变，读取无需加锁。
#[derive(Debug, Clone)]
pub struct GroupRegistry {
    groups: Vec<GroupId>,
}

impl GroupRegistry {
    /// 以给定顺序构建注册表，拒绝空表与重复标识
    pub fn new(groups: Vec<GroupId>) -> Result<Self, HandlerError> {
        if groups.is_empty() {
            return Err(HandlerError::EmptyRegistry);
        }

        let mut seen = HashSet::with_capacity(groups.len());
        for group in &groups {
            if !seen.insert(group) {
                return Err(HandlerError::DuplicateGroup {
                    group_id: group.to_string(),
                });
            }
        }

        Ok(Self { groups })
    }

    /// 从分组映射读取全部消费组
    pub fn from_mapping(mapping: &dyn GroupIdMapping) -> Result<Self, HandlerError> {
        Self::new(mapping.all_group_ids())
    }

    pub fn list(&self) -> &[GroupId] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroupId> {
        self.groups.iter()
    }

    pub fn contains(&self, group_id: &GroupId) -> bool {
        self.groups.contains(group_id)
    }

    /// 按注册顺序产生绑定
    pub fn bindings(&self) -> impl Iterator<Item = GroupBinding> + '_ {
        self.groups
            .iter()
            .enumerate()
            .map(|(index, group_id)| GroupBinding {
                index,
                group_id: group_id.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(send_channel: i32, msg_type: i32) -> TaskInfo {
        serde_json::from_value(serde_json::json!({
            "sendChannel": send_channel,
            "msgType": msg_type,
        }))
        .unwrap()
    }

    #[test]
    fn test_group_id_of_task() {
        let mapping = ChannelGroupMapping;

        assert_eq!(
            mapping.group_id_of(&task(30, 10)),
            Some(GroupId::from("sms.notice"))
        );
        assert_eq!(
            mapping.group_id_of(&task(40, 20)),
            Some(GroupId::from("email.marketing"))
        );
    }

    #[test]
    fn test_group_id_of_unknown_codes() {
        let mapping = ChannelGroupMapping;

        assert!(mapping.group_id_of(&task(999, 10)).is_none());
        assert!(mapping.group_id_of(&task(30, 999)).is_none());
    }

    #[test]
    fn test_all_group_ids_cover_every_combination() {
        let groups = ChannelGroupMapping.all_group_ids();

        assert_eq!(groups.len(), ChannelType::ALL.len() * MessageType::ALL.len());
        assert_eq!(groups[0], GroupId::from("im.notice"));
        assert_eq!(groups[1], GroupId::from("im.marketing"));
        assert_eq!(groups[3], GroupId::from("push.notice"));

        // 每个任务映射到的分组都在全集里
        for channel in ChannelType::ALL {
            for msg_type in MessageType::ALL {
                let id = ChannelGroupMapping
                    .group_id_of(&task(channel.code(), msg_type.code()))
                    .unwrap();
                assert!(groups.contains(&id));
            }
        }
    }

    #[test]
    fn test_registry_from_mapping() {
        let registry = GroupRegistry::from_mapping(&ChannelGroupMapping).unwrap();

        assert_eq!(registry.len(), 36);
        assert!(!registry.is_empty());
        assert!(registry.contains(&GroupId::from("fei_shu_robot.auth_code")));
        // 多次读取结果一致
        assert_eq!(registry.list(), registry.list());
    }

    #[test]
    fn test_registry_rejects_empty() {
        let err = GroupRegistry::new(Vec::new()).unwrap_err();
        assert!(matches!(err, HandlerError::EmptyRegistry));
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let err = GroupRegistry::new(vec!["A".into(), "B".into(), "A".into()]).unwrap_err();
        match err {
            HandlerError::DuplicateGroup { group_id } => assert_eq!(group_id, "A"),
            other => panic!("期望 DuplicateGroup，实际 {other:?}"),
        }
    }

    #[test]
    fn test_bindings_follow_registration_order() {
        let registry = GroupRegistry::new(vec!["A".into(), "B".into(), "C".into()]).unwrap();

        let bindings: Vec<GroupBinding> = registry.bindings().collect();
        assert_eq!(bindings.len(), 3);
        for (i, binding) in bindings.iter().enumerate() {
            assert_eq!(binding.index(), i);
            assert_eq!(binding.group_id(), &registry.list()[i]);
        }
    }
}
