//! 消息模型
//!
//! 定义发送 topic 与撤回 topic 上流转的消息结构，以及渠道、消息类型两组业务枚举。
//! 字段采用 camelCase 命名，与上游生产者的 JSON 格式保持一致。

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ChannelType — 发送渠道
// ---------------------------------------------------------------------------

/// 发送渠道
///
/// `code` 是消息体中 `sendChannel` 字段的取值，`code_en` 用于拼接消费组标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelType {
    Im,
    Push,
    Sms,
    Email,
    OfficialAccount,
    MiniProgram,
    EnterpriseWeChat,
    DingDingRobot,
    DingDingWorkNotice,
    EnterpriseWeChatRobot,
    FeiShuRobot,
    AlipayMiniProgram,
}

impl ChannelType {
    /// 按注册顺序排列的全部渠道
    pub const ALL: [ChannelType; 12] = [
        Self::Im,
        Self::Push,
        Self::Sms,
        Self::Email,
        Self::OfficialAccount,
        Self::MiniProgram,
        Self::EnterpriseWeChat,
        Self::DingDingRobot,
        Self::DingDingWorkNotice,
        Self::EnterpriseWeChatRobot,
        Self::FeiShuRobot,
        Self::AlipayMiniProgram,
    ];

    pub fn code(&self) -> i32 {
        match self {
            Self::Im => 10,
            Self::Push => 20,
            Self::Sms => 30,
            Self::Email => 40,
            Self::OfficialAccount => 50,
            Self::MiniProgram => 60,
            Self::EnterpriseWeChat => 70,
            Self::DingDingRobot => 80,
            Self::DingDingWorkNotice => 90,
            Self::EnterpriseWeChatRobot => 100,
            Self::FeiShuRobot => 110,
            Self::AlipayMiniProgram => 120,
        }
    }

    pub fn code_en(&self) -> &'static str {
        match self {
            Self::Im => "im",
            Self::Push => "push",
            Self::Sms => "sms",
            Self::Email => "email",
            Self::OfficialAccount => "official_account",
            Self::MiniProgram => "mini_program",
            Self::EnterpriseWeChat => "enterprise_we_chat",
            Self::DingDingRobot => "ding_ding_robot",
            Self::DingDingWorkNotice => "ding_ding_work_notice",
            Self::EnterpriseWeChatRobot => "enterprise_we_chat_robot",
            Self::FeiShuRobot => "fei_shu_robot",
            Self::AlipayMiniProgram => "alipay_mini_program",
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

// ---------------------------------------------------------------------------
// MessageType — 消息类型
// ---------------------------------------------------------------------------

/// 消息类型：通知、营销、验证码
///
/// 不同类型的消息在同一渠道内也需要隔离消费，避免营销洪峰拖慢验证码。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Notice,
    Marketing,
    AuthCode,
}

impl MessageType {
    pub const ALL: [MessageType; 3] = [Self::Notice, Self::Marketing, Self::AuthCode];

    pub fn code(&self) -> i32 {
        match self {
            Self::Notice => 10,
            Self::Marketing => 20,
            Self::AuthCode => 30,
        }
    }

    pub fn code_en(&self) -> &'static str {
        match self {
            Self::Notice => "notice",
            Self::Marketing => "marketing",
            Self::AuthCode => "auth_code",
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }
}

// ---------------------------------------------------------------------------
// TaskInfo — 发送任务
// ---------------------------------------------------------------------------

/// 发送任务
///
/// 一条发送 topic 消息解码为 `Vec<TaskInfo>`，同一批次内的任务共享渠道与消息类型。
/// 只有 `sendChannel` 和 `msgType` 是路由所必需的，其余字段原样交给下游业务。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub biz_id: Option<String>,
    #[serde(default)]
    pub message_template_id: i64,
    #[serde(default)]
    pub business_id: i64,
    /// 接收者（手机号、邮箱、openId 等）
    #[serde(default)]
    pub receiver: BTreeSet<String>,
    #[serde(default)]
    pub id_type: i32,
    pub send_channel: i32,
    #[serde(default)]
    pub template_type: i32,
    pub msg_type: i32,
    #[serde(default)]
    pub shield_type: i32,
    /// 渲染后的消息内容，结构因渠道而异
    #[serde(default)]
    pub content_model: serde_json::Value,
    #[serde(default)]
    pub send_account: i64,
}

impl TaskInfo {
    pub fn channel(&self) -> Option<ChannelType> {
        ChannelType::from_code(self.send_channel)
    }

    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_code(self.msg_type)
    }
}

// ---------------------------------------------------------------------------
// RecallRequest — 撤回请求
// ---------------------------------------------------------------------------

/// 消息模板撤回请求
///
/// 所有字段都可缺省，任何 JSON 对象都是合法的撤回请求；
/// 字段用于下游定位需要撤回的已发送消息。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallRequest {
    /// 消息模板 ID
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub send_channel: Option<i32>,
    #[serde(default)]
    pub msg_type: Option<i32>,
    #[serde(default)]
    pub msg_status: Option<i32>,
    #[serde(default)]
    pub msg_content: Option<String>,
    #[serde(default)]
    pub send_account: Option<i64>,
    #[serde(default)]
    pub creator: Option<String>,
    /// 最近更新时间（秒级时间戳）
    #[serde(default)]
    pub updated: Option<i64>,
}
