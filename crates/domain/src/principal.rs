use crate::value_objects::{PrincipalId, Timestamp};

/// 账户类型。旅客与房东在目录里是同一个能力面，仅用标签区分。
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    Traveler,
    Host,
}

/// 连接背后经过认证的身份快照。
///
/// 由用户目录解析得到，消息核心只读不改（唯一的回写是 last_seen_at，
/// 且通过目录接口完成），每个连接在其生命周期内缓存一份。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub kind: PrincipalKind,
    pub display_name: String,
    pub avatar_ref: Option<String>,
    pub last_seen_at: Option<Timestamp>,
}
