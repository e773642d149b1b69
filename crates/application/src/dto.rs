use std::collections::BTreeMap;

use domain::{
    ContentType, Message, Principal, PrincipalId, PrincipalKind, Room, RoomId, Timestamp,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 消息里随附的发送者展示字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderSummary {
    pub id: PrincipalId,
    pub kind: PrincipalKind,
    pub name: String,
    pub avatar_ref: Option<String>,
}

impl From<&Principal> for SenderSummary {
    fn from(principal: &Principal) -> Self {
        Self {
            id: principal.id,
            kind: principal.kind,
            name: principal.display_name.clone(),
            avatar_ref: principal.avatar_ref.clone(),
        }
    }
}

impl SenderSummary {
    /// 目录里已经查不到的发送者用占位名兜底
    pub fn unknown(id: PrincipalId, kind: PrincipalKind) -> Self {
        Self {
            id,
            kind,
            name: "Unknown".to_string(),
            avatar_ref: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDto {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender: SenderSummary,
    pub content: String,
    pub content_type: ContentType,
    pub media_ref: Option<String>,
    pub created_at: Timestamp,
    pub read_by: BTreeMap<PrincipalId, Timestamp>,
}

impl MessageDto {
    pub fn new(message: &Message, sender: SenderSummary) -> Self {
        Self {
            id: Uuid::from(message.id),
            room_id: Uuid::from(message.room_id),
            sender,
            content: message.content.as_str().to_owned(),
            content_type: message.content_type,
            media_ref: message.media_ref.clone(),
            created_at: message.created_at,
            read_by: message.read_by.clone(),
        }
    }
}

/// 房间列表/详情里解析出来的参与者视图，读取时现算，不做权威缓存
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantSummary {
    pub id: PrincipalId,
    pub kind: PrincipalKind,
    pub name: String,
    pub avatar_ref: Option<String>,
    pub online: bool,
    pub last_seen: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomDto {
    pub id: RoomId,
    pub is_group: bool,
    pub participants: Vec<ParticipantSummary>,
    pub last_message: Option<MessageDto>,
    pub unread_count: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl RoomDto {
    pub fn new(
        room: &Room,
        participants: Vec<ParticipantSummary>,
        last_message: Option<MessageDto>,
        unread_count: u64,
    ) -> Self {
        Self {
            id: room.id,
            is_group: room.is_group,
            participants,
            last_message,
            unread_count,
            created_at: room.created_at,
            updated_at: room.updated_at,
        }
    }
}
