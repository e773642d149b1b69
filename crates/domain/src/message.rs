use std::collections::BTreeMap;

use crate::errors::DomainError;
use crate::principal::PrincipalKind;
use crate::value_objects::{MessageBody, MessageId, PrincipalId, RoomId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Image,
    File,
}

/// 房间内的一条消息。
///
/// 落库后除 `read_by`（只增不减）与软删除标记外不可变。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: PrincipalId,
    pub sender_kind: PrincipalKind,
    pub content: MessageBody,
    pub content_type: ContentType,
    pub media_ref: Option<String>,
    pub created_at: Timestamp,
    /// 已读回执：参与者 -> 首次读到的时间，时间戳一旦写入不回滚
    pub read_by: BTreeMap<PrincipalId, Timestamp>,
    #[serde(skip_serializing)] // 删除标记不暴露给客户端
    pub deleted: bool,
}

impl Message {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: MessageId,
        room_id: RoomId,
        sender_id: PrincipalId,
        sender_kind: PrincipalKind,
        content: MessageBody,
        content_type: ContentType,
        media_ref: Option<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            room_id,
            sender_id,
            sender_kind,
            content,
            content_type,
            media_ref,
            created_at,
            read_by: BTreeMap::new(),
            deleted: false,
        }
    }

    /// 记录某个参与者的已读时间。
    ///
    /// 发送者不能给自己的消息打已读；重复调用保留首次时间戳。
    /// 返回本次是否真的写入了新回执。
    pub fn mark_read_by(&mut self, reader: PrincipalId, at: Timestamp) -> Result<bool, DomainError> {
        if reader == self.sender_id {
            return Err(DomainError::OperationNotAllowed);
        }
        if self.read_by.contains_key(&reader) {
            return Ok(false);
        }
        self.read_by.insert(reader, at);
        Ok(true)
    }

    pub fn is_read_by(&self, principal_id: PrincipalId) -> bool {
        self.read_by.contains_key(&principal_id)
    }

    pub fn mark_deleted(&mut self) {
        self.deleted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::PrincipalKind;
    use chrono::Utc;
    use uuid::Uuid;

    fn message(sender: PrincipalId) -> Message {
        Message::new(
            MessageId::new(Uuid::new_v4()),
            RoomId::new(Uuid::new_v4()),
            sender,
            PrincipalKind::Traveler,
            MessageBody::parse("hello").unwrap(),
            ContentType::Text,
            None,
            Utc::now(),
        )
    }

    #[test]
    fn body_rejects_blank_content() {
        assert!(MessageBody::parse("   ").is_err());
        assert!(MessageBody::parse("").is_err());
        assert_eq!(MessageBody::parse("  hi  ").unwrap().as_str(), "hi");
    }

    #[test]
    fn sender_cannot_read_own_message() {
        let sender = PrincipalId::new(Uuid::new_v4());
        let mut msg = message(sender);

        let result = msg.mark_read_by(sender, Utc::now());

        assert_eq!(result.unwrap_err(), DomainError::OperationNotAllowed);
        assert!(msg.read_by.is_empty());
    }

    #[test]
    fn read_timestamp_is_monotonic() {
        let sender = PrincipalId::new(Uuid::new_v4());
        let reader = PrincipalId::new(Uuid::new_v4());
        let mut msg = message(sender);

        let first = Utc::now();
        assert!(msg.mark_read_by(reader, first).unwrap());
        let second = first + chrono::Duration::seconds(30);
        assert!(!msg.mark_read_by(reader, second).unwrap());

        assert_eq!(msg.read_by.get(&reader), Some(&first));
    }
}
