use crate::errors::DomainError;
use crate::value_objects::{MessageId, PrincipalId, RoomId, Timestamp};

/// 双人会话房间。
///
/// 参与者对在创建时排序固定，之后不可变；同一无序对最多只存在一个
/// 非群组房间（由存储层在有序对上的唯一约束兜底）。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Room {
    pub id: RoomId,
    /// 升序排列的参与者对
    pub participants: [PrincipalId; 2],
    /// 群组房间是预留的扩展点，当前始终为 false
    pub is_group: bool,
    pub last_message_id: Option<MessageId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Room {
    /// 创建双人直聊房间，参与者对按稳定顺序（UUID 字典序）归一化。
    pub fn direct(
        id: RoomId,
        a: PrincipalId,
        b: PrincipalId,
        created_at: Timestamp,
    ) -> Result<Self, DomainError> {
        if a == b {
            return Err(DomainError::SelfConversation);
        }
        let participants = Self::sorted_pair(a, b);
        Ok(Self {
            id,
            participants,
            is_group: false,
            last_message_id: None,
            created_at,
            updated_at: created_at,
        })
    }

    /// 参与者对的归一化顺序，存储层的唯一约束建立在这个顺序上。
    pub fn sorted_pair(a: PrincipalId, b: PrincipalId) -> [PrincipalId; 2] {
        if a <= b {
            [a, b]
        } else {
            [b, a]
        }
    }

    pub fn is_participant(&self, principal_id: PrincipalId) -> bool {
        self.participants.contains(&principal_id)
    }

    /// 双人房间里另一侧的参与者。
    pub fn other_participant(&self, principal_id: PrincipalId) -> Option<PrincipalId> {
        if !self.is_participant(principal_id) {
            return None;
        }
        self.participants
            .iter()
            .copied()
            .find(|p| *p != principal_id)
    }

    /// 新消息落库后由消息管道调用，刷新房间摘要。
    pub fn record_message(&mut self, message_id: MessageId, now: Timestamp) {
        self.last_message_id = Some(message_id);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn pid(n: u128) -> PrincipalId {
        PrincipalId::new(Uuid::from_u128(n))
    }

    #[test]
    fn direct_room_sorts_participants_either_way() {
        let now = Utc::now();
        let low = pid(1);
        let high = pid(2);

        let forward = Room::direct(RoomId::new(Uuid::new_v4()), low, high, now).unwrap();
        let reverse = Room::direct(RoomId::new(Uuid::new_v4()), high, low, now).unwrap();

        assert_eq!(forward.participants, [low, high]);
        assert_eq!(forward.participants, reverse.participants);
    }

    #[test]
    fn direct_room_rejects_self_conversation() {
        let now = Utc::now();
        let me = pid(7);

        let result = Room::direct(RoomId::new(Uuid::new_v4()), me, me, now);

        assert_eq!(result.unwrap_err(), DomainError::SelfConversation);
    }

    #[test]
    fn other_participant_resolves_for_members_only() {
        let now = Utc::now();
        let a = pid(1);
        let b = pid(2);
        let stranger = pid(3);
        let room = Room::direct(RoomId::new(Uuid::new_v4()), a, b, now).unwrap();

        assert_eq!(room.other_participant(a), Some(b));
        assert_eq!(room.other_participant(b), Some(a));
        assert_eq!(room.other_participant(stranger), None);
    }

    #[test]
    fn record_message_updates_summary() {
        let now = Utc::now();
        let mut room = Room::direct(RoomId::new(Uuid::new_v4()), pid(1), pid(2), now).unwrap();
        let message_id = MessageId::new(Uuid::new_v4());
        let later = now + chrono::Duration::seconds(5);

        room.record_message(message_id, later);

        assert_eq!(room.last_message_id, Some(message_id));
        assert_eq!(room.updated_at, later);
    }
}
