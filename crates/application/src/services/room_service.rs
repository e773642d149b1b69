use std::sync::Arc;

use domain::{
    DomainError, Principal, PrincipalId, PrincipalKind, RepositoryError, Room, RoomId,
};
use uuid::Uuid;

use crate::{
    clock::Clock,
    directory::UserDirectory,
    dto::{MessageDto, ParticipantSummary, RoomDto, SenderSummary},
    error::ApplicationError,
    presence::PresenceRegistry,
    repository::{MessageRepository, RoomRepository},
};

pub struct RoomServiceDependencies {
    pub room_repository: Arc<dyn RoomRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub directory: Arc<dyn UserDirectory>,
    pub presence: Arc<PresenceRegistry>,
    pub clock: Arc<dyn Clock>,
}

/// 房间目录：双人房间的解析/懒创建、会话列表、删除。
pub struct RoomService {
    deps: RoomServiceDependencies,
}

impl RoomService {
    pub fn new(deps: RoomServiceDependencies) -> Self {
        Self { deps }
    }

    /// 按无序参与者对解析直聊房间，不存在则创建。
    ///
    /// 并发的双向首次联系依赖存储层唯一约束收敛：插入冲突说明
    /// 对方先建好了，重新查询取回同一个房间。
    pub async fn get_or_create(
        &self,
        requester: PrincipalId,
        other: PrincipalId,
    ) -> Result<RoomDto, ApplicationError> {
        if requester == other {
            return Err(DomainError::SelfConversation.into());
        }
        // 确认对方在目录里存在
        self.deps
            .directory
            .resolve(other)
            .await?
            .ok_or(DomainError::PrincipalNotFound)?;

        let pair = Room::sorted_pair(requester, other);
        let room = match self.deps.room_repository.find_direct(pair).await? {
            Some(existing) => existing,
            None => {
                let now = self.deps.clock.now();
                let candidate = Room::direct(RoomId::new(Uuid::new_v4()), requester, other, now)?;
                match self.deps.room_repository.insert(candidate).await {
                    Ok(created) => {
                        tracing::info!(room_id = %created.id, "created direct room");
                        created
                    }
                    Err(RepositoryError::Conflict) => self
                        .deps
                        .room_repository
                        .find_direct(pair)
                        .await?
                        .ok_or(DomainError::RoomNotFound)?,
                    Err(err) => return Err(err.into()),
                }
            }
        };

        self.room_view(&room, requester).await
    }

    /// 请求者参与的全部房间，按最近活跃排序，带未读数和参与者视图。
    pub async fn list_for_principal(
        &self,
        principal_id: PrincipalId,
    ) -> Result<Vec<RoomDto>, ApplicationError> {
        let rooms = self
            .deps
            .room_repository
            .list_for_participant(principal_id)
            .await?;

        let mut views = Vec::with_capacity(rooms.len());
        for room in &rooms {
            views.push(self.room_view(room, principal_id).await?);
        }
        Ok(views)
    }

    /// 删除房间并级联清除其消息。只有参与者可以删。
    pub async fn delete(
        &self,
        room_id: RoomId,
        requester: PrincipalId,
    ) -> Result<(), ApplicationError> {
        let room = self
            .deps
            .room_repository
            .find_by_id(room_id)
            .await?
            .ok_or(DomainError::RoomNotFound)?;
        if !room.is_participant(requester) {
            return Err(DomainError::NotAParticipant.into());
        }

        let purged = self.deps.message_repository.purge_room(room_id).await?;
        self.deps.room_repository.delete(room_id).await?;

        tracing::info!(room_id = %room_id, purged, "room deleted with its messages");
        Ok(())
    }

    /// 成员校验，查存储里的最新状态而不是连接本地缓存。
    /// 长连接 join-room 进入房间频道前必须通过这里。
    pub async fn ensure_participant(
        &self,
        room_id: RoomId,
        principal_id: PrincipalId,
    ) -> Result<Room, ApplicationError> {
        let room = self
            .deps
            .room_repository
            .find_by_id(room_id)
            .await?
            .ok_or(DomainError::RoomNotFound)?;
        if !room.is_participant(principal_id) {
            return Err(DomainError::NotAParticipant.into());
        }
        Ok(room)
    }

    /// 发起新会话前的用户搜索。少于两个字符直接返回空，结果排除
    /// 请求者自己，最多 20 条。
    pub async fn search_users(
        &self,
        term: &str,
        requester: PrincipalId,
    ) -> Result<Vec<ParticipantSummary>, ApplicationError> {
        let trimmed = term.trim();
        if trimmed.chars().count() < 2 {
            return Ok(Vec::new());
        }
        let found = self.deps.directory.search(trimmed, requester, 20).await?;
        Ok(found
            .iter()
            .map(|principal| self.participant_summary(principal))
            .collect())
    }

    fn participant_summary(&self, principal: &Principal) -> ParticipantSummary {
        ParticipantSummary {
            id: principal.id,
            kind: principal.kind,
            name: principal.display_name.clone(),
            avatar_ref: principal.avatar_ref.clone(),
            online: self.deps.presence.is_online(principal.id),
            last_seen: principal.last_seen_at,
        }
    }

    /// 反规范化的房间视图：参与者档案、在线标记、未读数、末条消息。
    /// 全部读取时现算，不做权威缓存。
    async fn room_view(
        &self,
        room: &Room,
        viewer: PrincipalId,
    ) -> Result<RoomDto, ApplicationError> {
        let mut participants = Vec::with_capacity(room.participants.len());
        for pid in room.participants {
            match self.deps.directory.resolve(pid).await? {
                Some(principal) => participants.push(self.participant_summary(&principal)),
                // 目录里已经查不到的账号用占位档案兜底
                None => participants.push(ParticipantSummary {
                    id: pid,
                    kind: PrincipalKind::Traveler,
                    name: "Unknown".to_string(),
                    avatar_ref: None,
                    online: self.deps.presence.is_online(pid),
                    last_seen: None,
                }),
            }
        }

        let unread_count = self
            .deps
            .message_repository
            .unread_count(room.id, viewer)
            .await?;

        let last_message = match room.last_message_id {
            Some(message_id) => match self.deps.message_repository.find_by_id(message_id).await? {
                Some(message) => {
                    let sender = match self.deps.directory.resolve(message.sender_id).await? {
                        Some(principal) => SenderSummary::from(&principal),
                        None => SenderSummary::unknown(message.sender_id, message.sender_kind),
                    };
                    Some(MessageDto::new(&message, sender))
                }
                None => None,
            },
            None => None,
        };

        Ok(RoomDto::new(room, participants, last_message, unread_count))
    }
}
