use std::collections::HashMap;
use std::sync::Arc;

use domain::{
    ConnectionId, ContentType, DomainError, Message, MessageBody, MessageId, Principal,
    PrincipalId, RoomId,
};
use uuid::Uuid;

use crate::{
    broadcaster::EventBroadcaster,
    clock::Clock,
    directory::UserDirectory,
    dto::{MessageDto, SenderSummary},
    error::ApplicationError,
    events::{RoomSummary, ServerEvent},
    repository::{MessageRepository, RoomRepository},
    sequencer::RoomSequencer,
};

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub room_id: RoomId,
    /// 发送连接上缓存的身份快照（连接级认证的产物）
    pub sender: Principal,
    pub connection_id: ConnectionId,
    pub content: String,
    pub content_type: ContentType,
    pub media_ref: Option<String>,
}

pub struct MessageServiceDependencies {
    pub room_repository: Arc<dyn RoomRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub directory: Arc<dyn UserDirectory>,
    pub broadcaster: Arc<dyn EventBroadcaster>,
    pub sequencer: Arc<RoomSequencer>,
    pub clock: Arc<dyn Clock>,
}

/// 消息管道与已读状态跟踪。
pub struct MessageService {
    deps: MessageServiceDependencies,
}

impl MessageService {
    pub fn new(deps: MessageServiceDependencies) -> Self {
        Self { deps }
    }

    /// 校验、落库、刷新房间摘要，然后交给扇出广播。
    ///
    /// 落库成功前不会有任何广播；落库失败只回给发送方，由客户端
    /// 决定是否重试。确认（message-sent）先于对端投递发出，发送方
    /// 不等待对端。
    pub async fn send(&self, request: SendMessageRequest) -> Result<MessageDto, ApplicationError> {
        // 成员资格以存储里的最新房间为准，不信任连接本地的 join 缓存
        let room = self
            .deps
            .room_repository
            .find_by_id(request.room_id)
            .await?
            .ok_or(DomainError::RoomNotFound)?;
        if !room.is_participant(request.sender.id) {
            return Err(DomainError::NotAParticipant.into());
        }
        let content = MessageBody::parse(request.content)?;

        // 同一房间内落库和广播的决定是一个逻辑步骤，时间戳分配即全序
        let _guard = self.deps.sequencer.acquire(room.id).await;

        let now = self.deps.clock.now();
        let message = Message::new(
            MessageId::new(Uuid::new_v4()),
            room.id,
            request.sender.id,
            request.sender.kind,
            content,
            request.content_type,
            request.media_ref,
            now,
        );
        let stored = self.deps.message_repository.insert(message).await?;
        self.deps
            .room_repository
            .record_message(room.id, stored.id, now)
            .await?;

        let dto = MessageDto::new(&stored, SenderSummary::from(&request.sender));

        if let Err(err) = self
            .deps
            .broadcaster
            .send_to_connection(
                request.connection_id,
                ServerEvent::MessageSent {
                    message: dto.clone(),
                },
            )
            .await
        {
            tracing::warn!(
                connection_id = %request.connection_id,
                error = %err,
                "failed to deliver send acknowledgement"
            );
        }

        let others: Vec<PrincipalId> = room
            .participants
            .iter()
            .copied()
            .filter(|p| *p != request.sender.id)
            .collect();

        // 房间频道 ∪ 其他参与者私有频道；离线参与者之后靠历史拉取补齐
        if let Err(err) = self
            .deps
            .broadcaster
            .fan_out(
                room.id,
                &others,
                Some(request.connection_id),
                ServerEvent::ReceiveMessage {
                    message: dto.clone(),
                },
            )
            .await
        {
            tracing::warn!(room_id = %room.id, error = %err, "message fan-out failed");
        }

        let summary = RoomSummary {
            id: room.id,
            is_group: room.is_group,
            participant_ids: room.participants,
            last_message: dto.clone(),
            updated_at: now,
        };
        for other in &others {
            if let Err(err) = self
                .deps
                .broadcaster
                .send_to_principal(
                    *other,
                    ServerEvent::RoomUpdated {
                        room: summary.clone(),
                    },
                )
                .await
            {
                tracing::debug!(principal_id = %other, error = %err, "room summary push skipped");
            }
        }

        Ok(dto)
    }

    /// 分页历史。存储按新在前取页再反转，调用方总是拿到时间顺序。
    /// 拉取历史即视为已读（不额外广播回执事件）。
    pub async fn history(
        &self,
        room_id: RoomId,
        requester: PrincipalId,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<MessageDto>, ApplicationError> {
        let room = self
            .deps
            .room_repository
            .find_by_id(room_id)
            .await?
            .ok_or(DomainError::RoomNotFound)?;
        if !room.is_participant(requester) {
            return Err(DomainError::NotAParticipant.into());
        }

        let rows = self
            .deps
            .message_repository
            .page_desc(room_id, page.max(1), page_size)
            .await?;

        let mut senders: HashMap<PrincipalId, SenderSummary> = HashMap::new();
        let mut dtos = Vec::with_capacity(rows.len());
        for message in rows.iter().rev() {
            let sender = match senders.get(&message.sender_id) {
                Some(known) => known.clone(),
                None => {
                    let resolved = match self.deps.directory.resolve(message.sender_id).await? {
                        Some(principal) => SenderSummary::from(&principal),
                        None => SenderSummary::unknown(message.sender_id, message.sender_kind),
                    };
                    senders.insert(message.sender_id, resolved.clone());
                    resolved
                }
            };
            dtos.push(MessageDto::new(message, sender));
        }

        let now = self.deps.clock.now();
        let marked = self
            .deps
            .message_repository
            .mark_read(room_id, requester, now)
            .await?;
        if marked > 0 {
            tracing::debug!(room_id = %room_id, reader = %requester, marked, "history fetch marked messages read");
        }

        Ok(dtos)
    }

    /// 把房间里其他人发的消息全部标记已读。幂等；无论本次是否有
    /// 新回执，都向房间频道发一条 messages-read（整房一条，不逐消息）。
    pub async fn mark_read(
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

        let now = self.deps.clock.now();
        let marked = self
            .deps
            .message_repository
            .mark_read(room_id, requester, now)
            .await?;
        tracing::debug!(room_id = %room_id, reader = %requester, marked, "messages marked read");

        if let Err(err) = self
            .deps
            .broadcaster
            .send_to_room(
                room_id,
                None,
                ServerEvent::MessagesRead {
                    room_id,
                    reader_id: requester,
                    read_at: now,
                },
            )
            .await
        {
            tracing::debug!(room_id = %room_id, error = %err, "read receipt push skipped");
        }

        Ok(())
    }
}
