use async_trait::async_trait;
use domain::{Message, MessageId, PrincipalId, RepositoryError, Room, RoomId, Timestamp};

/// 房间存储接口。
///
/// `insert` 在有序参与者对的唯一约束上遇到冲突时返回
/// `RepositoryError::Conflict`，调用方应当重新查询而不是报错
/// （并发首次联系时对方先建好了房间）。
#[async_trait]
pub trait RoomRepository: Send + Sync {
    async fn insert(&self, room: Room) -> Result<Room, RepositoryError>;
    async fn find_by_id(&self, id: RoomId) -> Result<Option<Room>, RepositoryError>;
    async fn find_direct(
        &self,
        pair: [PrincipalId; 2],
    ) -> Result<Option<Room>, RepositoryError>;
    /// 按 updated_at 降序返回某个用户参与的全部房间
    async fn list_for_participant(
        &self,
        principal_id: PrincipalId,
    ) -> Result<Vec<Room>, RepositoryError>;
    /// 新消息落库后刷新房间摘要（last_message_id / updated_at）
    async fn record_message(
        &self,
        room_id: RoomId,
        message_id: MessageId,
        at: Timestamp,
    ) -> Result<(), RepositoryError>;
    async fn delete(&self, id: RoomId) -> Result<(), RepositoryError>;
}

/// 消息存储接口。
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, message: Message) -> Result<Message, RepositoryError>;
    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError>;
    /// 按 created_at 降序分页返回未删除消息（page 从 1 开始）。
    /// 存储侧新在前便于分页，展示层负责反转成时间顺序。
    async fn page_desc(
        &self,
        room_id: RoomId,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Message>, RepositoryError>;
    /// 把房间里所有非 reader 发送且 reader 未读的消息标记已读，
    /// 返回本次实际写入的回执数。幂等。
    async fn mark_read(
        &self,
        room_id: RoomId,
        reader: PrincipalId,
        at: Timestamp,
    ) -> Result<u64, RepositoryError>;
    /// 未读数按需计算，不维护计数器
    async fn unread_count(
        &self,
        room_id: RoomId,
        principal_id: PrincipalId,
    ) -> Result<u64, RepositoryError>;
    /// 删除房间时批量清除其全部消息，返回清除条数
    async fn purge_room(&self, room_id: RoomId) -> Result<u64, RepositoryError>;
}
