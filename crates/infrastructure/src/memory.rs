//! 内存实现的存储与目录（用于测试）

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use application::{DirectoryError, MessageRepository, RoomRepository, UserDirectory};
use domain::{
    Message, MessageId, Principal, PrincipalId, RepositoryError, Room, RoomId, Timestamp,
};

#[derive(Default)]
pub struct MemoryRoomRepository {
    rooms: RwLock<HashMap<RoomId, Room>>,
}

impl MemoryRoomRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomRepository for MemoryRoomRepository {
    async fn insert(&self, room: Room) -> Result<Room, RepositoryError> {
        let mut rooms = self.rooms.write().await;
        // 模拟有序对上的唯一约束
        let duplicate = !room.is_group
            && rooms
                .values()
                .any(|existing| !existing.is_group && existing.participants == room.participants);
        if duplicate || rooms.contains_key(&room.id) {
            return Err(RepositoryError::Conflict);
        }
        rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn find_by_id(&self, id: RoomId) -> Result<Option<Room>, RepositoryError> {
        Ok(self.rooms.read().await.get(&id).cloned())
    }

    async fn find_direct(
        &self,
        pair: [PrincipalId; 2],
    ) -> Result<Option<Room>, RepositoryError> {
        Ok(self
            .rooms
            .read()
            .await
            .values()
            .find(|room| !room.is_group && room.participants == pair)
            .cloned())
    }

    async fn list_for_participant(
        &self,
        principal_id: PrincipalId,
    ) -> Result<Vec<Room>, RepositoryError> {
        let mut rooms: Vec<Room> = self
            .rooms
            .read()
            .await
            .values()
            .filter(|room| room.is_participant(principal_id))
            .cloned()
            .collect();
        rooms.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(rooms)
    }

    async fn record_message(
        &self,
        room_id: RoomId,
        message_id: MessageId,
        at: Timestamp,
    ) -> Result<(), RepositoryError> {
        if let Some(room) = self.rooms.write().await.get_mut(&room_id) {
            room.record_message(message_id, at);
        }
        Ok(())
    }

    async fn delete(&self, id: RoomId) -> Result<(), RepositoryError> {
        self.rooms.write().await.remove(&id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryMessageRepository {
    // 插入顺序保存；时钟单调时等价于 created_at 顺序
    messages: RwLock<Vec<Message>>,
}

impl MemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageRepository for MemoryMessageRepository {
    async fn insert(&self, message: Message) -> Result<Message, RepositoryError> {
        let mut messages = self.messages.write().await;
        if messages.iter().any(|m| m.id == message.id) {
            return Err(RepositoryError::Conflict);
        }
        messages.push(message.clone());
        Ok(message)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        Ok(self
            .messages
            .read()
            .await
            .iter()
            .find(|m| m.id == id)
            .cloned())
    }

    async fn page_desc(
        &self,
        room_id: RoomId,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        let skip = (page.max(1) - 1) as usize * page_size as usize;
        Ok(messages
            .iter()
            .rev()
            .filter(|m| m.room_id == room_id && !m.deleted)
            .skip(skip)
            .take(page_size as usize)
            .cloned()
            .collect())
    }

    async fn mark_read(
        &self,
        room_id: RoomId,
        reader: PrincipalId,
        at: Timestamp,
    ) -> Result<u64, RepositoryError> {
        let mut messages = self.messages.write().await;
        let mut marked = 0;
        for message in messages
            .iter_mut()
            .filter(|m| m.room_id == room_id && !m.deleted && m.sender_id != reader)
        {
            if message.mark_read_by(reader, at).unwrap_or(false) {
                marked += 1;
            }
        }
        Ok(marked)
    }

    async fn unread_count(
        &self,
        room_id: RoomId,
        principal_id: PrincipalId,
    ) -> Result<u64, RepositoryError> {
        Ok(self
            .messages
            .read()
            .await
            .iter()
            .filter(|m| {
                m.room_id == room_id
                    && !m.deleted
                    && m.sender_id != principal_id
                    && !m.is_read_by(principal_id)
            })
            .count() as u64)
    }

    async fn purge_room(&self, room_id: RoomId) -> Result<u64, RepositoryError> {
        let mut messages = self.messages.write().await;
        let before = messages.len();
        messages.retain(|m| m.room_id != room_id);
        Ok((before - messages.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryUserDirectory {
    principals: RwLock<HashMap<PrincipalId, Principal>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 测试播种
    pub async fn upsert(&self, principal: Principal) {
        self.principals
            .write()
            .await
            .insert(principal.id, principal);
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn resolve(&self, id: PrincipalId) -> Result<Option<Principal>, DirectoryError> {
        Ok(self.principals.read().await.get(&id).cloned())
    }

    async fn search(
        &self,
        term: &str,
        exclude: PrincipalId,
        limit: u32,
    ) -> Result<Vec<Principal>, DirectoryError> {
        let needle = term.to_lowercase();
        let principals = self.principals.read().await;
        let mut found: Vec<Principal> = principals
            .values()
            .filter(|p| p.id != exclude && p.display_name.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        found.truncate(limit as usize);
        Ok(found)
    }

    async fn record_last_seen(
        &self,
        id: PrincipalId,
        at: Timestamp,
    ) -> Result<(), DirectoryError> {
        if let Some(principal) = self.principals.write().await.get_mut(&id) {
            principal.last_seen_at = Some(at);
        }
        Ok(())
    }
}
