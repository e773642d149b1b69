use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};
use uuid::Uuid;

use application::MessageRepository;
use domain::{
    ContentType, Message, MessageBody, MessageId, PrincipalId, RepositoryError, RoomId, Timestamp,
};

use super::{kind_from_str, kind_to_str, map_sqlx_error};

/// 数据库消息模型，已读回执在 message_reads 侧表
#[derive(Debug, Clone, FromRow)]
struct DbMessage {
    id: Uuid,
    room_id: Uuid,
    sender_id: Uuid,
    sender_kind: String,
    content: String,
    content_type: String,
    media_ref: Option<String>,
    deleted: bool,
    created_at: DateTime<Utc>,
}

fn content_type_to_str(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Text => "text",
        ContentType::Image => "image",
        ContentType::File => "file",
    }
}

fn content_type_from_str(value: &str) -> ContentType {
    match value {
        "image" => ContentType::Image,
        "file" => ContentType::File,
        _ => ContentType::Text,
    }
}

impl DbMessage {
    fn into_message(
        self,
        read_by: BTreeMap<PrincipalId, Timestamp>,
    ) -> Result<Message, RepositoryError> {
        let content = MessageBody::parse(self.content)
            .map_err(|err| RepositoryError::storage(format!("corrupt message row: {err}")))?;
        Ok(Message {
            id: MessageId::new(self.id),
            room_id: RoomId::new(self.room_id),
            sender_id: PrincipalId::new(self.sender_id),
            sender_kind: kind_from_str(&self.sender_kind),
            content,
            content_type: content_type_from_str(&self.content_type),
            media_ref: self.media_ref,
            created_at: self.created_at,
            read_by,
            deleted: self.deleted,
        })
    }
}

pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 取一批消息的已读回执，按消息分组
    async fn load_reads(
        &self,
        message_ids: &[Uuid],
    ) -> Result<BTreeMap<Uuid, BTreeMap<PrincipalId, Timestamp>>, RepositoryError> {
        if message_ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT message_id, principal_id, read_at
            FROM message_reads
            WHERE message_id = ANY($1)
            "#,
        )
        .bind(message_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut grouped: BTreeMap<Uuid, BTreeMap<PrincipalId, Timestamp>> = BTreeMap::new();
        for row in rows {
            let message_id: Uuid = row.try_get("message_id").map_err(map_sqlx_error)?;
            let principal_id: Uuid = row.try_get("principal_id").map_err(map_sqlx_error)?;
            let read_at: DateTime<Utc> = row.try_get("read_at").map_err(map_sqlx_error)?;
            grouped
                .entry(message_id)
                .or_default()
                .insert(PrincipalId::new(principal_id), read_at);
        }
        Ok(grouped)
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn insert(&self, message: Message) -> Result<Message, RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, room_id, sender_id, sender_kind, content, content_type, media_ref, deleted, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.room_id))
        .bind(Uuid::from(message.sender_id))
        .bind(kind_to_str(message.sender_kind))
        .bind(message.content.as_str())
        .bind(content_type_to_str(message.content_type))
        .bind(message.media_ref.as_deref())
        .bind(message.deleted)
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(message)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        let row: Option<DbMessage> = sqlx::query_as(
            r#"
            SELECT id, room_id, sender_id, sender_kind, content, content_type, media_ref, deleted, created_at
            FROM messages
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => {
                let reads = self.load_reads(&[row.id]).await?;
                let read_by = reads.get(&row.id).cloned().unwrap_or_default();
                Ok(Some(row.into_message(read_by)?))
            }
            None => Ok(None),
        }
    }

    async fn page_desc(
        &self,
        room_id: RoomId,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let offset = i64::from(page.saturating_sub(1)) * i64::from(page_size);
        let rows: Vec<DbMessage> = sqlx::query_as(
            r#"
            SELECT id, room_id, sender_id, sender_kind, content, content_type, media_ref, deleted, created_at
            FROM messages
            WHERE room_id = $1 AND NOT deleted
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(Uuid::from(room_id))
        .bind(i64::from(page_size))
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let mut reads = self.load_reads(&ids).await?;

        rows.into_iter()
            .map(|row| {
                let read_by = reads.remove(&row.id).unwrap_or_default();
                row.into_message(read_by)
            })
            .collect()
    }

    async fn mark_read(
        &self,
        room_id: RoomId,
        reader: PrincipalId,
        at: Timestamp,
    ) -> Result<u64, RepositoryError> {
        // 回执只增不减：重复标记靠主键冲突吞掉，保留首次时间戳
        let result = sqlx::query(
            r#"
            INSERT INTO message_reads (message_id, principal_id, read_at)
            SELECT m.id, $2, $3
            FROM messages m
            WHERE m.room_id = $1 AND m.sender_id <> $2 AND NOT m.deleted
            ON CONFLICT (message_id, principal_id) DO NOTHING
            "#,
        )
        .bind(Uuid::from(room_id))
        .bind(Uuid::from(reader))
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn unread_count(
        &self,
        room_id: RoomId,
        principal_id: PrincipalId,
    ) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM messages m
            WHERE m.room_id = $1 AND m.sender_id <> $2 AND NOT m.deleted
              AND NOT EXISTS (
                  SELECT 1 FROM message_reads r
                  WHERE r.message_id = m.id AND r.principal_id = $2
              )
            "#,
        )
        .bind(Uuid::from(room_id))
        .bind(Uuid::from(principal_id))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(count as u64)
    }

    async fn purge_room(&self, room_id: RoomId) -> Result<u64, RepositoryError> {
        // message_reads 由外键级联清掉
        let result = sqlx::query("DELETE FROM messages WHERE room_id = $1")
            .bind(Uuid::from(room_id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
