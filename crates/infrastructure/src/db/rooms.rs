use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use application::RoomRepository;
use domain::{MessageId, PrincipalId, RepositoryError, Room, RoomId, Timestamp};

use super::map_sqlx_error;

/// 数据库房间模型
#[derive(Debug, Clone, FromRow)]
struct DbRoom {
    id: Uuid,
    participant_lo: Uuid,
    participant_hi: Uuid,
    is_group: bool,
    last_message_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DbRoom> for Room {
    fn from(row: DbRoom) -> Self {
        Room {
            id: RoomId::new(row.id),
            participants: [
                PrincipalId::new(row.participant_lo),
                PrincipalId::new(row.participant_hi),
            ],
            is_group: row.is_group,
            last_message_id: row.last_message_id.map(MessageId::new),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub struct PgRoomRepository {
    pool: PgPool,
}

impl PgRoomRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoomRepository for PgRoomRepository {
    async fn insert(&self, room: Room) -> Result<Room, RepositoryError> {
        // 有序参与者对上的部分唯一索引兜底"每对至多一间"
        sqlx::query(
            r#"
            INSERT INTO rooms (id, participant_lo, participant_hi, is_group, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::from(room.id))
        .bind(Uuid::from(room.participants[0]))
        .bind(Uuid::from(room.participants[1]))
        .bind(room.is_group)
        .bind(room.created_at)
        .bind(room.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(room)
    }

    async fn find_by_id(&self, id: RoomId) -> Result<Option<Room>, RepositoryError> {
        let row: Option<DbRoom> = sqlx::query_as(
            r#"
            SELECT id, participant_lo, participant_hi, is_group, last_message_id, created_at, updated_at
            FROM rooms
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Room::from))
    }

    async fn find_direct(
        &self,
        pair: [PrincipalId; 2],
    ) -> Result<Option<Room>, RepositoryError> {
        let row: Option<DbRoom> = sqlx::query_as(
            r#"
            SELECT id, participant_lo, participant_hi, is_group, last_message_id, created_at, updated_at
            FROM rooms
            WHERE participant_lo = $1 AND participant_hi = $2 AND NOT is_group
            "#,
        )
        .bind(Uuid::from(pair[0]))
        .bind(Uuid::from(pair[1]))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Room::from))
    }

    async fn list_for_participant(
        &self,
        principal_id: PrincipalId,
    ) -> Result<Vec<Room>, RepositoryError> {
        let rows: Vec<DbRoom> = sqlx::query_as(
            r#"
            SELECT id, participant_lo, participant_hi, is_group, last_message_id, created_at, updated_at
            FROM rooms
            WHERE participant_lo = $1 OR participant_hi = $1
            ORDER BY updated_at DESC
            "#,
        )
        .bind(Uuid::from(principal_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Room::from).collect())
    }

    async fn record_message(
        &self,
        room_id: RoomId,
        message_id: MessageId,
        at: Timestamp,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE rooms SET last_message_id = $2, updated_at = $3 WHERE id = $1
            "#,
        )
        .bind(Uuid::from(room_id))
        .bind(Uuid::from(message_id))
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete(&self, id: RoomId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM rooms WHERE id = $1")
            .bind(Uuid::from(id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }
}
