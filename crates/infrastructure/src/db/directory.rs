use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use application::{DirectoryError, UserDirectory};
use domain::{Principal, PrincipalId, Timestamp};

use super::kind_from_str;

/// principals 表是旅客/房东账户在本服务侧的统一投影：
/// 原系统按账户类型分成两个集合，这里收敛成一张带 kind 标签的表。
#[derive(Debug, Clone, FromRow)]
struct DbPrincipal {
    id: Uuid,
    kind: String,
    display_name: String,
    avatar_ref: Option<String>,
    last_seen_at: Option<DateTime<Utc>>,
}

impl From<DbPrincipal> for Principal {
    fn from(row: DbPrincipal) -> Self {
        Principal {
            id: PrincipalId::new(row.id),
            kind: kind_from_str(&row.kind),
            display_name: row.display_name,
            avatar_ref: row.avatar_ref,
            last_seen_at: row.last_seen_at,
        }
    }
}

pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_err(err: sqlx::Error) -> DirectoryError {
    DirectoryError::unavailable(err.to_string())
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn resolve(&self, id: PrincipalId) -> Result<Option<Principal>, DirectoryError> {
        let row: Option<DbPrincipal> = sqlx::query_as(
            r#"
            SELECT id, kind, display_name, avatar_ref, last_seen_at
            FROM principals
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;

        Ok(row.map(Principal::from))
    }

    async fn search(
        &self,
        term: &str,
        exclude: PrincipalId,
        limit: u32,
    ) -> Result<Vec<Principal>, DirectoryError> {
        let pattern = format!("%{}%", term.replace('%', "\\%").replace('_', "\\_"));
        let rows: Vec<DbPrincipal> = sqlx::query_as(
            r#"
            SELECT id, kind, display_name, avatar_ref, last_seen_at
            FROM principals
            WHERE id <> $2 AND (display_name ILIKE $1 OR email ILIKE $1)
            ORDER BY display_name
            LIMIT $3
            "#,
        )
        .bind(pattern)
        .bind(Uuid::from(exclude))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        Ok(rows.into_iter().map(Principal::from).collect())
    }

    async fn record_last_seen(
        &self,
        id: PrincipalId,
        at: Timestamp,
    ) -> Result<(), DirectoryError> {
        sqlx::query("UPDATE principals SET last_seen_at = $2 WHERE id = $1")
            .bind(Uuid::from(id))
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;

        Ok(())
    }
}
