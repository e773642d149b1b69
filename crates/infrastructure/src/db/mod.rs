//! PostgreSQL 持久化实现

mod directory;
mod messages;
mod rooms;

pub use directory::PgUserDirectory;
pub use messages::PgMessageRepository;
pub use rooms::PgRoomRepository;

use domain::RepositoryError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// 创建 PostgreSQL 连接池
pub async fn create_pg_pool(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
}

/// sqlx 错误到存储层错误的统一映射。
/// 唯一约束冲突单独识别，供"不存在则创建"路径重新查询。
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        _ => RepositoryError::storage(err.to_string()),
    }
}

/// kind 列的文本编码。表上有 CHECK 约束，读取时遇到意外值按
/// traveler 兜底而不是拒绝整行。
pub(crate) fn kind_to_str(kind: domain::PrincipalKind) -> &'static str {
    match kind {
        domain::PrincipalKind::Traveler => "traveler",
        domain::PrincipalKind::Host => "host",
    }
}

pub(crate) fn kind_from_str(value: &str) -> domain::PrincipalKind {
    match value {
        "host" => domain::PrincipalKind::Host,
        _ => domain::PrincipalKind::Traveler,
    }
}
