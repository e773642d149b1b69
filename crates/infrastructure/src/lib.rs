pub mod db;
pub mod hub;
pub mod memory;

pub use db::{create_pg_pool, PgMessageRepository, PgRoomRepository, PgUserDirectory};
pub use hub::ConnectionHub;
pub use memory::{MemoryMessageRepository, MemoryRoomRepository, MemoryUserDirectory};
