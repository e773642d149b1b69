use async_trait::async_trait;
use domain::{ConnectionId, PrincipalId, RoomId};
use thiserror::Error;

use crate::events::ServerEvent;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 事件扇出接口。
///
/// 由进程内的连接登记表实现；投递是"现在在线的连接收到，离线的
/// 参与者之后通过历史拉取补齐"，本接口不提供排队重放。
#[async_trait]
pub trait EventBroadcaster: Send + Sync {
    /// 投递到单个连接（发送确认 / 错误回执）
    async fn send_to_connection(
        &self,
        connection_id: ConnectionId,
        event: ServerEvent,
    ) -> Result<(), BroadcastError>;

    /// 投递到房间频道内的所有连接，可排除一个连接（通常是发送方）
    async fn send_to_room(
        &self,
        room_id: RoomId,
        except: Option<ConnectionId>,
        event: ServerEvent,
    ) -> Result<(), BroadcastError>;

    /// 投递到某个用户私有频道的全部连接（多端一致性）
    async fn send_to_principal(
        &self,
        principal_id: PrincipalId,
        event: ServerEvent,
    ) -> Result<(), BroadcastError>;

    /// 全局广播（在线/离线通告），可排除一个连接
    async fn broadcast_all(
        &self,
        except: Option<ConnectionId>,
        event: ServerEvent,
    ) -> Result<(), BroadcastError>;

    /// 新消息扇出：房间频道 ∪ 列出用户的私有频道，按连接去重，
    /// 每个连接只收到一份
    async fn fan_out(
        &self,
        room_id: RoomId,
        principals: &[PrincipalId],
        except: Option<ConnectionId>,
        event: ServerEvent,
    ) -> Result<(), BroadcastError>;
}
