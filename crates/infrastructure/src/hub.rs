//! 连接登记表与事件扇出
//!
//! 进程唯一的连接注册对象：启动时构造一次，以句柄传给所有需要
//! 下发事件的组件，不走隐藏的全局单例。三张分片表：
//! 连接 -> 出站队列、房间频道 -> 连接集合、用户私有频道 -> 连接集合。
//! 投递语义是"当前在线的连接收到"；下线的接收端在投递时剪除，
//! 离线参与者靠历史拉取补齐。

use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;

use application::{BroadcastError, EventBroadcaster, ServerEvent};
use domain::{ConnectionId, PrincipalId, RoomId};

struct ConnectionHandle {
    principal_id: PrincipalId,
    joined_rooms: HashSet<RoomId>,
    sender: UnboundedSender<ServerEvent>,
}

#[derive(Default)]
pub struct ConnectionHub {
    connections: DashMap<ConnectionId, ConnectionHandle>,
    rooms: DashMap<RoomId, HashSet<ConnectionId>>,
    principals: DashMap<PrincipalId, HashSet<ConnectionId>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记连接并自动加入该用户的私有频道。
    pub fn register(
        &self,
        connection_id: ConnectionId,
        principal_id: PrincipalId,
        sender: UnboundedSender<ServerEvent>,
    ) {
        self.connections.insert(
            connection_id,
            ConnectionHandle {
                principal_id,
                joined_rooms: HashSet::new(),
                sender,
            },
        );
        self.principals
            .entry(principal_id)
            .or_default()
            .insert(connection_id);
    }

    /// 注销连接，清掉它在所有频道里的痕迹。
    pub fn unregister(&self, connection_id: ConnectionId) {
        let Some((_, handle)) = self.connections.remove(&connection_id) else {
            return;
        };
        for room_id in &handle.joined_rooms {
            if let Some(mut members) = self.rooms.get_mut(room_id) {
                members.remove(&connection_id);
            }
        }
        if let Some(mut conns) = self.principals.get_mut(&handle.principal_id) {
            conns.remove(&connection_id);
            if conns.is_empty() {
                drop(conns);
                self.principals
                    .remove_if(&handle.principal_id, |_, set| set.is_empty());
            }
        }
    }

    /// 把连接加入房间频道。成员资格校验发生在调用方（应用层），
    /// 这里只管频道登记。
    pub fn join_room(&self, connection_id: ConnectionId, room_id: RoomId) {
        let Some(mut handle) = self.connections.get_mut(&connection_id) else {
            return;
        };
        handle.joined_rooms.insert(room_id);
        drop(handle);
        self.rooms.entry(room_id).or_default().insert(connection_id);
    }

    pub fn leave_room(&self, connection_id: ConnectionId, room_id: RoomId) {
        if let Some(mut handle) = self.connections.get_mut(&connection_id) {
            handle.joined_rooms.remove(&room_id);
        }
        if let Some(mut members) = self.rooms.get_mut(&room_id) {
            members.remove(&connection_id);
        }
    }

    pub fn is_joined(&self, connection_id: ConnectionId, room_id: RoomId) -> bool {
        self.rooms
            .get(&room_id)
            .map(|members| members.contains(&connection_id))
            .unwrap_or(false)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn room_members(&self, room_id: RoomId) -> HashSet<ConnectionId> {
        self.rooms
            .get(&room_id)
            .map(|members| members.clone())
            .unwrap_or_default()
    }

    fn principal_connections(&self, principal_id: PrincipalId) -> HashSet<ConnectionId> {
        self.principals
            .get(&principal_id)
            .map(|conns| conns.clone())
            .unwrap_or_default()
    }

    /// 投递到目标集合。发送失败说明接收端已经没了，顺手注销。
    fn deliver(&self, targets: impl IntoIterator<Item = ConnectionId>, event: &ServerEvent) {
        let mut dead = Vec::new();
        for connection_id in targets {
            if let Some(handle) = self.connections.get(&connection_id) {
                if handle.sender.send(event.clone()).is_err() {
                    dead.push(connection_id);
                }
            }
        }
        for connection_id in dead {
            tracing::debug!(connection_id = %connection_id, "pruning closed connection");
            self.unregister(connection_id);
        }
    }
}

#[async_trait]
impl EventBroadcaster for ConnectionHub {
    async fn send_to_connection(
        &self,
        connection_id: ConnectionId,
        event: ServerEvent,
    ) -> Result<(), BroadcastError> {
        self.deliver([connection_id], &event);
        Ok(())
    }

    async fn send_to_room(
        &self,
        room_id: RoomId,
        except: Option<ConnectionId>,
        event: ServerEvent,
    ) -> Result<(), BroadcastError> {
        let mut targets = self.room_members(room_id);
        if let Some(skip) = except {
            targets.remove(&skip);
        }
        self.deliver(targets, &event);
        Ok(())
    }

    async fn send_to_principal(
        &self,
        principal_id: PrincipalId,
        event: ServerEvent,
    ) -> Result<(), BroadcastError> {
        self.deliver(self.principal_connections(principal_id), &event);
        Ok(())
    }

    async fn broadcast_all(
        &self,
        except: Option<ConnectionId>,
        event: ServerEvent,
    ) -> Result<(), BroadcastError> {
        let targets: Vec<ConnectionId> = self
            .connections
            .iter()
            .map(|entry| *entry.key())
            .filter(|id| Some(*id) != except)
            .collect();
        self.deliver(targets, &event);
        Ok(())
    }

    async fn fan_out(
        &self,
        room_id: RoomId,
        principals: &[PrincipalId],
        except: Option<ConnectionId>,
        event: ServerEvent,
    ) -> Result<(), BroadcastError> {
        // 房间频道 ∪ 私有频道，按连接去重，每个连接只收一份
        let mut targets = self.room_members(room_id);
        for principal_id in principals {
            targets.extend(self.principal_connections(*principal_id));
        }
        if let Some(skip) = except {
            targets.remove(&skip);
        }
        self.deliver(targets, &event);
        Ok(())
    }
}
