//! 在线状态登记表
//!
//! 进程级的 principal -> 活跃连接集合 映射。在线与否由连接数派生：
//! 只有 0→1 和 1→0 两条边产生对外广播，中间的连接数变化（第二台
//! 设备上线等）不重复通告。按 principal 分片加锁，避免并发
//! 连接/断开把连接数数错。

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use domain::{ConnectionId, PrincipalId};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// 连接数跨越边界时的状态迁移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceTransition {
    /// 0→1：该用户刚上线
    CameOnline,
    /// 1→0：该用户最后一个连接关闭
    WentOffline,
    /// 连接数变化但没有跨越在线/离线边界
    Unchanged,
}

#[derive(Debug, Default)]
pub struct PresenceRegistry {
    connections: DashMap<PrincipalId, HashSet<ConnectionId>>,
    transition_locks: DashMap<PrincipalId, Arc<Mutex<()>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每个 principal 一把迁移锁：连接生命周期把"登记 + 对外通告"
    /// 放在同一临界区里，观察者看到的上线/离线事件严格有序，
    /// 不会出现 offline 之后又冒出过期的 online。
    pub async fn transition_lock(&self, principal_id: PrincipalId) -> OwnedMutexGuard<()> {
        let lock = self
            .transition_locks
            .entry(principal_id)
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// 登记一个新连接。整个判定在分片锁内完成，迁移结果对同一
    /// principal 严格有序。
    pub fn connect(
        &self,
        principal_id: PrincipalId,
        connection_id: ConnectionId,
    ) -> PresenceTransition {
        let mut entry = self.connections.entry(principal_id).or_default();
        let was_offline = entry.is_empty();
        entry.insert(connection_id);
        if was_offline {
            PresenceTransition::CameOnline
        } else {
            PresenceTransition::Unchanged
        }
    }

    /// 注销一个连接。未登记过的连接注销是无操作。
    pub fn disconnect(
        &self,
        principal_id: PrincipalId,
        connection_id: ConnectionId,
    ) -> PresenceTransition {
        match self.connections.entry(principal_id) {
            Entry::Occupied(mut occupied) => {
                let removed = occupied.get_mut().remove(&connection_id);
                if removed && occupied.get().is_empty() {
                    occupied.remove();
                    PresenceTransition::WentOffline
                } else {
                    PresenceTransition::Unchanged
                }
            }
            Entry::Vacant(_) => PresenceTransition::Unchanged,
        }
    }

    pub fn is_online(&self, principal_id: PrincipalId) -> bool {
        self.connections
            .get(&principal_id)
            .map(|conns| !conns.is_empty())
            .unwrap_or(false)
    }

    pub fn connection_count(&self, principal_id: PrincipalId) -> usize {
        self.connections
            .get(&principal_id)
            .map(|conns| conns.len())
            .unwrap_or(0)
    }
}
