//! 房间级发送串行化
//!
//! 每个房间一把异步锁：落库、刷新房间摘要、发送确认、扇出在同一个
//! 临界区内完成，保证同一房间内消息按 created_at 全序、接收方看到
//! 的顺序与发送顺序一致。跨房间互不影响，没有全局锁。

use std::sync::Arc;

use dashmap::DashMap;
use domain::RoomId;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct RoomSequencer {
    locks: DashMap<RoomId, Arc<Mutex<()>>>,
}

impl RoomSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取得房间锁。克隆出 Arc 后立即释放分片引用，await 不会
    /// 阻塞其他房间。
    pub async fn acquire(&self, room_id: RoomId) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(room_id).or_default().clone();
        lock.lock_owned().await
    }

    /// 房间删除后回收锁条目
    pub fn forget(&self, room_id: RoomId) {
        self.locks.remove(&room_id);
    }
}
