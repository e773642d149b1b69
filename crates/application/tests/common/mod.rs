// 每个集成测试二进制只用到这些 helper 的一个子集，未用到的会触发 dead_code 警告。
#![allow(dead_code)]

//! 服务层测试公共件：可控时钟、事件捕获广播器、用户目录 mock、测试数据。
//!
//! 这些 helper 原先位于 `application` crate 的 `#[cfg(test)]` 模块中；因为
//! 服务测试需要 `infrastructure` 的内存实现，而 `infrastructure` 又依赖
//! `application`，单元测试会让依赖图中出现两份 `application`。将测试下沉为
//! 集成测试后，它们与 `infrastructure` 链接到同一份 `application` rlib，
//! 这些 helper 随之移动到集成测试共享模块。

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::TimeZone;
use domain::{ConnectionId, Principal, PrincipalId, PrincipalKind, RoomId, Timestamp};
use uuid::Uuid;

use application::broadcaster::{BroadcastError, EventBroadcaster};
use application::clock::Clock;
use application::directory::{DirectoryError, UserDirectory};
use application::events::ServerEvent;

/// 每次读取前进一秒的时钟，让 created_at 严格单调、测试可复现
pub struct SteppingClock {
    base: Timestamp,
    ticks: AtomicI64,
}

impl SteppingClock {
    pub fn new() -> Self {
        Self {
            base: chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            ticks: AtomicI64::new(0),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> Timestamp {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        self.base + chrono::Duration::seconds(tick)
    }
}

/// 广播器捕获实现：记录每次投递的目标和事件，便于断言扇出行为
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Connection(ConnectionId, ServerEvent),
    Room(RoomId, Option<ConnectionId>, ServerEvent),
    Principal(PrincipalId, ServerEvent),
    All(Option<ConnectionId>, ServerEvent),
    FanOut(RoomId, Vec<PrincipalId>, Option<ConnectionId>, ServerEvent),
}

#[derive(Default)]
pub struct CaptureBroadcaster {
    deliveries: Mutex<Vec<Delivery>>,
}

impl CaptureBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }

    fn record(&self, delivery: Delivery) {
        self.deliveries.lock().unwrap().push(delivery);
    }
}

#[async_trait]
impl EventBroadcaster for CaptureBroadcaster {
    async fn send_to_connection(
        &self,
        connection_id: ConnectionId,
        event: ServerEvent,
    ) -> Result<(), BroadcastError> {
        self.record(Delivery::Connection(connection_id, event));
        Ok(())
    }

    async fn send_to_room(
        &self,
        room_id: RoomId,
        except: Option<ConnectionId>,
        event: ServerEvent,
    ) -> Result<(), BroadcastError> {
        self.record(Delivery::Room(room_id, except, event));
        Ok(())
    }

    async fn send_to_principal(
        &self,
        principal_id: PrincipalId,
        event: ServerEvent,
    ) -> Result<(), BroadcastError> {
        self.record(Delivery::Principal(principal_id, event));
        Ok(())
    }

    async fn broadcast_all(
        &self,
        except: Option<ConnectionId>,
        event: ServerEvent,
    ) -> Result<(), BroadcastError> {
        self.record(Delivery::All(except, event));
        Ok(())
    }

    async fn fan_out(
        &self,
        room_id: RoomId,
        principals: &[PrincipalId],
        except: Option<ConnectionId>,
        event: ServerEvent,
    ) -> Result<(), BroadcastError> {
        self.record(Delivery::FanOut(
            room_id,
            principals.to_vec(),
            except,
            event,
        ));
        Ok(())
    }
}

// 用户目录 mock。`UserDirectory` 定义在 `application` crate 里，集成测试需用
// `mockall::mock!` 在测试 crate 内生成 `MockUserDirectory`（automock 只在
// `application` 自身的 `#[cfg(test)]` 构建中可用）。
mockall::mock! {
    pub UserDirectory {}

    #[async_trait]
    impl UserDirectory for UserDirectory {
        async fn resolve(&self, id: PrincipalId) -> Result<Option<Principal>, DirectoryError>;
        async fn search(
            &self,
            term: &str,
            exclude: PrincipalId,
            limit: u32,
        ) -> Result<Vec<Principal>, DirectoryError>;
        async fn record_last_seen(
            &self,
            id: PrincipalId,
            at: Timestamp,
        ) -> Result<(), DirectoryError>;
    }
}

pub fn traveler(name: &str) -> Principal {
    Principal {
        id: PrincipalId::new(Uuid::new_v4()),
        kind: PrincipalKind::Traveler,
        display_name: name.to_string(),
        avatar_ref: None,
        last_seen_at: None,
    }
}

pub fn host(name: &str) -> Principal {
    Principal {
        id: PrincipalId::new(Uuid::new_v4()),
        kind: PrincipalKind::Host,
        display_name: name.to_string(),
        avatar_ref: None,
        last_seen_at: None,
    }
}
