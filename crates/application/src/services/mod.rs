mod message_service;
mod room_service;

// 服务层测试已下沉为集成测试（crates/application/tests/），因为它们依赖
// `infrastructure` 的内存实现，而 `infrastructure` 反过来依赖 `application`，
// 作为单元测试会在依赖图中产生两份 `application`。

pub use message_service::{MessageService, MessageServiceDependencies, SendMessageRequest};
pub use room_service::{RoomService, RoomServiceDependencies};
