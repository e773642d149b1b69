//! 服务器推送事件
//!
//! 所有经由长连接下发的事件。事件名沿用客户端既有的 kebab-case
//! 线格式（receive-message / user-online / ...）。

use domain::{PrincipalId, RoomId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::dto::MessageDto;

/// 发给参与者私有频道的房间摘要，用于刷新会话列表预览
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: RoomId,
    pub is_group: bool,
    pub participant_ids: [PrincipalId; 2],
    pub last_message: MessageDto,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// 新消息（房间频道 + 其他参与者私有频道）
    ReceiveMessage { message: MessageDto },
    /// 发送确认，仅发送方连接收到
    MessageSent { message: MessageDto },
    /// 发送失败，仅发送方连接收到
    MessageError { error: String },
    /// 房间摘要更新，发给除发送方外的参与者
    RoomUpdated { room: RoomSummary },
    /// 输入中提示，只进房间频道，尽力而为
    UserTyping {
        user_id: PrincipalId,
        user_name: String,
        is_typing: bool,
    },
    /// 已读回执，每次 mark-read 调用发一条（不按消息逐条发）
    MessagesRead {
        room_id: RoomId,
        reader_id: PrincipalId,
        read_at: Timestamp,
    },
    /// 用户上线（连接数 0→1 时全局广播）
    UserOnline { user_id: PrincipalId },
    /// 用户离线（连接数 1→0 时全局广播）
    UserOffline { user_id: PrincipalId },
    /// 心跳应答
    Pong,
}
