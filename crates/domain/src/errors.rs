//! 领域模型错误定义
//!
//! 定义了消息子系统所有可能的错误类型，提供清晰的错误上下文。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 参数验证错误
    #[error("invalid {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// 请求者不是房间参与者
    #[error("not a participant of this room")]
    NotAParticipant,

    /// 房间不存在
    #[error("room not found")]
    RoomNotFound,

    /// 消息不存在
    #[error("message not found")]
    MessageNotFound,

    /// 用户不存在
    #[error("principal not found")]
    PrincipalNotFound,

    /// 不允许与自己建立会话
    #[error("cannot start a conversation with yourself")]
    SelfConversation,

    /// 操作不允许
    #[error("operation not allowed")]
    OperationNotAllowed,
}

impl DomainError {
    /// 创建参数验证错误
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 存储层错误类型
///
/// `Conflict` 表示唯一约束冲突；对于"不存在则创建"的路径，
/// 调用方应将其理解为"别人先创建了"并重新查询。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("requested record not found")]
    NotFound,

    #[error("record already exists")]
    Conflict,

    #[error("storage failure: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
