//! 应用层错误定义
//!
//! 将各层错误汇总成一个面向调用方的错误类型。错误分类与对外语义：
//! 认证失败中止握手；Forbidden/Validation/NotFound 只回给发起方；
//! 存储暂时不可用作为可重试错误回给发送方，核心不自动重试。

use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::broadcaster::BroadcastError;
use crate::directory::DirectoryError;

/// 应用层错误类型
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 领域层错误（参数验证、权限、资源不存在）
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// 存储层错误
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// 用户目录错误
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// 事件广播错误
    #[error(transparent)]
    Broadcast(#[from] BroadcastError),

    /// 连接认证失败（缺失/非法/过期凭证，或主体不存在）
    #[error("authentication failed")]
    Authentication,
}

impl ApplicationError {
    /// 存储暂时不可用，调用方可以重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Repository(RepositoryError::Storage { .. })
                | Self::Directory(DirectoryError::Unavailable { .. })
        )
    }
}

/// 应用层结果类型
pub type ApplicationResult<T> = Result<T, ApplicationError>;
