//! 用户目录接口
//!
//! 旅客和房东的账户存储属于外部协作方，这里只定义消息核心需要的
//! 能力面：按 id 解析身份、搜索用户、回写最后在线时间。
//! 原系统用两套并行的模型集合区分旅客/房东，这里收敛成带 kind
//! 标签的单一接口。

use async_trait::async_trait;
use domain::{Principal, PrincipalId, Timestamp};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("directory unavailable: {message}")]
    Unavailable { message: String },
}

impl DirectoryError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// 按 id 解析身份快照；不存在返回 None
    async fn resolve(&self, id: PrincipalId) -> Result<Option<Principal>, DirectoryError>;

    /// 按名称/邮箱搜索用户，排除指定 id，最多返回 limit 条
    async fn search(
        &self,
        term: &str,
        exclude: PrincipalId,
        limit: u32,
    ) -> Result<Vec<Principal>, DirectoryError>;

    /// 用户完全下线时回写最后在线时间。核心对目录的唯一写操作。
    async fn record_last_seen(
        &self,
        id: PrincipalId,
        at: Timestamp,
    ) -> Result<(), DirectoryError>;
}
