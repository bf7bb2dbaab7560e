//! 命令错误分类与状态码映射。

use thiserror::Error;

use crate::phrases::Phrases;
use crate::response::{
    Envelope, STATUS_BAD_REQUEST, STATUS_FORBIDDEN, STATUS_INTERNAL, STATUS_NOT_FOUND,
    STATUS_TOO_MANY_REQUESTS, STATUS_UNAUTHORIZED,
};
use crate::storage::StorageError;

/// 分派器统一渲染的错误；每种错误对应唯一状态码。
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    TooManyRequests(String),
    #[error("{0}")]
    Internal(String),
}

impl CommandError {
    pub fn status(&self) -> u16 {
        match self {
            CommandError::BadRequest(_) => STATUS_BAD_REQUEST,
            CommandError::Unauthorized(_) => STATUS_UNAUTHORIZED,
            CommandError::Forbidden(_) => STATUS_FORBIDDEN,
            CommandError::NotFound(_) => STATUS_NOT_FOUND,
            CommandError::TooManyRequests(_) => STATUS_TOO_MANY_REQUESTS,
            CommandError::Internal(_) => STATUS_INTERNAL,
        }
    }

    pub fn into_envelope(self) -> Envelope {
        Envelope::message(self.status(), self.to_string())
    }

    /// 越界一律 403（不泄露路径是否存在），缺失为 404，其余 I/O 失败为 500。
    pub fn from_storage(error: StorageError, phrases: &Phrases) -> Self {
        match error {
            StorageError::PathEscape => CommandError::Forbidden(phrases.phrase("access-denied")),
            StorageError::RootProtected => {
                CommandError::Forbidden(phrases.phrase("cannot-delete-root"))
            }
            StorageError::FileNotFound(_) => {
                CommandError::NotFound(phrases.phrase("file-not-found"))
            }
            StorageError::FolderNotFound(_) => {
                CommandError::NotFound(phrases.phrase("folder-not-found"))
            }
            StorageError::AlreadyExists(path) => CommandError::Internal(format!(
                "{}: {path}",
                phrases.phrase("folder-already-exists")
            )),
            other @ (StorageError::TooLarge { .. }
            | StorageError::Decode(_)
            | StorageError::Utf8(_)
            | StorageError::Io(_)) => CommandError::Internal(other.to_string()),
        }
    }
}
