//! 统一的 API 错误类型与转换。

use axum::http::StatusCode;
use std::fmt;

use crate::storage::StorageError;

/// 单次请求内的失败原因，携带的字符串仅用于日志。
#[derive(Debug)]
pub enum ApiError {
    MethodNotAllowed,
    MissingOrMalformedFormFile(String),
    InvalidPath,
    InvalidFilename(String),
    DirectoryCreateFailed(String),
    FileCreateFailed(String),
    CopyFailed(String),
    InvalidCredentials,
    TokenGenerationFailed(String),
    TokenInvalidOrExpired,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MethodNotAllowed | ApiError::InvalidPath | ApiError::InvalidFilename(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::InvalidCredentials | ApiError::TokenInvalidOrExpired => {
                StatusCode::UNAUTHORIZED
            }
            // 缺少表单文件沿用 500，兼容旧客户端。
            ApiError::MissingOrMalformedFormFile(_)
            | ApiError::DirectoryCreateFailed(_)
            | ApiError::FileCreateFailed(_)
            | ApiError::CopyFailed(_)
            | ApiError::TokenGenerationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 返回给客户端的固定提示信息。
    pub fn message(&self) -> &'static str {
        match self {
            ApiError::MethodNotAllowed => "request method not support",
            ApiError::MissingOrMalformedFormFile(_) => "Get form file failed",
            ApiError::InvalidPath => "invalid subdir",
            ApiError::InvalidFilename(_) => "invalid filename",
            ApiError::DirectoryCreateFailed(_) => "Create dir failed",
            ApiError::FileCreateFailed(_) => "Create file failed",
            ApiError::CopyFailed(_) => "Write file failed",
            ApiError::InvalidCredentials => "username or password error",
            ApiError::TokenGenerationFailed(_) => "generateToken error",
            ApiError::TokenInvalidOrExpired => "accesstoken not pass",
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::MissingOrMalformedFormFile(cause)
            | ApiError::InvalidFilename(cause)
            | ApiError::DirectoryCreateFailed(cause)
            | ApiError::FileCreateFailed(cause)
            | ApiError::CopyFailed(cause)
            | ApiError::TokenGenerationFailed(cause) => {
                write!(f, "{}: {}", self.message(), cause)
            }
            _ => f.write_str(self.message()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::InvalidPath => ApiError::InvalidPath,
            StorageError::Io(err) => ApiError::DirectoryCreateFailed(err.to_string()),
        }
    }
}
