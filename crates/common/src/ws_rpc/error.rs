/// WebSocket RPC 错误定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// RPC 错误码
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RpcErrorCode {
    // 通用错误
    InvalidRequest,
    MethodNotFound,
    InternalError,
    SerializationError,
    Timeout,

    // 连接错误
    IncompatibleProtocol,
    DialError,
    AbnormalClosure,
    ConnectionClosed,
    NotConnected,
    Disabled,

    // 会话错误
    SessionNotFound,
    SessionRestorationFailed,
}

impl RpcErrorCode {
    /// 转换为字符串码
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::MethodNotFound => "METHOD_NOT_FOUND",
            Self::InternalError => "INTERNAL_ERROR",
            Self::SerializationError => "SERIALIZATION_ERROR",
            Self::Timeout => "TIMEOUT",

            Self::IncompatibleProtocol => "INCOMPATIBLE_PROTOCOL",
            Self::DialError => "DIAL_ERROR",
            Self::AbnormalClosure => "ABNORMAL_CLOSURE",
            Self::ConnectionClosed => "CONNECTION_CLOSED",
            Self::NotConnected => "NOT_CONNECTED",
            Self::Disabled => "DISABLED",

            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::SessionRestorationFailed => "SESSION_RESTORATION_FAILED",
        }
    }

    /// 从字符串码解析，未知错误码归为内部错误
    pub fn from_code(code: &str) -> Self {
        match code {
            "INVALID_REQUEST" => Self::InvalidRequest,
            "METHOD_NOT_FOUND" => Self::MethodNotFound,
            "SERIALIZATION_ERROR" => Self::SerializationError,
            "TIMEOUT" => Self::Timeout,
            "INCOMPATIBLE_PROTOCOL" => Self::IncompatibleProtocol,
            "DIAL_ERROR" => Self::DialError,
            "ABNORMAL_CLOSURE" => Self::AbnormalClosure,
            "CONNECTION_CLOSED" => Self::ConnectionClosed,
            "NOT_CONNECTED" => Self::NotConnected,
            "DISABLED" => Self::Disabled,
            "SESSION_NOT_FOUND" => Self::SessionNotFound,
            "SESSION_RESTORATION_FAILED" => Self::SessionRestorationFailed,
            _ => Self::InternalError,
        }
    }

    /// 是否可由重连器重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DialError | Self::ConnectionClosed | Self::AbnormalClosure | Self::Timeout
        )
    }
}

impl fmt::Display for RpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// RPC 错误
#[derive(Debug, Clone)]
pub struct RpcError {
    pub code: RpcErrorCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl RpcError {
    /// 创建新的 RPC 错误
    pub fn new(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// 无效请求错误
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InvalidRequest, message)
    }

    /// 内部错误
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InternalError, message)
    }

    /// 超时错误
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::Timeout, message)
    }

    /// 连接关闭错误
    pub fn connection_closed() -> Self {
        Self::new(RpcErrorCode::ConnectionClosed, "连接已关闭")
    }

    /// 连接异常关闭
    pub fn abnormal_closure(reason: impl fmt::Display) -> Self {
        Self::new(
            RpcErrorCode::AbnormalClosure,
            format!("连接异常关闭: {}", reason),
        )
    }

    /// 拨号失败
    pub fn dial_error(reason: impl fmt::Display) -> Self {
        Self::new(RpcErrorCode::DialError, format!("拨号失败: {}", reason))
    }

    /// 协议版本不兼容
    pub fn incompatible_protocol(required: &str, actual: Option<&str>) -> Self {
        Self::new(
            RpcErrorCode::IncompatibleProtocol,
            format!(
                "协议不兼容: 需要 {}, 服务端为 {}",
                required,
                actual.unwrap_or("<未声明>")
            ),
        )
    }

    /// 未连接
    pub fn not_connected() -> Self {
        Self::new(RpcErrorCode::NotConnected, "客户端未连接")
    }

    /// 客户端已禁用
    pub fn disabled() -> Self {
        Self::new(RpcErrorCode::Disabled, "客户端已禁用")
    }

    /// 会话恢复失败
    pub fn session_restoration_failed(reason: impl fmt::Display) -> Self {
        Self::new(
            RpcErrorCode::SessionRestorationFailed,
            format!("会话恢复失败: {}", reason),
        )
    }

    /// 序列化错误
    pub fn serialization_error(err: impl fmt::Display) -> Self {
        Self::new(
            RpcErrorCode::SerializationError,
            format!("序列化错误: {}", err),
        )
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization_error(err)
    }
}

impl From<RpcError> for crate::Error {
    fn from(err: RpcError) -> Self {
        match err.code {
            RpcErrorCode::Timeout => crate::Error::Timeout(err.message),
            RpcErrorCode::IncompatibleProtocol => crate::Error::Protocol(err.message),
            RpcErrorCode::DialError
            | RpcErrorCode::AbnormalClosure
            | RpcErrorCode::ConnectionClosed
            | RpcErrorCode::NotConnected
            | RpcErrorCode::Disabled => crate::Error::Connection(err.to_string()),
            RpcErrorCode::SessionNotFound | RpcErrorCode::SessionRestorationFailed => {
                crate::Error::Session(err.message)
            }
            _ => crate::Error::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_string_mapping() {
        for code in [
            RpcErrorCode::Timeout,
            RpcErrorCode::IncompatibleProtocol,
            RpcErrorCode::DialError,
            RpcErrorCode::SessionRestorationFailed,
        ] {
            assert_eq!(RpcErrorCode::from_code(code.as_str()), code);
        }
        assert_eq!(RpcErrorCode::from_code("QUOTA_EXCEEDED"), RpcErrorCode::InternalError);
    }

    #[test]
    fn test_retryable() {
        assert!(RpcErrorCode::DialError.is_retryable());
        assert!(!RpcErrorCode::IncompatibleProtocol.is_retryable());
        assert!(!RpcErrorCode::Disabled.is_retryable());
    }

    #[test]
    fn test_into_common_error() {
        let err: crate::Error = RpcError::timeout("req-1").into();
        assert!(matches!(err, crate::Error::Timeout(_)));

        let err: crate::Error = RpcError::incompatible_protocol("wsrpc/1", Some("wsrpc/2")).into();
        assert!(matches!(err, crate::Error::Protocol(_)));
    }
}
