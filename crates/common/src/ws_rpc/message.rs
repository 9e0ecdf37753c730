/// WebSocket RPC 消息定义

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{RestoreSessionRequest, Session};
use super::{RpcError, RpcErrorCode};

/// RPC 消息类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// 请求消息（期望响应）
    Request,
    /// 响应消息
    Response,
    /// 通知消息（不需要响应）
    Notification,
    /// 服务端创建了会话
    SessionCreated,
    /// 服务端关闭了会话
    SessionClosed,
    /// 客户端请求恢复会话
    RestoreSession,
    /// 客户端请求关闭会话
    CloseSession,
    /// 服务端错误信号
    Error,
}

/// RPC 消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcMessage {
    /// 消息唯一ID
    pub id: String,

    /// 消息类型
    #[serde(rename = "type")]
    pub message_type: MessageType,

    /// RPC 方法名（request/notification 时必需）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// 消息负载
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,

    /// 错误信息（response / error 时可能有值）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorInfo>,
}

/// RPC 错误信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorInfo {
    /// 错误码
    pub code: String,

    /// 错误消息
    pub message: String,

    /// 错误详情（可选）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<RpcErrorInfo> for RpcError {
    fn from(info: RpcErrorInfo) -> Self {
        Self {
            code: RpcErrorCode::from_code(&info.code),
            message: info.message,
            details: info.details,
        }
    }
}

impl RpcMessage {
    fn with_type(id: String, message_type: MessageType) -> Self {
        Self {
            id,
            message_type,
            method: None,
            payload: None,
            error: None,
        }
    }

    /// 创建请求消息
    pub fn request(method: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            method: Some(method.into()),
            payload: Some(payload),
            ..Self::with_type(format!("req-{}", Uuid::new_v4()), MessageType::Request)
        }
    }

    /// 创建响应消息
    pub fn response(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            payload: Some(payload),
            ..Self::with_type(id.into(), MessageType::Response)
        }
    }

    /// 创建错误响应消息
    pub fn error_response(
        id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> Self {
        Self {
            error: Some(RpcErrorInfo {
                code: code.into(),
                message: message.into(),
                details,
            }),
            ..Self::with_type(id.into(), MessageType::Response)
        }
    }

    /// 创建通知消息
    pub fn notification(method: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            method: Some(method.into()),
            payload: Some(payload),
            ..Self::with_type(format!("notif-{}", Uuid::new_v4()), MessageType::Notification)
        }
    }

    /// 创建会话建立消息（服务端 -> 客户端）
    pub fn session_created(session: &Session) -> Result<Self, serde_json::Error> {
        Ok(Self {
            payload: Some(serde_json::to_value(session)?),
            ..Self::with_type(format!("sess-{}", Uuid::new_v4()), MessageType::SessionCreated)
        })
    }

    /// 创建会话关闭消息（服务端 -> 客户端）
    pub fn session_closed() -> Self {
        Self::with_type(format!("sess-{}", Uuid::new_v4()), MessageType::SessionClosed)
    }

    /// 创建会话恢复请求
    pub fn restore_session(key: impl Into<String>) -> Result<Self, serde_json::Error> {
        let request = RestoreSessionRequest { key: key.into() };
        Ok(Self {
            payload: Some(serde_json::to_value(&request)?),
            ..Self::with_type(format!("req-{}", Uuid::new_v4()), MessageType::RestoreSession)
        })
    }

    /// 创建会话关闭请求
    pub fn close_session() -> Self {
        Self::with_type(format!("req-{}", Uuid::new_v4()), MessageType::CloseSession)
    }

    /// 创建错误信号（可关联某个请求 ID）
    pub fn error_signal(
        id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: Some(RpcErrorInfo {
                code: code.into(),
                message: message.into(),
                details: None,
            }),
            ..Self::with_type(id.into(), MessageType::Error)
        }
    }

    /// 序列化为 JSON 字符串
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// 从 JSON 字符串反序列化
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// 将应答消息转换为结果：成功时返回负载，失败时返回对应的 RPC 错误
    pub fn into_result(self) -> Result<serde_json::Value, RpcError> {
        match self.error {
            Some(info) => Err(info.into()),
            None => Ok(self.payload.unwrap_or(serde_json::Value::Null)),
        }
    }
}
