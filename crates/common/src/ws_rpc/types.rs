/// WebSocket RPC 数据类型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 当前客户端实现的协议版本
pub const PROTOCOL_VERSION: &str = "wsrpc/1";

/// 握手时携带协议版本的 HTTP 头
pub const PROTOCOL_HEADER: &str = "x-wsrpc-protocol";

// ============================================================================
// 会话
// ============================================================================

/// 服务端签发的会话
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    /// 会话恢复密钥
    pub key: String,

    /// 创建时间
    pub creation: DateTime<Utc>,

    /// 会话元数据（对客户端不透明）
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Session {
    pub fn new(key: impl Into<String>, metadata: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            creation: Utc::now(),
            metadata,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreSessionRequest {
    pub key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_metadata_defaults_to_null() {
        let session: Session = serde_json::from_value(json!({
            "key": "k-1",
            "creation": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(session.key, "k-1");
        assert!(session.metadata.is_null());
    }
}
