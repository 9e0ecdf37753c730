/// 消息编解码辅助函数

use super::{RpcError, RpcMessage};
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// 编码 RPC 消息为 WebSocket 消息
pub fn encode(msg: &RpcMessage) -> Result<WsMessage, RpcError> {
    let json = msg.to_json()?;
    Ok(WsMessage::Text(json))
}

/// 解码 WebSocket 消息为 RPC 消息
///
/// 控制帧（ping/pong 等）返回 `Ok(None)`，由调用方继续读取下一帧
pub fn decode(ws_msg: WsMessage) -> Result<Option<RpcMessage>, RpcError> {
    match ws_msg {
        WsMessage::Text(text) => RpcMessage::from_json(&text)
            .map(Some)
            .map_err(RpcError::serialization_error),
        WsMessage::Binary(data) => {
            let text = String::from_utf8(data).map_err(RpcError::serialization_error)?;
            RpcMessage::from_json(&text)
                .map(Some)
                .map_err(RpcError::serialization_error)
        }
        WsMessage::Close(_) => Err(RpcError::connection_closed()),
        _ => Ok(None),
    }
}
