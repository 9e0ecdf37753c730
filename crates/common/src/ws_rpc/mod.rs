/// WebSocket RPC 模块
/// 
/// 定义基于 WebSocket 的请求/响应、通知和会话协议

pub mod codec;
pub mod error;
pub mod message;
pub mod types;

pub use error::{RpcError, RpcErrorCode};
pub use message::{MessageType, RpcErrorInfo, RpcMessage};
pub use types::*;
