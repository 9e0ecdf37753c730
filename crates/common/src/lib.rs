/// WsRpc - 公共库
/// 
/// 提供客户端与服务端共享的消息协议、错误类型和编解码工具

pub mod errors;
pub mod ws_rpc;

// 重新导出常用类型
pub use errors::{Error, Result};
pub use ws_rpc::{RpcMessage, RpcError, RpcErrorCode, MessageType, Session};
