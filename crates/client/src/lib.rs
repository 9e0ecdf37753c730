/// WsRpc - 客户端库
/// 
/// 通过一条持久 WebSocket 连接提供请求/响应、服务端会话和自动重连

pub mod config;
pub mod ws;

pub use config::{ClientOptions, Config};
pub use ws::{
    Client, ClientHooks, ConnectionState, NoopHooks, ReconnectPhase, ReconnectPolicy,
    Transport, WsTransport,
};
