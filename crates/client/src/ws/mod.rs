/// WebSocket 客户端模块
/// 
/// 连接管理、请求跟踪、会话存储和自动重连

pub mod client;
pub mod hooks;
pub mod reconnect;
pub mod session;
pub mod tracker;
pub mod transport;

pub use client::{Client, ConnectionState};
pub use hooks::{ClientHooks, NoopHooks};
pub use reconnect::{ReconnectPhase, ReconnectPolicy, Reconnector};
pub use session::SessionStore;
pub use tracker::RequestTracker;
pub use transport::{FrameReader, FrameWriter, Link, Transport, WsTransport};
