/// 客户端钩子
///
/// 所有回调都有默认的空实现，只需覆盖关心的事件。
/// 回调在后台读循环中同步执行，不应阻塞。

use common::Session;

pub trait ClientHooks: Send + Sync + 'static {
    /// 连接断开（包括禁用客户端导致的断开）
    fn on_disconnected(&self) {}

    /// 服务端创建了会话
    fn on_session_created(&self, _session: &Session) {}

    /// 服务端关闭了会话
    fn on_session_closed(&self) {}

    /// 收到服务端通知
    fn on_notification(&self, _method: &str, _payload: serde_json::Value) {}
}

/// 不做任何处理的钩子
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl ClientHooks for NoopHooks {}
