/// 会话存储
///
/// 最多保存一个服务端签发的会话，读写锁保证快照不会看到写了一半的会话

use common::Session;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Clone, Default)]
pub struct SessionStore {
    session: Arc<RwLock<Option<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 保存会话（覆盖旧会话）
    pub async fn establish(&self, session: Session) {
        let mut current = self.session.write().await;
        debug!("保存会话: key={}", session.key);
        *current = Some(session);
    }

    /// 清除会话，返回之前是否存在会话
    pub async fn clear(&self) -> bool {
        let mut current = self.session.write().await;
        current.take().is_some()
    }

    /// 获取当前会话快照
    pub async fn snapshot(&self) -> Option<Session> {
        let current = self.session.read().await;
        current.clone()
    }

    /// 获取会话恢复密钥
    pub async fn key(&self) -> Option<String> {
        let current = self.session.read().await;
        current.as_ref().map(|s| s.key.clone())
    }
}
