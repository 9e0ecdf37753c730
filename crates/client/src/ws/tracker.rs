/// 请求跟踪器
///
/// 用请求 ID 关联发出的请求和对端的应答；每个待响应请求只会被完成一次
/// （收到应答、超时、发送失败、调用方放弃或连接断开，五者只有一个生效）

use common::ws_rpc::{RpcError, RpcMessage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// RPC 响应等待器
type ResponseWaiter = oneshot::Sender<Result<RpcMessage, RpcError>>;

#[derive(Clone, Default)]
pub struct RequestTracker {
    /// 待响应的请求映射（request_id -> response_sender）
    pending: Arc<Mutex<HashMap<String, ResponseWaiter>>>,
}

/// 调用方的 future 被丢弃时移除对应的等待器
struct PendingGuard<'a> {
    tracker: &'a RequestTracker,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.tracker.pending.lock().remove(self.id);
    }
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册请求、写出请求并等待应答
    ///
    /// `write` 负责把消息写到传输层；写失败时等待器被移除并返回该错误。
    /// `timeout` 同时覆盖写出和等待应答，写操作卡住也会按时返回超时。
    pub async fn send<F, Fut>(
        &self,
        msg: RpcMessage,
        timeout: Duration,
        write: F,
    ) -> Result<RpcMessage, RpcError>
    where
        F: FnOnce(RpcMessage) -> Fut,
        Fut: Future<Output = Result<(), RpcError>>,
    {
        let request_id = msg.id.clone();
        let (tx, mut rx) = oneshot::channel();

        self.pending.lock().insert(request_id.clone(), tx);
        let _guard = PendingGuard {
            tracker: self,
            id: &request_id,
        };

        debug!("📤 发送请求: type={:?}, method={:?}, id={}", msg.message_type, msg.method, request_id);
        let exchange = async {
            match write(msg).await {
                Ok(()) => (&mut rx)
                    .await
                    .unwrap_or_else(|_| Err(RpcError::connection_closed())),
                Err(e) => Err(e),
            }
        };
        let outcome = tokio::time::timeout(timeout, exchange).await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                let expired = self.pending.lock().remove(&request_id).is_some();
                if expired {
                    debug!("请求超时: {}", request_id);
                    Err(RpcError::timeout(format!("请求超时: {}", request_id)))
                } else {
                    // 应答在超时的同时到达，以应答为准
                    rx.await.unwrap_or_else(|_| Err(RpcError::connection_closed()))
                }
            }
        }
    }

    /// 完成一个待响应请求；请求不存在（已完成或已超时）时返回 false
    pub fn complete(&self, id: &str, result: Result<RpcMessage, RpcError>) -> bool {
        let waiter = self.pending.lock().remove(id);
        match waiter {
            Some(waiter) => {
                if waiter.send(result).is_err() {
                    debug!("等待者已放弃: {}", id);
                }
                true
            }
            None => false,
        }
    }

    /// 以同一个错误完成所有待响应请求，返回被完成的数量
    pub fn fail_all(&self, error: RpcError) -> usize {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        let count = drained.len();
        for (id, waiter) in drained {
            debug!("清理待处理请求: {}", id);
            let _ = waiter.send(Err(error.clone()));
        }
        count
    }

    /// 获取待处理请求数量
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
