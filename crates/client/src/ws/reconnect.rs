/// 自动重连
///
/// 连接断开后由读循环触发，在独立任务中按指数退避反复尝试连接。
/// 客户端被禁用时通过取消令牌立即停止。

use common::ws_rpc::{RpcError, RpcErrorCode};
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 重连策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// 首次重试前的等待时间
    pub initial_backoff: Duration,

    /// 等待时间上限
    pub max_backoff: Duration,

    /// 最多尝试次数，`None` 表示不限
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// 第 `attempt` 次失败后的等待时间（从 1 开始计数）
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// 重连状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPhase {
    Idle,
    Retrying,
    Connected,
    GaveUp,
}

pub struct Reconnector {
    policy: ReconnectPolicy,
    state: Arc<Mutex<RetryState>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct RetryState {
    phase: ReconnectPhase,

    /// 重连期间新连接又断开，成功后需要再跑一轮
    rearm: bool,
}

impl Reconnector {
    pub fn new(policy: ReconnectPolicy, cancel: CancellationToken) -> Self {
        Self {
            policy,
            state: Arc::new(Mutex::new(RetryState {
                phase: ReconnectPhase::Idle,
                rearm: false,
            })),
            cancel,
            task: Mutex::new(None),
        }
    }

    pub fn phase(&self) -> ReconnectPhase {
        self.state.lock().phase
    }

    /// 启动重连任务，返回是否启动了新任务
    ///
    /// 已在重连时不会启动第二个任务，而是让当前任务在成功后再尝试一轮，
    /// 因为成功建立的连接可能在任务结束前又断开了。已取消时什么都不做。
    pub fn trigger<F>(&self, attempt: F) -> bool
    where
        F: FnMut() -> BoxFuture<'static, Result<(), RpcError>> + Send + 'static,
    {
        {
            let mut state = self.state.lock();
            if self.cancel.is_cancelled() {
                return false;
            }
            if state.phase == ReconnectPhase::Retrying {
                debug!("重连进行中，成功后再检查一次连接");
                state.rearm = true;
                return false;
            }
            state.phase = ReconnectPhase::Retrying;
            state.rearm = false;
        }

        let policy = self.policy.clone();
        let state = self.state.clone();
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            let mut attempt = attempt;
            loop {
                let outcome = retry(&policy, &cancel, &mut attempt).await;
                let mut guard = state.lock();
                if outcome == ReconnectPhase::Connected && guard.rearm {
                    guard.rearm = false;
                    info!("🔁 重连期间连接再次断开，继续重连");
                    continue;
                }
                guard.phase = outcome;
                break;
            }
        });
        *self.task.lock() = Some(handle);
        true
    }

    /// 等待当前重连任务结束
    pub async fn join(&self) {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn retry<F>(policy: &ReconnectPolicy, cancel: &CancellationToken, attempt: &mut F) -> ReconnectPhase
where
    F: FnMut() -> BoxFuture<'static, Result<(), RpcError>>,
{
    let mut tries: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            info!("重连已取消");
            return ReconnectPhase::Idle;
        }

        tries += 1;
        match attempt().await {
            Ok(()) => {
                info!("✅ 第 {} 次重连成功", tries);
                return ReconnectPhase::Connected;
            }
            Err(err) if err.code == RpcErrorCode::Disabled => {
                info!("客户端已禁用，停止重连");
                return ReconnectPhase::Idle;
            }
            Err(err) if !err.code.is_retryable() => {
                error!("重连失败且不可重试: {}", err);
                return ReconnectPhase::GaveUp;
            }
            Err(err) => warn!("第 {} 次重连失败: {}", tries, err),
        }

        if policy.max_attempts.is_some_and(|max| tries >= max) {
            error!("重连 {} 次后放弃", tries);
            return ReconnectPhase::GaveUp;
        }

        let delay = policy.backoff(tries);
        warn!("{:?} 后重新连接...", delay);
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("重连已取消");
                return ReconnectPhase::Idle;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
