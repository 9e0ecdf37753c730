/// WebSocket RPC 客户端
///
/// 管理连接生命周期：拨号与协议校验、后台读循环、消息分发、会话恢复以及断线重连

use common::ws_rpc::{MessageType, RpcError, RpcErrorCode, RpcMessage, Session};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::hooks::{ClientHooks, NoopHooks};
use super::reconnect::{ReconnectPhase, Reconnector};
use super::session::SessionStore;
use super::tracker::RequestTracker;
use super::transport::{FrameReader, FrameWriter, Link, Transport, WsTransport};
use crate::config::ClientOptions;

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disabled = 0,
    Disconnected = 1,
    Connecting = 2,
    Connected = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Disabled,
            2 => Self::Connecting,
            3 => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

/// WebSocket RPC 客户端
///
/// 克隆得到的是同一个客户端的句柄。生命周期：`new → connect → request… → disable`。
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    options: ClientOptions,
    transport: Arc<dyn Transport>,
    hooks: Arc<dyn ClientHooks>,

    /// 连接状态（ConnectionState）
    state: AtomicU8,

    /// 串行化并发的 connect 调用
    connect_lock: Mutex<()>,

    /// 当前连接的写任务
    writer: parking_lot::Mutex<Option<LinkWriter>>,

    session: SessionStore,
    tracker: RequestTracker,
    reconnector: Reconnector,

    /// 客户端禁用时取消，读循环和重连任务都监听它
    shutdown: CancellationToken,
}

impl Client {
    /// 使用 WebSocket 传输创建客户端
    pub fn new(options: ClientOptions) -> Self {
        let transport = WsTransport::from_options(&options);
        Self::from_parts(options, Arc::new(transport), Arc::new(NoopHooks))
    }

    /// 使用 WebSocket 传输和自定义钩子创建客户端
    pub fn with_hooks(options: ClientOptions, hooks: impl ClientHooks) -> Self {
        let transport = WsTransport::from_options(&options);
        Self::from_parts(options, Arc::new(transport), Arc::new(hooks))
    }

    /// 使用任意传输和钩子创建客户端
    pub fn from_parts(
        options: ClientOptions,
        transport: Arc<dyn Transport>,
        hooks: Arc<dyn ClientHooks>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let reconnector = Reconnector::new(options.reconnect.clone(), shutdown.child_token());

        Self {
            inner: Arc::new(ClientInner {
                options,
                transport,
                hooks,
                state: AtomicU8::new(ConnectionState::Disconnected as u8),
                connect_lock: Mutex::new(()),
                writer: parking_lot::Mutex::new(None),
                session: SessionStore::new(),
                tracker: RequestTracker::new(),
                reconnector,
                shutdown,
            }),
        }
    }

    /// 建立连接；已连接时直接返回
    ///
    /// 协议版本在 WebSocket 握手中通过 `x-wsrpc-protocol` 头协商，服务端回应的版本
    /// 与要求不符时关闭连接并返回 `IncompatibleProtocol`，不会进入 Connected。
    /// 协议不兼容和拨号失败会直接返回给调用方；会话恢复失败只记录日志并清除会话。
    pub async fn connect(&self) -> Result<(), RpcError> {
        self.inner.clone().connect().await
    }

    /// 发送请求并等待响应（默认超时）
    pub async fn request(
        &self,
        method: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, RpcError> {
        let timeout = self.inner.options.default_request_timeout;
        self.request_with_timeout(method, payload, timeout).await
    }

    /// 发送请求并等待响应
    ///
    /// `timeout` 从调用开始计算，覆盖按需连接、写出和等待应答。
    pub async fn request_with_timeout(
        &self,
        method: impl Into<String>,
        payload: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, RpcError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let msg = RpcMessage::request(method, payload);

        match tokio::time::timeout_at(deadline, self.inner.ensure_connected()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("请求在连接建立前超时: {}", msg.id);
                return Err(RpcError::timeout(format!("请求超时: {}", msg.id)));
            }
        }

        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let reply = self.inner.send_tracked(msg, remaining).await?;
        reply.into_result()
    }

    /// 发送通知（不等待响应）
    pub async fn notify(
        &self,
        method: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<(), RpcError> {
        self.inner.ensure_connected().await?;
        let msg = RpcMessage::notification(method, payload);
        let timeout = self.inner.options.default_request_timeout;
        match tokio::time::timeout(timeout, self.inner.write(msg)).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::timeout("通知发送超时")),
        }
    }

    /// 请求服务端关闭当前会话并清除本地会话；没有会话时什么都不做
    pub async fn close_session(&self) -> Result<(), RpcError> {
        if self.inner.session.key().await.is_none() {
            return Ok(());
        }

        self.inner.ensure_connected().await?;
        let timeout = self.inner.options.default_request_timeout;
        let reply = self
            .inner
            .send_tracked(RpcMessage::close_session(), timeout)
            .await?;
        reply.into_result()?;

        self.inner.session.clear().await;
        info!("会话已关闭");
        Ok(())
    }

    /// 当前会话
    pub async fn session(&self) -> Option<Session> {
        self.inner.session.snapshot().await
    }

    /// 当前连接状态
    pub fn status(&self) -> ConnectionState {
        self.inner.state()
    }

    /// 待响应请求数量
    pub fn pending_requests(&self) -> usize {
        self.inner.tracker.len()
    }

    /// 自动重连状态
    pub fn reconnect_phase(&self) -> ReconnectPhase {
        self.inner.reconnector.phase()
    }

    /// 禁用客户端：关闭连接、停止重连、结束所有待响应请求并清除会话
    ///
    /// 读循环随之退出，`on_disconnected` 也会被调用一次。
    pub async fn disable(&self) {
        let previous = self
            .inner
            .state
            .swap(ConnectionState::Disabled as u8, Ordering::AcqRel);
        if previous == ConnectionState::Disabled as u8 {
            return;
        }
        info!("🛑 客户端已禁用");

        self.inner.shutdown.cancel();
        self.inner.close_writer();
        self.inner.tracker.fail_all(RpcError::disabled());
        self.inner.session.clear().await;
    }

    /// `disable` 的别名
    pub async fn close(&self) {
        self.disable().await
    }
}

impl ClientInner {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// 仅当当前状态为 `from` 时切换到 `to`，因此不会覆盖 Disabled
    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn connect(self: Arc<Self>) -> BoxFuture<'static, Result<(), RpcError>> {
        async move {
            if self.state() == ConnectionState::Connected {
                return Ok(());
            }

            let _guard = self.connect_lock.lock().await;
            // 持有锁时看到 Connecting 说明上一次尝试被调用方中途放弃
            let observed = self.state();
            match observed {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Disabled => return Err(RpcError::disabled()),
                _ => {}
            }
            if !self.transition(observed, ConnectionState::Connecting) {
                return Err(RpcError::disabled());
            }

            let url = self.options.server_url.clone();
            info!("🔌 连接到服务端: {}", url);

            let Link {
                reader,
                mut writer,
                protocol,
            } = match self.transport.dial(&url).await {
                Ok(link) => link,
                Err(err) => {
                    self.transition(ConnectionState::Connecting, ConnectionState::Disconnected);
                    warn!("连接失败: {}", err);
                    return Err(err);
                }
            };

            if protocol.as_deref() != Some(self.options.protocol.as_str()) {
                writer.close().await;
                self.transition(ConnectionState::Connecting, ConnectionState::Disconnected);
                let err = RpcError::incompatible_protocol(&self.options.protocol, protocol.as_deref());
                error!("{}", err);
                return Err(err);
            }

            *self.writer.lock() = Some(LinkWriter::spawn(writer, self.shutdown.child_token()));
            if !self.transition(ConnectionState::Connecting, ConnectionState::Connected) {
                // 连接过程中被禁用
                self.close_writer();
                return Err(RpcError::disabled());
            }

            tokio::spawn(read_loop(self.clone(), reader));
            info!("✅ WebSocket 连接成功");

            self.restore_session().await;
            Ok(())
        }
        .boxed()
    }

    /// 断线时若开启了自动重连，请求前先尝试连接一次
    async fn ensure_connected(self: &Arc<Self>) -> Result<(), RpcError> {
        match self.state() {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Disabled => Err(RpcError::disabled()),
            _ if self.options.auto_reconnect => self.clone().connect().await,
            _ => Err(RpcError::not_connected()),
        }
    }

    /// 把消息交给写任务并等待写出结果
    async fn write(&self, msg: RpcMessage) -> Result<(), RpcError> {
        let written = {
            let writer = self.writer.lock();
            match writer.as_ref() {
                Some(writer) => writer.submit(msg)?,
                None => return Err(RpcError::not_connected()),
            }
        };
        written
            .await
            .unwrap_or_else(|_| Err(RpcError::connection_closed()))
    }

    /// 关闭当前连接的写任务，不等待写出中的帧
    fn close_writer(&self) {
        if let Some(writer) = self.writer.lock().take() {
            writer.close();
        }
    }

    async fn send_tracked(&self, msg: RpcMessage, timeout: Duration) -> Result<RpcMessage, RpcError> {
        self.tracker.send(msg, timeout, |msg| self.write(msg)).await
    }

    /// 用保存的密钥恢复会话；失败时清除会话，不影响连接结果
    async fn restore_session(&self) {
        let Some(key) = self.session.key().await else {
            return;
        };

        debug!("🔁 尝试恢复会话");
        match self.request_restoration(key).await {
            Ok(session) => {
                info!("✅ 会话已恢复: key={}", session.key);
                self.session.establish(session).await;
            }
            Err(err) if matches!(err.code, RpcErrorCode::ConnectionClosed | RpcErrorCode::NotConnected) => {
                // 连接在恢复途中断开，保留密钥等下一次连接再恢复
                warn!("恢复会话时连接断开，保留会话");
            }
            Err(err) => {
                warn!("无法恢复会话: {}", RpcError::session_restoration_failed(&err));
                self.session.clear().await;
            }
        }
    }

    async fn request_restoration(&self, key: String) -> Result<Session, RpcError> {
        let msg = RpcMessage::restore_session(key)?;
        let reply = self
            .send_tracked(msg, self.options.default_request_timeout)
            .await?;
        let payload = reply.into_result()?;
        Ok(serde_json::from_value(payload)?)
    }

    /// 处理读循环收到的消息
    async fn dispatch(&self, msg: RpcMessage) {
        debug!(
            "📥 收到消息: type={:?}, method={:?}, id={}",
            msg.message_type, msg.method, msg.id
        );

        match msg.message_type {
            MessageType::Response => {
                let id = msg.id.clone();
                if !self.tracker.complete(&id, Ok(msg)) {
                    warn!("收到未预期的响应消息: {}", id);
                }
            }
            MessageType::Error => {
                let err = msg
                    .error
                    .map(RpcError::from)
                    .unwrap_or_else(|| RpcError::internal_error("未知错误"));
                if !self.tracker.complete(&msg.id, Err(err.clone())) {
                    warn!("收到服务端错误信号: {}", err);
                }
            }
            MessageType::SessionCreated => {
                let session = msg
                    .payload
                    .ok_or_else(|| RpcError::invalid_request("会话消息缺少负载"))
                    .and_then(|payload| serde_json::from_value::<Session>(payload).map_err(RpcError::from));
                match session {
                    Ok(session) => {
                        info!("会话已建立: key={}", session.key);
                        self.session.establish(session.clone()).await;
                        self.hooks.on_session_created(&session);
                    }
                    Err(err) => warn!("无效的会话消息: {}", err),
                }
            }
            MessageType::SessionClosed => {
                if self.session.clear().await {
                    info!("会话已被服务端关闭");
                }
                self.hooks.on_session_closed();
            }
            MessageType::Notification => {
                let method = msg.method.unwrap_or_default();
                let payload = msg.payload.unwrap_or(serde_json::Value::Null);
                self.hooks.on_notification(&method, payload);
            }
            other => {
                debug!("忽略客户端不处理的消息类型: {:?}", other);
            }
        }
    }
}

/// 待写出的帧及写出结果的回执
type OutgoingFrame = (RpcMessage, oneshot::Sender<Result<(), RpcError>>);

/// 连接的写任务句柄
///
/// 写半连接归独立任务所有，调用方只通过通道提交帧，
/// 关闭连接不需要等待卡住的写操作。
struct LinkWriter {
    frames: mpsc::UnboundedSender<OutgoingFrame>,
    cancel: CancellationToken,
}

impl LinkWriter {
    fn spawn(writer: Box<dyn FrameWriter>, cancel: CancellationToken) -> Self {
        let (frames, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(writer, rx, cancel.clone()));
        Self { frames, cancel }
    }

    fn submit(&self, msg: RpcMessage) -> Result<oneshot::Receiver<Result<(), RpcError>>, RpcError> {
        let (ack, written) = oneshot::channel();
        self.frames
            .send((msg, ack))
            .map_err(|_| RpcError::connection_closed())?;
        Ok(written)
    }

    fn close(self) {
        self.cancel.cancel();
    }
}

async fn write_loop(
    mut writer: Box<dyn FrameWriter>,
    mut frames: mpsc::UnboundedReceiver<OutgoingFrame>,
    cancel: CancellationToken,
) {
    loop {
        let (msg, ack) = tokio::select! {
            _ = cancel.cancelled() => break,
            next = frames.recv() => match next {
                Some(frame) => frame,
                None => break,
            },
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = ack.send(Err(RpcError::connection_closed()));
                break;
            }
            result = writer.write(&msg) => result,
        };
        if let Err(e) = &result {
            debug!("写出消息失败: {}", e);
        }
        let _ = ack.send(result);
    }

    // 通道里剩余的帧随接收端一起丢弃，提交方收到 ConnectionClosed
    drop(frames);
    writer.close().await;
    debug!("写任务结束");
}

/// 后台读循环：每条连接恰好一个，独占读半连接
async fn read_loop(inner: Arc<ClientInner>, mut reader: Box<dyn FrameReader>) {
    debug!("读循环启动");

    let err = loop {
        let next = tokio::select! {
            _ = inner.shutdown.cancelled() => break RpcError::disabled(),
            next = reader.read_message() => next,
        };
        match next {
            Ok(msg) => inner.dispatch(msg).await,
            Err(err) => break err,
        }
    };

    match err.code {
        RpcErrorCode::AbnormalClosure => error!("连接异常关闭: {}", err),
        RpcErrorCode::Disabled => debug!("客户端已禁用，读循环退出"),
        _ => info!("连接已断开: {}", err),
    }

    // 先释放失效的连接，再发起重连
    inner.close_writer();
    drop(reader);

    inner.tracker.fail_all(RpcError::connection_closed());
    inner.transition(ConnectionState::Connected, ConnectionState::Disconnected);
    inner.hooks.on_disconnected();

    if inner.options.auto_reconnect && inner.state() != ConnectionState::Disabled {
        let target = inner.clone();
        if inner.reconnector.trigger(move || target.clone().connect()) {
            info!("🔁 已启动自动重连");
        }
    }
    debug!("读循环结束");
}
