/// 传输层
///
/// 抽象一条持久的双向连接：拨号、读取单条消息、写入、关闭。
/// 每次拨号产生一组独立的读写半连接，读半连接只归后台读循环所有。

use async_trait::async_trait;
use common::ws_rpc::{codec, RpcError, RpcErrorCode, RpcMessage, PROTOCOL_HEADER};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::config::ClientOptions;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 一次成功拨号得到的连接
pub struct Link {
    /// 读半连接（交给读循环独占）
    pub reader: Box<dyn FrameReader>,

    /// 写半连接
    pub writer: Box<dyn FrameWriter>,

    /// 服务端在握手中声明的协议版本
    pub protocol: Option<String>,
}

/// 传输层 Trait
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// 拨号并完成握手
    async fn dial(&self, address: &str) -> Result<Link, RpcError>;
}

/// 读半连接
#[async_trait]
pub trait FrameReader: Send + 'static {
    /// 阻塞读取下一条消息，连接关闭或出错时返回错误
    async fn read_message(&mut self) -> Result<RpcMessage, RpcError>;
}

/// 写半连接
#[async_trait]
pub trait FrameWriter: Send + 'static {
    /// 写入一条消息
    async fn write(&mut self, msg: &RpcMessage) -> Result<(), RpcError>;

    /// 关闭连接
    async fn close(&mut self);
}

/// 基于 tokio-tungstenite 的 WebSocket 传输
#[derive(Debug, Clone)]
pub struct WsTransport {
    protocol: String,
    dial_timeout: Duration,
}

impl WsTransport {
    pub fn new(protocol: impl Into<String>, dial_timeout: Duration) -> Self {
        Self {
            protocol: protocol.into(),
            dial_timeout,
        }
    }

    pub fn from_options(options: &ClientOptions) -> Self {
        Self::new(options.protocol.clone(), options.dial_timeout)
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn dial(&self, address: &str) -> Result<Link, RpcError> {
        let mut request = address
            .into_client_request()
            .map_err(RpcError::dial_error)?;
        let protocol = HeaderValue::from_str(&self.protocol).map_err(RpcError::dial_error)?;
        request.headers_mut().insert(PROTOCOL_HEADER, protocol);

        let (stream, response) =
            match tokio::time::timeout(self.dial_timeout, connect_async(request)).await {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => return Err(RpcError::dial_error(e)),
                Err(_) => {
                    return Err(RpcError::dial_error(format!(
                        "握手超时 ({:?})",
                        self.dial_timeout
                    )))
                }
            };

        let protocol = response
            .headers()
            .get(PROTOCOL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        debug!("WebSocket 握手完成: address={}, protocol={:?}", address, protocol);

        let (sink, stream) = stream.split();
        Ok(Link {
            reader: Box::new(WsReader { stream }),
            writer: Box::new(WsWriter { sink }),
            protocol,
        })
    }
}

struct WsReader {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FrameReader for WsReader {
    async fn read_message(&mut self) -> Result<RpcMessage, RpcError> {
        loop {
            match self.stream.next().await {
                Some(Ok(frame)) => match codec::decode(frame) {
                    Ok(Some(msg)) => return Ok(msg),
                    Ok(None) => continue,
                    Err(e) if e.code == RpcErrorCode::ConnectionClosed => return Err(e),
                    Err(e) => {
                        warn!("丢弃无法解析的消息: {}", e);
                        continue;
                    }
                },
                Some(Err(e)) => return Err(classify(e)),
                None => return Err(RpcError::abnormal_closure("连接被对端断开")),
            }
        }
    }
}

struct WsWriter {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameWriter for WsWriter {
    async fn write(&mut self, msg: &RpcMessage) -> Result<(), RpcError> {
        let frame = codec::encode(msg)?;
        self.sink.send(frame).await.map_err(classify)
    }

    async fn close(&mut self) {
        if let Err(e) = self.sink.close().await {
            debug!("关闭 WebSocket 失败: {}", e);
        }
    }
}

/// 将 tungstenite 错误映射为 RPC 错误
fn classify(err: WsError) -> RpcError {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => RpcError::connection_closed(),
        other => RpcError::abnormal_closure(other),
    }
}
