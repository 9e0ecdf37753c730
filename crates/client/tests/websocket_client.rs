//! 客户端与真实 WebSocket 服务端的集成测试
//!
//! 服务端只是测试夹具：按协议头完成握手，把收到的消息交给各测试提供的处理函数。

use client::{Client, ClientHooks, ClientOptions, ConnectionState, ReconnectPhase, WsTransport};
use common::ws_rpc::{codec, MessageType, RestoreSessionRequest, RpcMessage, PROTOCOL_HEADER, PROTOCOL_VERSION};
use common::{RpcErrorCode, Session};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;

type Handler = Arc<dyn Fn(&RpcMessage, &mpsc::UnboundedSender<RpcMessage>) + Send + Sync>;

struct TestServer {
    url: String,
    connections: Arc<AtomicUsize>,
    kick: broadcast::Sender<()>,
}

impl TestServer {
    async fn start(protocol: Option<&'static str>, handler: Handler) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let (kick, _) = broadcast::channel(4);

        let accepted = connections.clone();
        let kick_tx = kick.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, protocol, handler.clone(), kick_tx.subscribe()));
            }
        });

        Self {
            url: format!("ws://{}/ws", addr),
            connections,
            kick,
        }
    }

    /// 不经关闭握手直接断开所有连接
    fn kick(&self) {
        let _ = self.kick.send(());
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

async fn serve(
    stream: TcpStream,
    protocol: Option<&'static str>,
    handler: Handler,
    mut kick: broadcast::Receiver<()>,
) {
    let callback = move |_req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
        if let Some(protocol) = protocol {
            resp.headers_mut()
                .insert(PROTOCOL_HEADER, HeaderValue::from_static(protocol));
        }
        Ok(resp)
    };
    let ws = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(_) => return,
    };

    let (mut sink, mut source) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<RpcMessage>();
    loop {
        tokio::select! {
            _ = kick.recv() => return,
            Some(out) = rx.recv() => {
                if sink.send(codec::encode(&out).unwrap()).await.is_err() {
                    return;
                }
            }
            frame = source.next() => match frame {
                Some(Ok(frame)) => match codec::decode(frame) {
                    Ok(Some(msg)) => handler(&msg, &tx),
                    Ok(None) => {}
                    Err(_) => return,
                },
                _ => return,
            },
        }
    }
}

/// 登录时创建会话，恢复请求时接受任何以 "key-" 开头的密钥
fn session_handler(close_after_login: Option<Duration>) -> Handler {
    Arc::new(move |msg: &RpcMessage, tx: &mpsc::UnboundedSender<RpcMessage>| match msg.message_type {
        MessageType::Request if msg.method.as_deref() == Some("login") => {
            let session = Session::new("key-alice", json!({"user": "alice"}));
            tx.send(RpcMessage::session_created(&session).unwrap()).unwrap();
            tx.send(RpcMessage::response(&msg.id, json!({"welcome": "alice"}))).unwrap();

            if let Some(delay) = close_after_login {
                let tx = tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(RpcMessage::session_closed());
                });
            }
        }
        MessageType::Request if msg.method.as_deref() == Some("echo") => {
            let payload = msg.payload.clone().unwrap_or_default();
            tx.send(RpcMessage::response(&msg.id, payload)).unwrap();
        }
        MessageType::Request => {
            // 其余请求不应答
        }
        MessageType::RestoreSession => {
            let request: RestoreSessionRequest =
                serde_json::from_value(msg.payload.clone().unwrap()).unwrap();
            let reply = if request.key.starts_with("key-") {
                RpcMessage::response(
                    &msg.id,
                    serde_json::to_value(Session::new(request.key, json!({"restored": true}))).unwrap(),
                )
            } else {
                RpcMessage::error_response(&msg.id, "SESSION_NOT_FOUND", "会话不存在", None)
            };
            tx.send(reply).unwrap();
        }
        _ => {}
    })
}

#[derive(Default)]
struct Counters {
    disconnected: AtomicUsize,
    session_closed: AtomicUsize,
}

impl ClientHooks for Counters {
    fn on_disconnected(&self) {
        self.disconnected.fetch_add(1, Ordering::SeqCst);
    }

    fn on_session_closed(&self) {
        self.session_closed.fetch_add(1, Ordering::SeqCst);
    }
}

fn new_client(url: &str, hooks: Arc<Counters>) -> Client {
    let mut options = ClientOptions::new(url);
    options.default_request_timeout = Duration::from_secs(2);
    options.dial_timeout = Duration::from_secs(2);
    options.reconnect.initial_backoff = Duration::from_millis(20);
    options.reconnect.max_backoff = Duration::from_millis(100);
    let transport = Arc::new(WsTransport::from_options(&options));
    Client::from_parts(options, transport, hooks)
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("等待条件超时");
}

#[tokio::test]
async fn test_login_request_returns_reply() {
    let server = TestServer::start(Some(PROTOCOL_VERSION), session_handler(None)).await;
    let client = new_client(&server.url, Arc::new(Counters::default()));

    client.connect().await.unwrap();
    assert_eq!(client.status(), ConnectionState::Connected);

    let reply = client.request("login", json!("credentials")).await.unwrap();
    assert_eq!(reply, json!({"welcome": "alice"}));

    let session = client.session().await.expect("登录后应有会话");
    assert_eq!(session.key, "key-alice");

    client.disable().await;
    assert_eq!(client.status(), ConnectionState::Disabled);
    assert!(client.session().await.is_none());
}

#[tokio::test]
async fn test_server_closes_session_after_login() {
    let server = TestServer::start(
        Some(PROTOCOL_VERSION),
        session_handler(Some(Duration::from_millis(50))),
    )
    .await;
    let hooks = Arc::new(Counters::default());
    let client = new_client(&server.url, hooks.clone());

    client.connect().await.unwrap();
    client.request("login", json!("credentials")).await.unwrap();

    wait_for(|| hooks.session_closed.load(Ordering::SeqCst) >= 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(hooks.session_closed.load(Ordering::SeqCst), 1);
    assert!(client.session().await.is_none());
    assert_eq!(client.status(), ConnectionState::Connected);

    client.disable().await;
}

#[tokio::test]
async fn test_concurrent_requests_get_own_replies() {
    let server = TestServer::start(Some(PROTOCOL_VERSION), session_handler(None)).await;
    let client = new_client(&server.url, Arc::new(Counters::default()));
    client.connect().await.unwrap();

    let calls: Vec<_> = (0..20)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move { (i, client.request("echo", json!({ "n": i })).await) })
        })
        .collect();

    for call in calls {
        let (i, reply) = call.await.unwrap();
        assert_eq!(reply.unwrap(), json!({ "n": i }));
    }
    assert_eq!(client.pending_requests(), 0);
    client.disable().await;
}

#[tokio::test]
async fn test_unanswered_request_times_out() {
    let server = TestServer::start(Some(PROTOCOL_VERSION), session_handler(None)).await;
    let client = new_client(&server.url, Arc::new(Counters::default()));
    client.connect().await.unwrap();

    let started = std::time::Instant::now();
    let err = client
        .request_with_timeout("ignored", json!(null), Duration::from_millis(200))
        .await
        .unwrap_err();
    assert_eq!(err.code, RpcErrorCode::Timeout);
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(client.status(), ConnectionState::Connected);

    client.disable().await;
}

#[tokio::test]
async fn test_protocol_mismatch() {
    let server = TestServer::start(Some("wsrpc/0"), session_handler(None)).await;
    let client = new_client(&server.url, Arc::new(Counters::default()));

    let err = client.connect().await.unwrap_err();
    assert_eq!(err.code, RpcErrorCode::IncompatibleProtocol);
    assert_eq!(client.status(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_unreachable_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = new_client(&format!("ws://{}/ws", addr), Arc::new(Counters::default()));
    let err = client.connect().await.unwrap_err();
    assert_eq!(err.code, RpcErrorCode::DialError);
    assert_eq!(client.status(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_reconnect_restores_session() {
    let server = TestServer::start(Some(PROTOCOL_VERSION), session_handler(None)).await;
    let hooks = Arc::new(Counters::default());
    let client = new_client(&server.url, hooks.clone());

    client.connect().await.unwrap();
    client.request("login", json!("credentials")).await.unwrap();
    assert!(client.session().await.is_some());

    server.kick();
    wait_for(|| hooks.disconnected.load(Ordering::SeqCst) == 1).await;
    wait_for(|| client.reconnect_phase() == ReconnectPhase::Connected).await;

    assert_eq!(server.connections(), 2);
    assert_eq!(client.status(), ConnectionState::Connected);
    let session = client.session().await.expect("会话应已恢复");
    assert_eq!(session.key, "key-alice");
    assert_eq!(session.metadata, json!({"restored": true}));

    let reply = client.request("echo", json!("after reconnect")).await.unwrap();
    assert_eq!(reply, json!("after reconnect"));

    client.disable().await;
}
