/// WsRpc - 命令行客户端
///
/// 连接到服务端，发送单次请求或持续监听通知

use clap::{Parser, Subcommand};
use client::{Client, ClientHooks, Config};
use common::Session;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "client", version, about = "WebSocket RPC 客户端")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 连接服务端并输出收到的通知，直到 Ctrl-C
    Listen,

    /// 发送一次请求并打印响应
    Request {
        /// RPC 方法名
        method: String,

        /// 请求负载（JSON；无法解析时按字符串发送）
        #[arg(default_value = "null")]
        payload: String,

        /// 超时（秒），默认使用 REQUEST_TIMEOUT
        #[arg(short, long)]
        timeout: Option<u64>,
    },
}

/// 把客户端事件写入日志
struct LoggingHooks;

impl ClientHooks for LoggingHooks {
    fn on_disconnected(&self) {
        warn!("⚠️ 与服务端的连接已断开");
    }

    fn on_session_created(&self, session: &Session) {
        info!("🔑 会话已建立: key={}, created={}", session.key, session.creation);
    }

    fn on_session_closed(&self) {
        info!("🔒 会话已被服务端关闭");
    }

    fn on_notification(&self, method: &str, payload: serde_json::Value) {
        info!("📨 [通知] method={}, payload={}", method, payload);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 加载配置
    dotenvy::dotenv().ok();
    let cfg = Config::from_env()?;

    // 初始化日志
    // 可以通过环境变量 RUST_LOG 设置日志级别，例如：
    // RUST_LOG=client=debug cargo run -- listen
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.log_level))
        )
        .init();

    info!("🚀 启动 WsRpc 客户端...");
    info!("🎯 服务端地址: {}", cfg.client.server_url);

    let client = Client::with_hooks(cfg.client.clone(), LoggingHooks);
    client.connect().await.map_err(common::Error::from)?;

    let result = match cli.command {
        Commands::Listen => {
            tokio::signal::ctrl_c().await?;
            info!("收到退出信号");
            Ok(())
        }
        Commands::Request { method, payload, timeout } => {
            let payload = serde_json::from_str::<serde_json::Value>(&payload)
                .unwrap_or(serde_json::Value::String(payload));
            let timeout = timeout
                .map(Duration::from_secs)
                .unwrap_or(cfg.client.default_request_timeout);

            match client.request_with_timeout(&method, payload, timeout).await {
                Ok(reply) => {
                    println!("{}", serde_json::to_string_pretty(&reply)?);
                    Ok(())
                }
                Err(e) => Err(anyhow::Error::new(common::Error::from(e))
                    .context(format!("请求 {} 失败", method))),
            }
        }
    };

    client.disable().await;
    result
}
