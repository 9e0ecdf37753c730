/// 配置管理

use common::ws_rpc::PROTOCOL_VERSION;
use common::{Error, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::ws::ReconnectPolicy;

/// 客户端选项
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// 服务端 WebSocket 地址
    pub server_url: String,

    /// 要求服务端支持的协议版本
    pub protocol: String,

    /// 默认请求超时
    pub default_request_timeout: Duration,

    /// 拨号（含握手）超时
    pub dial_timeout: Duration,

    /// 连接断开后是否自动重连
    pub auto_reconnect: bool,

    /// 重连策略
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:3000/ws".to_string(),
            protocol: PROTOCOL_VERSION.to_string(),
            default_request_timeout: Duration::from_secs(30),
            dial_timeout: Duration::from_secs(10),
            auto_reconnect: true,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientOptions {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }
}

/// 命令行程序的配置
#[derive(Debug, Clone)]
pub struct Config {
    pub client: ClientOptions,
    pub log_level: String,
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        let server_url = std::env::var("SERVER_WS_URL")
            .unwrap_or_else(|_| "ws://localhost:3000/ws".to_string());

        let request_timeout: u64 = env_or("REQUEST_TIMEOUT", "30")?;
        let dial_timeout: u64 = env_or("DIAL_TIMEOUT", "10")?;
        let auto_reconnect: bool = env_or("AUTO_RECONNECT", "true")?;
        let reconnect_interval: u64 = env_or("RECONNECT_INTERVAL_MS", "500")?;
        let reconnect_max_interval: u64 = env_or("RECONNECT_MAX_INTERVAL_MS", "30000")?;

        // 0 表示不限次数
        let reconnect_max_attempts: u32 = env_or("RECONNECT_MAX_ATTEMPTS", "0")?;

        let log_level = std::env::var("LOG_LEVEL")
            .unwrap_or_else(|_| "info".to_string());

        if reconnect_interval > reconnect_max_interval {
            return Err(Error::Config(format!(
                "RECONNECT_INTERVAL_MS ({}) 不能大于 RECONNECT_MAX_INTERVAL_MS ({})",
                reconnect_interval, reconnect_max_interval
            )));
        }

        Ok(Self {
            client: ClientOptions {
                server_url,
                protocol: PROTOCOL_VERSION.to_string(),
                default_request_timeout: Duration::from_secs(request_timeout),
                dial_timeout: Duration::from_secs(dial_timeout),
                auto_reconnect,
                reconnect: ReconnectPolicy {
                    initial_backoff: Duration::from_millis(reconnect_interval),
                    max_backoff: Duration::from_millis(reconnect_max_interval),
                    max_attempts: (reconnect_max_attempts > 0).then_some(reconnect_max_attempts),
                },
            },
            log_level,
        })
    }
}

/// 读取并解析环境变量，未设置时使用默认值
fn env_or<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|e| Error::Config(format!("{} 的值无效: {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = ClientOptions::new("ws://127.0.0.1:9000/ws");
        assert_eq!(options.server_url, "ws://127.0.0.1:9000/ws");
        assert_eq!(options.protocol, PROTOCOL_VERSION);
        assert!(options.auto_reconnect);
        assert_eq!(options.reconnect.max_attempts, None);
        assert_eq!(options.default_request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_env_or_parses_and_rejects() {
        std::env::set_var("WSRPC_TEST_ATTEMPTS", "7");
        let attempts: u32 = env_or("WSRPC_TEST_ATTEMPTS", "0").unwrap();
        assert_eq!(attempts, 7);

        let fallback: u64 = env_or("WSRPC_TEST_UNSET", "500").unwrap();
        assert_eq!(fallback, 500);

        std::env::set_var("WSRPC_TEST_TIMEOUT", "soon");
        let err = env_or::<u64>("WSRPC_TEST_TIMEOUT", "30").unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("WSRPC_TEST_TIMEOUT")));
    }
}
