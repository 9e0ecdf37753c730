/// 统一错误处理

use thiserror::Error;

/// 统一错误类型
#[derive(Error, Debug)]
pub enum Error {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("协议错误: {0}")]
    Protocol(String),

    #[error("连接错误: {0}")]
    Connection(String),

    #[error("会话错误: {0}")]
    Session(String),

    #[error("请求超时: {0}")]
    Timeout(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一结果类型
pub type Result<T> = std::result::Result<T, Error>;
