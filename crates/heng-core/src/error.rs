//! 统一错误类型定义.
//!
//! 所有 Heng crate 共用的错误类型, 支持跨模块传播.

use thiserror::Error;

/// Heng 框架统一错误类型
#[derive(Debug, Error)]
pub enum HengError {
    /// 无效参数 (包括算术解码引擎的非法初始 range/offset)
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的操作
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// 编解码器错误 (调用方违反约定, 如 Decision 模式缺少上下文变量)
    #[error("编解码器错误: {0}")]
    Codec(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 无效数据 (损坏的码流等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

/// Heng 框架统一 Result 类型
pub type HengResult<T> = Result<T, HengError>;
