//! # heng-core
//!
//! Heng H.264 解码核心的基础库, 提供统一错误类型与比特流读取器.
//!
//! 上层的 CABAC 算术解码引擎与 DPB (解码图像缓冲) 都建立在本 crate 之上.

pub mod bitreader;
pub mod error;

// 重导出常用类型
pub use bitreader::{AsyncBitSource, BitReader, BitReaderState, BitSource};
pub use error::{HengError, HengResult};
