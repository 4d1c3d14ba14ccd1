//! # Heng (衡)
//!
//! 纯 Rust 实现的 H.264 熵解码核心.
//!
//! Heng 覆盖 H.264 解码中真正具有状态机语义与资源生命周期不变量的部分:
//! - **CABAC 算术解码引擎**: 标准规定的逐位精确二值算术解码状态机
//! - **解码图像缓冲 (DPB)**: 有界的参考图像描述符容器与惰性图像物化
//!
//! # 快速开始
//!
//! ```rust
//! use heng::core::bitreader::BitReader;
//! use heng::codec::decoders::h264::{BinType, CabacDecoder};
//!
//! let data = [0xAB, 0xCD, 0x00, 0xFF];
//! let br = BitReader::new(&data);
//! let mut cabac = CabacDecoder::with_offset(br, 200).unwrap();
//! let bin = cabac.read_bin(BinType::Bypass, None).unwrap();
//! assert!(!bin);
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `heng-core` | 统一错误类型与比特流读取器 |
//! | `heng-codec` | CABAC 算术解码引擎与 DPB |

/// 基础类型与工具
pub use heng_core as core;

/// 熵解码引擎与解码图像缓冲
pub use heng_codec as codec;

/// 获取 Heng 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
