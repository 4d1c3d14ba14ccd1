//! # heng-codec
//!
//! Heng H.264 熵解码核心库.
//!
//! 本 crate 只覆盖 H.264 解码中真正具有状态机语义的两个子系统:
//!
//! - **CABAC 算术解码引擎**: 逐位精确的二值算术解码状态机,
//!   将压缩位序列还原为 Decision/Bypass/Termination 三类二元决策流.
//! - **解码图像缓冲 (DPB)**: 有容量上限的参考图像描述符容器,
//!   负责参考标记、淘汰与像素图像的惰性物化.
//!
//! 语法元素装配 (CAVLC 表, slice/SPS/PPS 头解析)、像素域重建与容器格式
//! 均为外部协作组件, 不在本 crate 范围内.
//!
//! ## 使用示例
//!
//! ```rust
//! use heng_core::bitreader::BitReader;
//! use heng_codec::decoders::h264::{BinType, CabacContext, CabacDecoder};
//!
//! let data = [0xAB, 0xCD, 0x00, 0xFF];
//! let br = BitReader::new(&data);
//! let mut cabac = CabacDecoder::with_offset(br, 200).unwrap();
//!
//! let mut ctx = CabacContext::new(0, false);
//! let bin = cabac.read_bin(BinType::Decision, Some(&mut ctx)).unwrap();
//! assert!(cabac.range() >= 256);
//! let _ = bin;
//! ```

pub mod decoders;
pub mod frame;

// 重导出常用类型
pub use frame::VideoFrame;
