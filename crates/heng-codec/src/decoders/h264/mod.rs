//! H.264/AVC 熵解码核心.
//!
//! 包含两个紧耦合的子系统:
//!
//! - [`cabac`]: CABAC 二值算术解码引擎 (Decision/Bypass/Termination 三种 bin 模式,
//!   含状态转移表与重归一化), 以及诊断用的 bin 历史窗口.
//! - [`dpb`]: 解码图像缓冲, 管理参考图像描述符的插入、标记、淘汰与
//!   像素图像的惰性物化.
//!
//! 引擎每次 `read_bin` 只产出一个二元决策; 由哪些 bin 组装出哪个语法元素,
//! 是外部语法层的职责. DPB 的图像标记操作正是由这些语法元素驱动的.

pub mod cabac;
pub mod dpb;

#[cfg(test)]
mod tests;

pub use cabac::{BinHistory, BinTracker, BinType, CabacContext, CabacDecoder};
pub use dpb::{
    AsyncPictureFactory, DecodedPictureBuffer, DpbPicture, FieldParity, MmcoEntry, NoFactory,
    PictureCache, PictureDescriptor, PictureFactory, Poc, RefDuration, RefPicListMod, SliceType,
};
