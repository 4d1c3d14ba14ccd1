//! 解码后的帧数据 (Frame).
//!
//! 表示解码后的原始视频像素数据, 支持多平面存储.
//! 例如 YUV420P 格式有 3 个平面: Y, U, V.
//!
//! DPB 的图像物化路径只关心平面字节与行距, 时间戳与色彩描述等
//! 展示层元数据由外部流水线补充.

/// 视频帧
///
/// 包含解码后的原始像素数据, 按平面存储, 每平面 8 位深.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    /// 各平面的像素数据
    pub data: Vec<Vec<u8>>,
    /// 各平面每行的字节数 (linesize / stride)
    pub linesize: Vec<usize>,
    /// 宽度 (像素)
    pub width: u32,
    /// 高度 (像素)
    pub height: u32,
}

impl VideoFrame {
    /// 创建空的视频帧 (各平面数据待填充)
    pub fn new(width: u32, height: u32, plane_count: usize) -> Self {
        Self {
            data: vec![Vec::new(); plane_count],
            linesize: vec![0; plane_count],
            width,
            height,
        }
    }

    /// 平面数量
    pub fn plane_count(&self) -> usize {
        self.data.len()
    }

    /// 指定平面的行数
    ///
    /// 由平面数据长度与行距推出; 行距为 0 时视为没有行.
    pub fn plane_rows(&self, plane: usize) -> usize {
        let linesize = self.linesize.get(plane).copied().unwrap_or(0);
        if linesize == 0 {
            return 0;
        }
        self.data.get(plane).map_or(0, |d| d.len() / linesize)
    }

    /// 指定平面中某一行的字节切片
    pub fn row(&self, plane: usize, row: usize) -> Option<&[u8]> {
        let linesize = *self.linesize.get(plane)?;
        if linesize == 0 {
            return None;
        }
        let start = row.checked_mul(linesize)?;
        self.data.get(plane)?.get(start..start + linesize)
    }
}
