use heng_core::HengResult;
use heng_core::bitreader::{AsyncBitSource, BitReader, BitSource};

use crate::frame::VideoFrame;

use super::super::{
    DecodedPictureBuffer, DpbPicture, PictureFactory, SliceType,
};

/// 构造单平面测试帧, 全部像素填充同一值
pub fn build_test_frame(width: u32, height: u32, fill: u8) -> VideoFrame {
    let mut frame = VideoFrame::new(width, height, 1);
    frame.linesize[0] = width as usize;
    frame.data[0] = vec![fill; (width * height) as usize];
    frame
}

/// 构造已持有图像的帧描述符并入队
pub fn add_test_frame(dpb: &mut DecodedPictureBuffer, fill: u8) {
    dpb.add(
        DpbPicture::Frame {
            image: Some(std::sync::Arc::new(build_test_frame(4, 4, fill))),
        },
        SliceType::P,
        false,
        None,
        None,
    )
    .expect("入队测试帧不应失败");
}

/// 计数图像工厂: 记录 produce 被调用的次数
pub struct CountingFactory {
    pub fill: u8,
    pub calls: usize,
}

impl CountingFactory {
    pub fn new(fill: u8) -> Self {
        Self { fill, calls: 0 }
    }
}

impl PictureFactory for CountingFactory {
    fn produce(&mut self, _frame_number: u32) -> HengResult<VideoFrame> {
        self.calls += 1;
        Ok(build_test_frame(4, 4, self.fill))
    }
}

/// 每次取位前都让出控制权的挂起式位源
pub struct YieldingBitSource<'a> {
    inner: BitReader<'a>,
}

impl<'a> YieldingBitSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            inner: BitReader::new(data),
        }
    }
}

impl AsyncBitSource for YieldingBitSource<'_> {
    async fn next_bit(&mut self) -> HengResult<bool> {
        tokio::task::yield_now().await;
        BitSource::next_bit(&mut self.inner)
    }
}
