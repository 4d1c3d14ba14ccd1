//! 比特流读取器.
//!
//! 提供从字节缓冲区中按位读取数据的能力, 是 CABAC 算术解码引擎的底层位源.
//!
//! 按大端位序读取 (MSB first), 这是 H.264 码流使用的位序.

use crate::{HengError, HengResult};

/// 同步位源
///
/// CABAC 算术解码引擎按位消费码流, 本 trait 抽象出"取下一位"这一最小操作.
/// 引擎本身不关心位源背后是内存缓冲区还是其它来源.
pub trait BitSource {
    /// 取出下一位
    fn next_bit(&mut self) -> HengResult<bool>;
}

/// 挂起式位源
///
/// 与 [`BitSource`] 语义完全一致, 区别仅在于每次取位都可能让出控制权
/// (例如背后是非阻塞流). 引擎在每个取位点之间的状态始终一致,
/// 调用方可以在任意取位点之间放弃本次解码.
pub trait AsyncBitSource {
    /// 取出下一位 (可挂起)
    fn next_bit(&mut self) -> impl Future<Output = HengResult<bool>>;
}

/// 任何同步位源都可以当作立即就绪的挂起式位源使用
impl<T: BitSource> AsyncBitSource for T {
    async fn next_bit(&mut self) -> HengResult<bool> {
        BitSource::next_bit(self)
    }
}

/// 比特流读取位置快照
///
/// 由 [`BitReader::state`] 产生, 交给 [`BitReader::restore`] 可回到保存时的位置.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitReaderState {
    byte_pos: usize,
    bit_pos: u8,
}

/// 比特流读取器
///
/// 从字节缓冲区中按位读取数据, 使用大端位序 (MSB first).
///
/// # 示例
/// ```
/// use heng_core::bitreader::BitReader;
///
/// let data = [0b10110001, 0b01010101];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// assert_eq!(br.read_bits(4).unwrap(), 0b0001);
/// assert_eq!(br.read_bits(8).unwrap(), 0b01010101);
/// ```
pub struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 当前字节索引
    byte_pos: usize,
    /// 当前字节中的位位置 (0-7, 0 表示最高位)
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// 获取已读取的总位数
    pub fn bits_read(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    /// 获取剩余可读位数
    pub fn bits_left(&self) -> usize {
        if self.byte_pos >= self.data.len() {
            return 0;
        }
        (self.data.len() - self.byte_pos) * 8 - self.bit_pos as usize
    }

    /// 是否已到达末尾
    pub fn is_eof(&self) -> bool {
        self.bits_left() == 0
    }

    /// 保存当前读取位置
    pub fn state(&self) -> BitReaderState {
        BitReaderState {
            byte_pos: self.byte_pos,
            bit_pos: self.bit_pos,
        }
    }

    /// 回到之前保存的读取位置
    pub fn restore(&mut self, state: BitReaderState) {
        self.byte_pos = state.byte_pos;
        self.bit_pos = state.bit_pos;
    }

    /// 读取 1 个位
    pub fn read_bit(&mut self) -> HengResult<u32> {
        if self.byte_pos >= self.data.len() {
            return Err(HengError::Eof);
        }

        let bit = (self.data[self.byte_pos] >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos >= 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }

        Ok(u32::from(bit))
    }

    /// 读取 N 个位 (最多 32 位)
    ///
    /// 按大端位序读取, 返回值的低 N 位有效.
    pub fn read_bits(&mut self, n: u32) -> HengResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        if n > 32 {
            return Err(HengError::InvalidArgument(format!(
                "read_bits: n={} 超过 32 位",
                n,
            )));
        }
        if (n as usize) > self.bits_left() {
            return Err(HengError::Eof);
        }

        let mut result: u32 = 0;
        let mut remaining = n;

        while remaining > 0 {
            let available = 8 - self.bit_pos as u32;
            let to_read = remaining.min(available);

            // 从当前字节中提取位
            let shift = available - to_read;
            let mask = ((1u32 << to_read) - 1) as u8;
            let bits = (self.data[self.byte_pos] >> shift) & mask;

            result = (result << to_read) | u32::from(bits);

            self.bit_pos += to_read as u8;
            if self.bit_pos >= 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
            remaining -= to_read;
        }

        Ok(result)
    }

    /// 窥视 N 个位 (不移动位置)
    pub fn peek_bits(&mut self, n: u32) -> HengResult<u32> {
        let saved = self.state();
        let result = self.read_bits(n);
        self.restore(saved);
        result
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: u32) -> HengResult<()> {
        if (n as usize) > self.bits_left() {
            return Err(HengError::Eof);
        }

        let total_bits = self.bit_pos as u32 + n;
        self.byte_pos += (total_bits / 8) as usize;
        self.bit_pos = (total_bits % 8) as u8;

        Ok(())
    }

    /// 对齐到下一个字节边界
    ///
    /// 如果当前已在字节边界, 则不做任何事.
    pub fn align_to_byte(&mut self) {
        if self.bit_pos > 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }

    /// 获取当前字节位置
    pub fn byte_position(&self) -> usize {
        self.byte_pos
    }
}

impl BitSource for BitReader<'_> {
    fn next_bit(&mut self) -> HengResult<bool> {
        Ok(self.read_bit()? != 0)
    }
}
