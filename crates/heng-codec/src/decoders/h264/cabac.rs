//! CABAC 二值算术解码引擎.
//!
//! 实现 H.264 标准 9.3.3.2 规定的算术解码状态机: 维护 `(range, offset)`
//! 子区间, 按 Decision/Bypass/Termination 三种模式逐 bin 解码,
//! Decision 模式同时原位更新外部传入的上下文变量.
//!
//! 引擎对语法元素一无所知: 每次 `read_bin` 只消费若干位并产出一个布尔值,
//! 上下文索引到语法元素的映射由外部语法层负责.
//!
//! 所有取位操作都有同步与挂起式两套入口, 语义完全一致;
//! 挂起式入口仅在底层位源让出控制权时挂起, 每个取位点之间引擎状态
//! 始终一致, 可随时放弃本次解码.

use heng_core::bitreader::{AsyncBitSource, BitSource};
use heng_core::{HengError, HengResult};

/// 算术解码器 range 的标准初始值
pub const CABAC_RANGE_INIT: u32 = 510;

/// 恒定映射到 Termination 模式的上下文索引 (end_of_slice_flag)
pub const TERMINATE_CTX_IDX: usize = 276;

// ============================================================
// 标准固定表 (Table 9-44 / 9-45)
// ============================================================

/// rangeTabLPS: 按 (pStateIdx, qCodIRangeIdx) 索引的 LPS 子区间宽度
const RANGE_LPS: [[u8; 4]; 64] = [
    [128, 176, 208, 240],
    [128, 167, 197, 227],
    [128, 158, 187, 216],
    [123, 150, 178, 205],
    [116, 142, 169, 195],
    [111, 135, 160, 185],
    [105, 128, 152, 175],
    [100, 122, 144, 166],
    [95, 116, 137, 158],
    [90, 110, 130, 150],
    [85, 104, 123, 142],
    [81, 99, 117, 135],
    [77, 94, 111, 128],
    [73, 89, 105, 122],
    [69, 85, 100, 116],
    [66, 80, 95, 110],
    [62, 76, 90, 104],
    [59, 72, 86, 99],
    [56, 69, 81, 94],
    [53, 65, 77, 89],
    [51, 62, 73, 85],
    [48, 59, 69, 80],
    [46, 56, 66, 76],
    [43, 53, 63, 72],
    [41, 50, 59, 69],
    [39, 48, 56, 65],
    [37, 45, 54, 62],
    [35, 43, 51, 59],
    [33, 41, 48, 56],
    [32, 39, 46, 53],
    [30, 37, 43, 50],
    [29, 35, 41, 48],
    [27, 33, 39, 45],
    [26, 31, 37, 43],
    [24, 30, 35, 41],
    [23, 28, 33, 39],
    [22, 27, 32, 37],
    [21, 26, 30, 35],
    [20, 24, 29, 33],
    [19, 23, 27, 31],
    [18, 22, 26, 30],
    [17, 21, 25, 28],
    [16, 20, 23, 27],
    [15, 19, 22, 25],
    [14, 18, 21, 24],
    [14, 17, 20, 23],
    [13, 16, 19, 22],
    [12, 15, 18, 21],
    [12, 14, 17, 20],
    [11, 14, 16, 19],
    [11, 13, 15, 18],
    [10, 12, 15, 17],
    [10, 12, 14, 16],
    [9, 11, 13, 15],
    [9, 11, 12, 14],
    [8, 10, 12, 14],
    [8, 9, 11, 13],
    [7, 9, 11, 12],
    [7, 9, 10, 12],
    [7, 8, 10, 11],
    [6, 8, 9, 11],
    [6, 7, 9, 10],
    [6, 7, 8, 9],
    [2, 2, 2, 2],
];

/// transIdxMPS: MPS 路径的状态转移
const TRANS_IDX_MPS: [u8; 64] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26,
    27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50,
    51, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 62, 62, 63,
];

/// transIdxLPS: LPS 路径的状态转移
const TRANS_IDX_LPS: [u8; 64] = [
    0, 0, 1, 2, 2, 4, 4, 5, 6, 7, 8, 9, 9, 11, 11, 12, 13, 13, 15, 15, 16, 16, 18, 18, 19, 19, 21,
    21, 22, 22, 23, 24, 24, 25, 26, 26, 27, 27, 28, 29, 29, 30, 30, 30, 31, 32, 32, 33, 33, 33, 34,
    34, 35, 35, 35, 36, 36, 36, 37, 37, 37, 38, 38, 63,
];

// ============================================================
// 上下文变量与 bin 历史
// ============================================================

/// 上下文变量: 单个语法元素上下文的自适应概率状态
///
/// 每个上下文索引对应一个实例 (数百个, 由 slice 级解码会话持有),
/// 在 slice 起始处按标准初始化表赋值, slice 结束后丢弃.
/// 仅 Decision 读取会原位修改它; Bypass/Termination 不触碰.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CabacContext {
    /// 概率状态索引 (0-63)
    p_state_idx: u8,
    /// 最可能符号 (MPS)
    val_mps: bool,
}

impl CabacContext {
    /// 创建上下文变量
    ///
    /// 状态索引按饱和策略处理: 超出 63 的值截断到表上界 63,
    /// 不作为错误拒绝. 初始化表推导在个别 QP 下会算出越界的中间值,
    /// 标准 9.3.1.1 同样要求夹取.
    pub fn new(p_state_idx: u8, val_mps: bool) -> Self {
        Self {
            p_state_idx: p_state_idx.min(63),
            val_mps,
        }
    }

    /// 概率状态索引
    pub fn p_state_idx(&self) -> u8 {
        self.p_state_idx
    }

    /// 最可能符号
    pub fn val_mps(&self) -> bool {
        self.val_mps
    }
}

/// 最近解码 bin 的滚动窗口 (32 位移位寄存器, 第 0 位为最新)
///
/// 仅用于诊断与日志, 不参与解码.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinHistory {
    bits: u32,
}

impl BinHistory {
    /// 创建空历史
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个 bin: 整体左移一位, 新 bin 进入第 0 位
    pub fn append(&mut self, bin: bool) {
        self.bits = (self.bits << 1) | u32::from(bin);
    }

    /// 窗口原始位值
    pub fn bits(&self) -> u32 {
        self.bits
    }
}

impl std::fmt::Display for BinHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032b}", self.bits)
    }
}

/// bin 追踪器
///
/// 启用追踪时把每个解码出的 bin 记入 [`BinHistory`]; 未启用时为零开销空操作.
#[derive(Debug, Clone, Default)]
pub struct BinTracker {
    history: Option<BinHistory>,
}

impl BinTracker {
    /// 创建不追踪的追踪器
    pub fn untracked() -> Self {
        Self { history: None }
    }

    /// 创建启用追踪的追踪器
    pub fn tracked() -> Self {
        Self {
            history: Some(BinHistory::new()),
        }
    }

    /// 记录一个 bin
    pub fn record(&mut self, bin: bool) {
        if let Some(history) = &mut self.history {
            history.append(bin);
        }
    }

    /// 追踪到的历史窗口 (未启用追踪时为 None)
    pub fn history(&self) -> Option<&BinHistory> {
        self.history.as_ref()
    }
}

// ============================================================
// bin 模式
// ============================================================

/// CABAC bin 编码模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinType {
    /// 上下文自适应决策
    Decision,
    /// 等概率旁路
    Bypass,
    /// 数据结束信号
    Termination,
}

impl BinType {
    /// 由 (上下文索引, 旁路标志) 推导 bin 模式
    ///
    /// 索引 276 (end_of_slice_flag) 恒定映射到 Termination, 与旁路标志无关.
    pub fn from_ctx(ctx_idx: usize, bypass: bool) -> Self {
        if ctx_idx == TERMINATE_CTX_IDX {
            BinType::Termination
        } else if bypass {
            BinType::Bypass
        } else {
            BinType::Decision
        }
    }
}

// ============================================================
// 算术解码引擎
// ============================================================

/// CABAC 算术解码引擎
///
/// 持有外部位源与 `(range, offset)` 子区间状态. 同一实例的 `read_bin`
/// 调用必须严格串行 (引擎不可重入, 并发调用会破坏 `range`/`offset`);
/// 引擎内部不产生任何并发.
pub struct CabacDecoder<S> {
    /// 底层位源
    bits: S,
    /// 当前子区间宽度 (概念上 1-510, 重归一化后恒在 [256, 510])
    range: u32,
    /// 子区间内的当前位置 (0-509)
    offset: u32,
    /// bin 追踪器
    tracker: BinTracker,
}

impl<S> CabacDecoder<S> {
    /// 创建算术解码引擎
    ///
    /// `offset` 超出 [0, 509] 或 `range` 小于 1 都说明码流损坏或失去同步,
    /// 返回 [`HengError::InvalidArgument`]. 510/511 是标准的保留值.
    pub fn new(bits: S, range: u32, offset: u32, tracker: BinTracker) -> HengResult<Self> {
        if range < 1 {
            return Err(HengError::InvalidArgument(format!(
                "CABAC 初始 range={} 非法, 必须不小于 1",
                range,
            )));
        }
        if offset > 511 {
            return Err(HengError::InvalidArgument(format!(
                "CABAC 初始 offset={} 超出 9 位取值范围",
                offset,
            )));
        }
        if offset == 510 || offset == 511 {
            return Err(HengError::InvalidArgument(format!(
                "CABAC 初始 offset={} 为标准保留值, 码流已损坏或失去同步",
                offset,
            )));
        }
        Ok(Self {
            bits,
            range,
            offset,
            tracker,
        })
    }

    /// 以标准初始 range (510) 和不追踪的追踪器创建引擎
    pub fn with_offset(bits: S, offset: u32) -> HengResult<Self> {
        Self::new(bits, CABAC_RANGE_INIT, offset, BinTracker::untracked())
    }

    /// 当前子区间宽度
    pub fn range(&self) -> u32 {
        self.range
    }

    /// 子区间内的当前位置
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// bin 追踪器
    pub fn tracker(&self) -> &BinTracker {
        &self.tracker
    }

    /// 取回底层位源
    pub fn into_inner(self) -> S {
        self.bits
    }

    /// Decision 模式中不消费位的部分: 子区间划分, LPS/MPS 判定与状态转移
    ///
    /// 返回解出的 bin; 随后必须执行重归一化.
    /// range 不足以扣减 LPS 子区间时说明码流已损坏, 返回
    /// [`HengError::InvalidData`] 而不是让区间下溢.
    fn decision_step(&mut self, ctx: &mut CabacContext) -> HengResult<bool> {
        let state = ctx.p_state_idx as usize;
        let q_idx = ((self.range >> 6) & 3) as usize;
        let lps = u32::from(RANGE_LPS[state][q_idx]);
        self.range = self
            .range
            .checked_sub(lps)
            .ok_or_else(|| Self::range_underflow_err(self.range, lps))?;

        let bin = if self.offset >= self.range {
            // LPS 路径: 输出 MPS 的反面, 状态 0 时翻转 MPS
            let bin = !ctx.val_mps;
            self.offset -= self.range;
            self.range = lps;
            if ctx.p_state_idx == 0 {
                ctx.val_mps = !ctx.val_mps;
            }
            ctx.p_state_idx = TRANS_IDX_LPS[state];
            bin
        } else {
            let bin = ctx.val_mps;
            ctx.p_state_idx = TRANS_IDX_MPS[state];
            bin
        };
        Ok(bin)
    }

    /// Bypass 模式中位已读入后的判定部分
    fn bypass_step(&mut self, bit: bool) -> bool {
        self.offset = (self.offset << 1) | u32::from(bit);
        if self.offset >= self.range {
            self.offset -= self.range;
            true
        } else {
            false
        }
    }

    /// Termination 模式中不消费位的部分
    ///
    /// 返回 true 表示 slice 数据结束 (此时按标准跳过重归一化).
    /// range 小于 2 时无法再划分终止子区间, 返回 [`HengError::InvalidData`].
    fn termination_step(&mut self) -> HengResult<bool> {
        self.range = self
            .range
            .checked_sub(2)
            .ok_or_else(|| Self::range_underflow_err(self.range, 2))?;
        Ok(self.offset >= self.range)
    }

    fn missing_context_err() -> HengError {
        HengError::Codec("Decision 模式缺少上下文变量".into())
    }

    fn range_underflow_err(range: u32, sub: u32) -> HengError {
        HengError::InvalidData(format!(
            "CABAC range={} 不足以划分宽度 {} 的子区间, 码流已损坏或失去同步",
            range, sub,
        ))
    }
}

impl<S: BitSource> CabacDecoder<S> {
    /// 解码一个 bin (同步)
    ///
    /// Decision 模式要求提供上下文变量并会原位修改它,
    /// 否则返回 [`HengError::Codec`]; Bypass/Termination 忽略上下文参数.
    pub fn read_bin(
        &mut self,
        bin_type: BinType,
        ctx: Option<&mut CabacContext>,
    ) -> HengResult<bool> {
        let bin = match bin_type {
            BinType::Decision => {
                let ctx = ctx.ok_or_else(Self::missing_context_err)?;
                let bin = self.decision_step(ctx)?;
                self.renormalize()?;
                bin
            }
            BinType::Bypass => {
                let bit = self.bits.next_bit()?;
                self.bypass_step(bit)
            }
            BinType::Termination => {
                let done = self.termination_step()?;
                if !done {
                    self.renormalize()?;
                }
                done
            }
        };
        self.tracker.record(bin);
        Ok(bin)
    }

    /// 按 (上下文索引, 旁路标志) 解码一个 bin (同步)
    pub fn read_bin_ctx(
        &mut self,
        ctx_idx: usize,
        bypass: bool,
        ctx: Option<&mut CabacContext>,
    ) -> HengResult<bool> {
        self.read_bin(BinType::from_ctx(ctx_idx, bypass), ctx)
    }

    /// 重归一化: 将 range 放大回 [256, 510], 每次迭代消费一位
    fn renormalize(&mut self) -> HengResult<()> {
        while self.range < 256 {
            self.range <<= 1;
            let bit = self.bits.next_bit()?;
            self.offset = (self.offset << 1) | u32::from(bit);
        }
        Ok(())
    }
}

impl<S: AsyncBitSource> CabacDecoder<S> {
    /// 解码一个 bin (挂起式)
    ///
    /// 与 [`read_bin`](CabacDecoder::read_bin) 语义一致,
    /// 仅在底层位源挂起时让出控制权.
    pub async fn read_bin_async(
        &mut self,
        bin_type: BinType,
        ctx: Option<&mut CabacContext>,
    ) -> HengResult<bool> {
        let bin = match bin_type {
            BinType::Decision => {
                let ctx = ctx.ok_or_else(Self::missing_context_err)?;
                let bin = self.decision_step(ctx)?;
                self.renormalize_async().await?;
                bin
            }
            BinType::Bypass => {
                let bit = self.bits.next_bit().await?;
                self.bypass_step(bit)
            }
            BinType::Termination => {
                let done = self.termination_step()?;
                if !done {
                    self.renormalize_async().await?;
                }
                done
            }
        };
        self.tracker.record(bin);
        Ok(bin)
    }

    /// 按 (上下文索引, 旁路标志) 解码一个 bin (挂起式)
    pub async fn read_bin_ctx_async(
        &mut self,
        ctx_idx: usize,
        bypass: bool,
        ctx: Option<&mut CabacContext>,
    ) -> HengResult<bool> {
        self.read_bin_async(BinType::from_ctx(ctx_idx, bypass), ctx).await
    }

    /// 重归一化 (挂起式)
    async fn renormalize_async(&mut self) -> HengResult<()> {
        while self.range < 256 {
            self.range <<= 1;
            let bit = self.bits.next_bit().await?;
            self.offset = (self.offset << 1) | u32::from(bit);
        }
        Ok(())
    }
}
