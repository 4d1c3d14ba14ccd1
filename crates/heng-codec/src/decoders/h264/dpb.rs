//! 解码图像缓冲 (DPB).
//!
//! 管理已解码图像描述符的有序集合: 插入、参考标记、容量淘汰,
//! 以及像素图像的惰性物化. 描述符只是轻量元数据, 像素重建开销
//! 被隔离在物化路径中, 且按外部提供的单图缓存逐图记忆化.
//!
//! 同一 DPB 实例的 `add`/`mark_all_unused`/索引写入必须由调用方在
//! 图像/slice 边界上串行化; 本模块有意不提供内部加锁, 并行应放在
//! 帧或 GOP 层级, 在本核心之外.

use std::fmt::Write as _;
use std::sync::Arc;

use heng_core::{HengError, HengResult};
use log::{debug, warn};

use crate::frame::VideoFrame;

// ============================================================
// 描述符元数据
// ============================================================

/// 参考图像的保留类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefDuration {
    /// 短期参考
    ShortTerm,
    /// 长期参考
    LongTerm,
}

/// 图像顺序计数 (POC)
///
/// 完整的 POC 推导在本核心之外, 此处仅承载推导结果的占位值.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Poc {
    pub value: i32,
    pub top: i32,
    pub bottom: i32,
    pub msb: i32,
}

/// 存储性记忆管理控制操作 (MMCO) 条目
///
/// 原始操作码被记录在描述符上但不在此解释
/// (淘汰策略按文档化的简化契约执行, 不推断标准的完整 MMCO 语义).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MmcoEntry {
    /// 原始 MMCO 操作码
    pub op: u32,
    /// 长期帧索引 (存在时当前图按长期参考入队)
    pub long_term_frame_idx: Option<u32>,
}

/// 参考图像列表修改条目 (扩展点)
///
/// 应用逻辑尚未实现; 传入任何条目都会让 [`DecodedPictureBuffer::add`]
/// 以 [`HengError::Unsupported`] 显式失败, 而不是静默产生错误的参考列表.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefPicListMod {
    /// 原始 modification_of_pic_nums_idc
    pub idc: u32,
    /// 伴随的原始参数值
    pub value: u32,
}

/// slice 类型 (只有 B 与否影响参考保留策略)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceType {
    I,
    P,
    B,
    Sp,
    Si,
}

impl SliceType {
    /// 是否为双向预测 slice
    pub fn is_b(self) -> bool {
        matches!(self, SliceType::B)
    }
}

/// 场极性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldParity {
    Top,
    Bottom,
}

// ============================================================
// 图像载荷与物化
// ============================================================

/// 可惰性物化的图像载荷
///
/// 封闭的带标签联合: 场图与互补场对只持有指向 DPB 描述符序列的
/// 非拥有索引, 图像生命周期的唯一归属是 DPB 本身.
#[derive(Debug, Clone)]
pub enum DpbPicture {
    /// 帧图: 直接持有 (或经工厂惰性生成) 的完整图像
    Frame { image: Option<Arc<VideoFrame>> },
    /// 场图: 引用父帧描述符的索引与自身极性
    Field { frame: usize, parity: FieldParity },
    /// 互补场对: 引用顶/底两个场描述符的索引, 合成帧按行交织惰性生成
    FieldPair { top: usize, bottom: usize },
}

/// 单图缓存
///
/// 物化结果按外部提供的缓存逐图记忆化; 缓存命中时完全绕过像素路径.
#[derive(Debug, Clone, Default)]
pub struct PictureCache {
    cached: Option<Arc<VideoFrame>>,
}

impl PictureCache {
    /// 创建空缓存
    pub fn new() -> Self {
        Self::default()
    }

    /// 已缓存的图像
    pub fn get(&self) -> Option<Arc<VideoFrame>> {
        self.cached.clone()
    }

    /// 写入缓存 (覆盖旧值)
    pub fn fill(&mut self, image: Arc<VideoFrame>) {
        self.cached = Some(image);
    }

    /// 清空缓存
    pub fn clear(&mut self) {
        self.cached = None;
    }
}

/// 图像工厂: 为尚未持有像素的帧描述符生成图像
pub trait PictureFactory {
    /// 为指定帧号生成完整图像
    fn produce(&mut self, frame_number: u32) -> HengResult<VideoFrame>;
}

/// 挂起式图像工厂
///
/// 与 [`PictureFactory`] 语义一致, 仅在底层图像来源挂起时让出控制权.
pub trait AsyncPictureFactory {
    /// 为指定帧号生成完整图像 (可挂起)
    fn produce(&mut self, frame_number: u32) -> impl Future<Output = HengResult<VideoFrame>>;
}

impl<T: PictureFactory> AsyncPictureFactory for T {
    async fn produce(&mut self, frame_number: u32) -> HengResult<VideoFrame> {
        PictureFactory::produce(self, frame_number)
    }
}

/// 空工厂: 供不需要工厂的物化调用填充类型参数
///
/// 真被调用说明描述符既无图像也无来源, 属于损坏的簿记.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFactory;

impl PictureFactory for NoFactory {
    fn produce(&mut self, frame_number: u32) -> HengResult<VideoFrame> {
        Err(HengError::InvalidData(format!(
            "帧 {} 既无已解码图像也无图像工厂",
            frame_number,
        )))
    }
}

// ============================================================
// 图像描述符
// ============================================================

/// 已解码图像的元数据描述符
///
/// `duration == LongTerm` 时 `long_term_frame_idx` 必然存在;
/// 参考状态只会经 [`DecodedPictureBuffer::mark_all_unused`] 或
/// MMCO 操作从参考转为非参考, 不会自发转换.
#[derive(Debug, Clone)]
pub struct PictureDescriptor {
    /// 是否用作参考
    pub used_for_reference: bool,
    /// 参考保留类别
    pub duration: RefDuration,
    /// 帧号
    pub frame_number: u32,
    /// 图像顺序计数
    pub poc: Poc,
    /// 长期帧索引
    pub long_term_frame_idx: Option<u32>,
    /// 原始 MMCO 操作码
    pub mmco: u32,
    /// 是否已输出显示
    pub outputted: bool,
    /// 图像载荷
    pub picture: DpbPicture,
}

// ============================================================
// DPB 容器
// ============================================================

/// 解码图像缓冲
///
/// 每个解码会话创建一次; 每解完一张非冗余图像插入一个描述符,
/// IDR 图像在插入前清空整个缓冲.
#[derive(Debug, Default)]
pub struct DecodedPictureBuffer {
    /// 容量上限 (插入完成前通过淘汰强制满足; 全员为参考时允许暂时超出)
    max_size: usize,
    /// 按插入顺序排列的描述符序列
    descriptors: Vec<PictureDescriptor>,
}

impl DecodedPictureBuffer {
    /// 创建指定容量的 DPB
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            descriptors: Vec::with_capacity(max_size),
        }
    }

    /// 容量上限
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// 当前描述符数量
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// 按索引取描述符
    pub fn get(&self, idx: usize) -> Option<&PictureDescriptor> {
        self.descriptors.get(idx)
    }

    /// 按索引取可变描述符
    pub fn get_mut(&mut self, idx: usize) -> Option<&mut PictureDescriptor> {
        self.descriptors.get_mut(idx)
    }

    /// 按插入顺序遍历描述符
    pub fn descriptors(&self) -> impl Iterator<Item = &PictureDescriptor> {
        self.descriptors.iter()
    }

    /// 插入一张已解码图像
    ///
    /// 依次执行: IDR 清空; 参考列表修改 (未实现, 显式失败); 容量淘汰
    /// (按插入顺序移除第一个非参考描述符; 全员为参考时不淘汰, 允许
    /// 暂时超容); 构造描述符并追加.
    ///
    /// B slice 的图像不作为参考保留; `mmco` 携带长期帧索引时按长期参考入队.
    pub fn add(
        &mut self,
        picture: DpbPicture,
        slice_type: SliceType,
        is_idr: bool,
        ref_pic_list_mod: Option<&RefPicListMod>,
        mmco: Option<&MmcoEntry>,
    ) -> HengResult<()> {
        if is_idr {
            debug!("DPB: IDR 图像, 清空 {} 个描述符", self.descriptors.len());
            self.descriptors.clear();
        }

        if let Some(modification) = ref_pic_list_mod {
            // 扩展点: 宁可大声失败, 不静默产生错误的参考列表
            return Err(HengError::Unsupported(format!(
                "参考图像列表修改尚未实现 (idc={}, value={})",
                modification.idc, modification.value,
            )));
        }

        if self.descriptors.len() >= self.max_size {
            match self
                .descriptors
                .iter()
                .position(|desc| !desc.used_for_reference)
            {
                Some(evict_idx) => {
                    let evicted = self.descriptors.remove(evict_idx);
                    debug!(
                        "DPB: 容量已满, 淘汰帧 {} (poc={})",
                        evicted.frame_number, evicted.poc.value,
                    );
                }
                None => {
                    // 软性失败: 全员为参考时允许暂时超出容量
                    warn!(
                        "DPB: {} 个描述符全部为参考, 暂时超出容量上限 {}",
                        self.descriptors.len(),
                        self.max_size,
                    );
                }
            }
        }

        let long_term_frame_idx = mmco.and_then(|entry| entry.long_term_frame_idx);
        let duration = if long_term_frame_idx.is_some() {
            RefDuration::LongTerm
        } else {
            RefDuration::ShortTerm
        };
        let frame_number = self
            .descriptors
            .iter()
            .map(|desc| desc.frame_number)
            .max()
            .map_or(0, |max| max + 1);

        self.descriptors.push(PictureDescriptor {
            used_for_reference: !slice_type.is_b(),
            duration,
            frame_number,
            poc: Poc::default(),
            long_term_frame_idx,
            mmco: mmco.map_or(0, |entry| entry.op),
            outputted: false,
            picture,
        });

        Ok(())
    }

    /// 把所有描述符标记为非参考; 不移除任何描述符
    ///
    /// 在新编码图像的 slice 头指示释放旧参考时调用.
    pub fn mark_all_unused(&mut self) {
        let mut marked = 0usize;
        for desc in &mut self.descriptors {
            if desc.used_for_reference {
                desc.used_for_reference = false;
                marked += 1;
            }
        }
        debug!("DPB: 标记 {} 个描述符为非参考", marked);
    }

    /// 新 slice 开始: IDR 时清空缓冲, 否则不做任何事
    ///
    /// 非 IDR slice 的参考标记决策推迟到 [`add`](DecodedPictureBuffer::add).
    pub fn on_start_of_new_slice(&mut self, is_idr: bool) {
        if is_idr {
            self.descriptors.clear();
        }
    }

    /// 诊断转储: 每描述符一行, 字段以 ", " 分隔, 以 "Frame " 开头
    pub fn dump_pictures(&self) -> String {
        let mut out = String::new();
        for desc in &self.descriptors {
            let _ = writeln!(
                out,
                "Frame {}, {}, {}",
                desc.frame_number, desc.used_for_reference, desc.poc.value,
            );
        }
        out
    }

    /// 将诊断转储写入日志
    pub fn log_pictures(&self) {
        for line in self.dump_pictures().lines() {
            debug!("{}", line);
        }
    }

    // ========================================================
    // 图像物化
    // ========================================================

    /// 物化指定描述符的完整图像 (同步)
    ///
    /// 缓存命中直接返回; 否则按载荷类型取图 (帧图取自身图像,
    /// 场图取父帧图像, 互补场对经两个新建的逐场缓存分别取图后按行交织:
    /// 偶数行取自顶场, 奇数行取自底场), 写入缓存并返回.
    pub fn materialize<F: PictureFactory>(
        &self,
        idx: usize,
        cache: &mut PictureCache,
        mut factory: Option<&mut F>,
    ) -> HengResult<Arc<VideoFrame>> {
        if let Some(image) = cache.get() {
            return Ok(image);
        }

        let desc = self.descriptor_checked(idx)?;
        let image = match &desc.picture {
            DpbPicture::Frame { image } => {
                self.frame_image(image.clone(), desc.frame_number, factory)?
            }
            DpbPicture::Field { frame, parity: _ } => {
                self.parent_frame_image(*frame, factory)?
            }
            DpbPicture::FieldPair { top, bottom } => {
                let mut top_cache = PictureCache::new();
                let top_image =
                    self.field_image(*top, &mut top_cache, factory.as_deref_mut())?;
                let mut bottom_cache = PictureCache::new();
                let bottom_image =
                    self.field_image(*bottom, &mut bottom_cache, factory)?;
                Arc::new(interleave_fields(&top_image, &bottom_image)?)
            }
        };

        cache.fill(image.clone());
        Ok(image)
    }

    /// 物化指定描述符的完整图像 (挂起式)
    ///
    /// 与 [`materialize`](DecodedPictureBuffer::materialize) 语义一致,
    /// 仅在图像工厂挂起时让出控制权.
    pub async fn materialize_async<F: AsyncPictureFactory>(
        &self,
        idx: usize,
        cache: &mut PictureCache,
        mut factory: Option<&mut F>,
    ) -> HengResult<Arc<VideoFrame>> {
        if let Some(image) = cache.get() {
            return Ok(image);
        }

        let desc = self.descriptor_checked(idx)?;
        let image = match &desc.picture {
            DpbPicture::Frame { image } => {
                self.frame_image_async(image.clone(), desc.frame_number, factory)
                    .await?
            }
            DpbPicture::Field { frame, parity: _ } => {
                self.parent_frame_image_async(*frame, factory).await?
            }
            DpbPicture::FieldPair { top, bottom } => {
                let mut top_cache = PictureCache::new();
                let top_image = self
                    .field_image_async(*top, &mut top_cache, factory.as_deref_mut())
                    .await?;
                let mut bottom_cache = PictureCache::new();
                let bottom_image = self
                    .field_image_async(*bottom, &mut bottom_cache, factory)
                    .await?;
                Arc::new(interleave_fields(&top_image, &bottom_image)?)
            }
        };

        cache.fill(image.clone());
        Ok(image)
    }

    fn descriptor_checked(&self, idx: usize) -> HengResult<&PictureDescriptor> {
        self.descriptors.get(idx).ok_or_else(|| {
            HengError::InvalidData(format!(
                "DPB 描述符索引 {} 越界 (当前长度 {})",
                idx,
                self.descriptors.len(),
            ))
        })
    }

    /// 帧图取图: 有图像直接用, 否则经工厂生成
    fn frame_image<F: PictureFactory>(
        &self,
        image: Option<Arc<VideoFrame>>,
        frame_number: u32,
        factory: Option<&mut F>,
    ) -> HengResult<Arc<VideoFrame>> {
        match image {
            Some(image) => Ok(image),
            None => {
                let factory = factory.ok_or_else(|| missing_image_err(frame_number))?;
                Ok(Arc::new(factory.produce(frame_number)?))
            }
        }
    }

    async fn frame_image_async<F: AsyncPictureFactory>(
        &self,
        image: Option<Arc<VideoFrame>>,
        frame_number: u32,
        factory: Option<&mut F>,
    ) -> HengResult<Arc<VideoFrame>> {
        match image {
            Some(image) => Ok(image),
            None => {
                let factory = factory.ok_or_else(|| missing_image_err(frame_number))?;
                Ok(Arc::new(factory.produce(frame_number).await?))
            }
        }
    }

    /// 场图取图: 父描述符必须是帧图
    fn parent_frame_image<F: PictureFactory>(
        &self,
        frame_idx: usize,
        factory: Option<&mut F>,
    ) -> HengResult<Arc<VideoFrame>> {
        let parent = self.descriptor_checked(frame_idx)?;
        match &parent.picture {
            DpbPicture::Frame { image } => {
                self.frame_image(image.clone(), parent.frame_number, factory)
            }
            _ => Err(HengError::InvalidData(format!(
                "场图的父描述符 {} 不是帧图",
                frame_idx,
            ))),
        }
    }

    async fn parent_frame_image_async<F: AsyncPictureFactory>(
        &self,
        frame_idx: usize,
        factory: Option<&mut F>,
    ) -> HengResult<Arc<VideoFrame>> {
        let parent = self.descriptor_checked(frame_idx)?;
        match &parent.picture {
            DpbPicture::Frame { image } => {
                self.frame_image_async(image.clone(), parent.frame_number, factory)
                    .await
            }
            _ => Err(HengError::InvalidData(format!(
                "场图的父描述符 {} 不是帧图",
                frame_idx,
            ))),
        }
    }

    /// 互补场对的组成场取图; 组成场不允许又是场对 (防止索引成环)
    fn field_image<F: PictureFactory>(
        &self,
        idx: usize,
        cache: &mut PictureCache,
        factory: Option<&mut F>,
    ) -> HengResult<Arc<VideoFrame>> {
        if matches!(
            self.descriptor_checked(idx)?.picture,
            DpbPicture::FieldPair { .. }
        ) {
            return Err(HengError::InvalidData(format!(
                "互补场对的组成描述符 {} 不允许又是场对",
                idx,
            )));
        }
        self.materialize(idx, cache, factory)
    }

    async fn field_image_async<F: AsyncPictureFactory>(
        &self,
        idx: usize,
        cache: &mut PictureCache,
        factory: Option<&mut F>,
    ) -> HengResult<Arc<VideoFrame>> {
        if matches!(
            self.descriptor_checked(idx)?.picture,
            DpbPicture::FieldPair { .. }
        ) {
            return Err(HengError::InvalidData(format!(
                "互补场对的组成描述符 {} 不允许又是场对",
                idx,
            )));
        }
        Box::pin(self.materialize_async(idx, cache, factory)).await
    }
}

impl std::ops::Index<usize> for DecodedPictureBuffer {
    type Output = PictureDescriptor;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.descriptors[idx]
    }
}

impl std::ops::IndexMut<usize> for DecodedPictureBuffer {
    fn index_mut(&mut self, idx: usize) -> &mut Self::Output {
        &mut self.descriptors[idx]
    }
}

fn missing_image_err(frame_number: u32) -> HengError {
    HengError::InvalidData(format!(
        "帧 {} 的图像尚未物化且未提供图像工厂",
        frame_number,
    ))
}

/// 按行交织顶/底两个场图: 偶数行取自顶场, 奇数行取自底场
///
/// 两图的平面结构与行距必须一致.
fn interleave_fields(top: &VideoFrame, bottom: &VideoFrame) -> HengResult<VideoFrame> {
    if top.plane_count() != bottom.plane_count() || top.linesize != bottom.linesize {
        return Err(HengError::InvalidData(format!(
            "互补场对的平面结构不一致: {} 平面 vs {} 平面",
            top.plane_count(),
            bottom.plane_count(),
        )));
    }

    let mut combined = VideoFrame::new(top.width, top.height, top.plane_count());
    combined.linesize = top.linesize.clone();

    for plane in 0..top.plane_count() {
        let rows = top.plane_rows(plane);
        let linesize = top.linesize[plane];
        let mut data = Vec::with_capacity(rows * linesize);
        for row in 0..rows {
            let source = if row % 2 == 0 { top } else { bottom };
            let line = source.row(plane, row).ok_or_else(|| {
                HengError::InvalidData(format!("场图平面 {} 缺少第 {} 行", plane, row))
            })?;
            data.extend_from_slice(line);
        }
        combined.data[plane] = data;
    }

    Ok(combined)
}
