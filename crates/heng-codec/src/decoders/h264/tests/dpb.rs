use std::sync::Arc;

use heng_core::HengError;

use super::super::{
    DecodedPictureBuffer, DpbPicture, FieldParity, MmcoEntry, NoFactory, PictureCache,
    RefDuration, RefPicListMod, SliceType,
};
use super::helpers::{CountingFactory, add_test_frame};

fn empty_frame_payload() -> DpbPicture {
    DpbPicture::Frame { image: None }
}

// ============================================================
// 插入, 标记与淘汰
// ============================================================

#[test]
fn test_frame_number_assignment() {
    let mut dpb = DecodedPictureBuffer::new(4);
    dpb.add(empty_frame_payload(), SliceType::P, false, None, None)
        .unwrap();
    dpb.add(empty_frame_payload(), SliceType::P, false, None, None)
        .unwrap();

    assert_eq!(dpb[0].frame_number, 0, "空缓冲的首个描述符帧号为 0");
    assert_eq!(dpb[1].frame_number, 1);
}

#[test]
fn test_b_slice_not_retained_as_reference() {
    let mut dpb = DecodedPictureBuffer::new(4);
    dpb.add(empty_frame_payload(), SliceType::B, false, None, None)
        .unwrap();
    dpb.add(empty_frame_payload(), SliceType::I, false, None, None)
        .unwrap();

    assert!(!dpb[0].used_for_reference, "B slice 不作为参考保留");
    assert!(dpb[1].used_for_reference);
}

#[test]
fn test_long_term_via_mmco_entry() {
    let mut dpb = DecodedPictureBuffer::new(4);
    let mmco = MmcoEntry {
        op: 6,
        long_term_frame_idx: Some(2),
    };
    dpb.add(empty_frame_payload(), SliceType::P, false, None, Some(&mmco))
        .unwrap();

    assert_eq!(dpb[0].duration, RefDuration::LongTerm);
    assert_eq!(dpb[0].long_term_frame_idx, Some(2));
    assert_eq!(dpb[0].mmco, 6);
}

#[test]
fn test_short_term_without_mmco() {
    let mut dpb = DecodedPictureBuffer::new(4);
    dpb.add(empty_frame_payload(), SliceType::P, false, None, None)
        .unwrap();

    assert_eq!(dpb[0].duration, RefDuration::ShortTerm);
    assert!(dpb[0].long_term_frame_idx.is_none());
    assert!(!dpb[0].outputted);
}

#[test]
fn test_eviction_removes_first_non_reference() {
    let mut dpb = DecodedPictureBuffer::new(2);
    for _ in 0..3 {
        dpb.add(empty_frame_payload(), SliceType::B, false, None, None)
            .unwrap();
    }

    // 第三次插入时淘汰最早的非参考描述符, 留下第二与第三个且相对顺序不变
    assert_eq!(dpb.len(), 2);
    assert_eq!(dpb[0].frame_number, 1);
    assert_eq!(dpb[1].frame_number, 2);
}

#[test]
fn test_capacity_bound_holds_with_non_reference_present() {
    let mut dpb = DecodedPictureBuffer::new(3);
    for i in 0..10 {
        let slice_type = if i % 2 == 0 { SliceType::B } else { SliceType::P };
        dpb.add(empty_frame_payload(), slice_type, false, None, None)
            .unwrap();
        assert!(
            dpb.len() <= 3 || dpb.descriptors().all(|d| d.used_for_reference),
            "存在非参考描述符时容量上限必须成立",
        );
    }
}

#[test]
fn test_all_reference_soft_overflow() {
    let mut dpb = DecodedPictureBuffer::new(1);
    dpb.add(empty_frame_payload(), SliceType::P, false, None, None)
        .unwrap();
    dpb.add(empty_frame_payload(), SliceType::P, false, None, None)
        .unwrap();

    // 全员为参考: 不淘汰, 允许暂时超容
    assert_eq!(dpb.len(), 2);
}

#[test]
fn test_idr_flushes_buffer() {
    let mut dpb = DecodedPictureBuffer::new(4);
    for _ in 0..3 {
        dpb.add(empty_frame_payload(), SliceType::P, false, None, None)
            .unwrap();
    }

    dpb.add(empty_frame_payload(), SliceType::I, true, None, None)
        .unwrap();

    assert_eq!(dpb.len(), 1, "IDR 插入后缓冲中只剩新描述符");
    assert_eq!(dpb[0].frame_number, 0);
}

#[test]
fn test_mark_all_unused_keeps_length() {
    let mut dpb = DecodedPictureBuffer::new(4);
    for _ in 0..3 {
        dpb.add(empty_frame_payload(), SliceType::P, false, None, None)
            .unwrap();
    }

    dpb.mark_all_unused();

    assert_eq!(dpb.len(), 3, "标记不移除描述符");
    assert!(dpb.descriptors().all(|d| !d.used_for_reference));
}

#[test]
fn test_on_start_of_new_slice() {
    let mut dpb = DecodedPictureBuffer::new(4);
    dpb.add(empty_frame_payload(), SliceType::P, false, None, None)
        .unwrap();

    dpb.on_start_of_new_slice(false);
    assert_eq!(dpb.len(), 1, "非 IDR slice 起始不改变缓冲");

    dpb.on_start_of_new_slice(true);
    assert!(dpb.is_empty(), "IDR slice 起始清空缓冲");
}

#[test]
fn test_ref_pic_list_modification_fails_loudly() {
    let mut dpb = DecodedPictureBuffer::new(4);
    let modification = RefPicListMod { idc: 0, value: 3 };
    let result = dpb.add(
        empty_frame_payload(),
        SliceType::P,
        false,
        Some(&modification),
        None,
    );

    assert!(
        matches!(result, Err(HengError::Unsupported(_))),
        "参考列表修改必须显式失败而不是静默忽略",
    );
}

#[test]
fn test_indexed_access_and_mutation() {
    let mut dpb = DecodedPictureBuffer::new(4);
    dpb.add(empty_frame_payload(), SliceType::P, false, None, None)
        .unwrap();

    dpb[0].outputted = true;
    assert!(dpb[0].outputted);
    assert!(dpb.get(0).is_some());
    assert!(dpb.get(5).is_none());
}

#[test]
#[should_panic]
fn test_index_out_of_range_panics() {
    let dpb = DecodedPictureBuffer::new(4);
    let _ = &dpb[0];
}

#[test]
fn test_dump_pictures_format() {
    let mut dpb = DecodedPictureBuffer::new(4);
    dpb.add(empty_frame_payload(), SliceType::P, false, None, None)
        .unwrap();
    dpb.add(empty_frame_payload(), SliceType::B, false, None, None)
        .unwrap();

    let dump = dpb.dump_pictures();
    assert_eq!(dump, "Frame 0, true, 0\nFrame 1, false, 0\n");
}

// ============================================================
// 图像物化
// ============================================================

#[test]
fn test_materialize_frame_hits_cache() {
    let mut dpb = DecodedPictureBuffer::new(4);
    add_test_frame(&mut dpb, 0x11);

    let mut cache = PictureCache::new();
    let first = dpb
        .materialize(0, &mut cache, None::<&mut NoFactory>)
        .unwrap();
    let second = dpb
        .materialize(0, &mut cache, None::<&mut NoFactory>)
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second), "缓存命中应返回同一图像");
    assert_eq!(first.data[0][0], 0x11);
}

#[test]
fn test_materialize_through_factory_memoizes() {
    let mut dpb = DecodedPictureBuffer::new(4);
    dpb.add(empty_frame_payload(), SliceType::P, false, None, None)
        .unwrap();

    let mut cache = PictureCache::new();
    let mut factory = CountingFactory::new(0x33);

    let first = dpb.materialize(0, &mut cache, Some(&mut factory)).unwrap();
    let second = dpb.materialize(0, &mut cache, Some(&mut factory)).unwrap();

    assert_eq!(factory.calls, 1, "缓存命中后不应再调用工厂");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.data[0][0], 0x33);
}

#[test]
fn test_materialize_without_image_or_factory_fails() {
    let mut dpb = DecodedPictureBuffer::new(4);
    dpb.add(empty_frame_payload(), SliceType::P, false, None, None)
        .unwrap();

    let mut cache = PictureCache::new();
    let result = dpb.materialize(0, &mut cache, None::<&mut NoFactory>);
    assert!(matches!(result, Err(HengError::InvalidData(_))));
}

#[test]
fn test_field_fetches_parent_frame_image() {
    let mut dpb = DecodedPictureBuffer::new(4);
    add_test_frame(&mut dpb, 0x55);
    dpb.add(
        DpbPicture::Field {
            frame: 0,
            parity: FieldParity::Top,
        },
        SliceType::P,
        false,
        None,
        None,
    )
    .unwrap();

    let mut parent_cache = PictureCache::new();
    let parent = dpb
        .materialize(0, &mut parent_cache, None::<&mut NoFactory>)
        .unwrap();

    let mut field_cache = PictureCache::new();
    let field = dpb
        .materialize(1, &mut field_cache, None::<&mut NoFactory>)
        .unwrap();

    assert!(Arc::ptr_eq(&parent, &field), "场图物化取父帧图像");
}

#[test]
fn test_field_parent_must_be_frame() {
    let mut dpb = DecodedPictureBuffer::new(4);
    dpb.add(
        DpbPicture::Field {
            frame: 1,
            parity: FieldParity::Top,
        },
        SliceType::P,
        false,
        None,
        None,
    )
    .unwrap();
    dpb.add(
        DpbPicture::Field {
            frame: 0,
            parity: FieldParity::Bottom,
        },
        SliceType::P,
        false,
        None,
        None,
    )
    .unwrap();

    let mut cache = PictureCache::new();
    let result = dpb.materialize(0, &mut cache, None::<&mut NoFactory>);
    assert!(matches!(result, Err(HengError::InvalidData(_))));
}

fn build_field_pair_dpb() -> DecodedPictureBuffer {
    let mut dpb = DecodedPictureBuffer::new(8);
    // 0: 顶场父帧, 1: 底场父帧
    add_test_frame(&mut dpb, 0x11);
    add_test_frame(&mut dpb, 0x22);
    // 2/3: 两个场, 4: 互补场对
    dpb.add(
        DpbPicture::Field {
            frame: 0,
            parity: FieldParity::Top,
        },
        SliceType::P,
        false,
        None,
        None,
    )
    .unwrap();
    dpb.add(
        DpbPicture::Field {
            frame: 1,
            parity: FieldParity::Bottom,
        },
        SliceType::P,
        false,
        None,
        None,
    )
    .unwrap();
    dpb.add(
        DpbPicture::FieldPair { top: 2, bottom: 3 },
        SliceType::P,
        false,
        None,
        None,
    )
    .unwrap();
    dpb
}

#[test]
fn test_field_pair_interleaves_rows() {
    let dpb = build_field_pair_dpb();

    let mut cache = PictureCache::new();
    let combined = dpb
        .materialize(4, &mut cache, None::<&mut NoFactory>)
        .unwrap();

    // 偶数行来自顶场 (0x11), 奇数行来自底场 (0x22)
    for row in 0..4 {
        let expected = if row % 2 == 0 { 0x11 } else { 0x22 };
        let line = combined.row(0, row).unwrap();
        assert!(
            line.iter().all(|&px| px == expected),
            "第 {} 行应来自{}场",
            row,
            if row % 2 == 0 { "顶" } else { "底" },
        );
    }

    // 物化结果已记忆化
    let again = dpb
        .materialize(4, &mut cache, None::<&mut NoFactory>)
        .unwrap();
    assert!(Arc::ptr_eq(&combined, &again));
}

#[test]
fn test_field_pair_rejects_nested_pair() {
    let mut dpb = build_field_pair_dpb();
    dpb.add(
        DpbPicture::FieldPair { top: 4, bottom: 3 },
        SliceType::P,
        false,
        None,
        None,
    )
    .unwrap();

    let mut cache = PictureCache::new();
    let result = dpb.materialize(5, &mut cache, None::<&mut NoFactory>);
    assert!(matches!(result, Err(HengError::InvalidData(_))));
}

#[tokio::test]
async fn test_materialize_async_matches_sync() {
    let dpb = build_field_pair_dpb();

    let mut sync_cache = PictureCache::new();
    let sync_image = dpb
        .materialize(4, &mut sync_cache, None::<&mut NoFactory>)
        .unwrap();

    let mut async_cache = PictureCache::new();
    let async_image = dpb
        .materialize_async(4, &mut async_cache, None::<&mut NoFactory>)
        .await
        .unwrap();

    assert_eq!(*sync_image, *async_image, "同步与挂起式物化结果必须一致");
}

#[tokio::test]
async fn test_materialize_async_through_factory() {
    let mut dpb = DecodedPictureBuffer::new(4);
    dpb.add(empty_frame_payload(), SliceType::P, false, None, None)
        .unwrap();

    let mut cache = PictureCache::new();
    let mut factory = CountingFactory::new(0x77);
    let image = dpb
        .materialize_async(0, &mut cache, Some(&mut factory))
        .await
        .unwrap();

    assert_eq!(factory.calls, 1);
    assert_eq!(image.data[0][0], 0x77);
}
