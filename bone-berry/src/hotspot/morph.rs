//! 二维二值形态学操作, 以及热点框内的空洞填充.

use super::bbox::Region;
use crate::consts::gray::HOTSPOT_BACKGROUND;
use crate::data::PosIter;
use crate::LabelSliceMut;
use ndarray::{s, Array2, ArrayView2};

/// 以边长 `2 * radius + 1` 的正方形结构元膨胀. 结果不超出 `mask` 的范围.
pub fn dilate(mask: ArrayView2<bool>, radius: usize) -> Array2<bool> {
    let (h, w) = mask.dim();
    let mut out = Array2::from_elem((h, w), false);
    for ((i, j), _) in mask.indexed_iter().filter(|(_, v)| **v) {
        let hs = i.saturating_sub(radius)..(i + radius + 1).min(h);
        let ws = j.saturating_sub(radius)..(j + radius + 1).min(w);
        for pos in PosIter::within(hs, ws) {
            out[pos] = true;
        }
    }
    out
}

/// 以边长 `2 * radius + 1` 的正方形结构元腐蚀. 结构元窗口被裁剪到 `mask` 范围内.
pub fn erode(mask: ArrayView2<bool>, radius: usize) -> Array2<bool> {
    let (h, w) = mask.dim();
    Array2::from_shape_fn((h, w), |(i, j)| {
        let hs = i.saturating_sub(radius)..(i + radius + 1).min(h);
        let ws = j.saturating_sub(radius)..(j + radius + 1).min(w);
        PosIter::within(hs, ws).all(|p| mask[p])
    })
}

/// 一次闭运算 (先膨胀后腐蚀). `mask` 外部视为背景.
pub fn close(mask: ArrayView2<bool>, radius: usize) -> Array2<bool> {
    let (h, w) = mask.dim();
    // 四周补 `radius` 宽的背景, 膨胀结果不会被截断.
    let mut padded = Array2::from_elem((h + 2 * radius, w + 2 * radius), false);
    padded
        .slice_mut(s![radius..radius + h, radius..radius + w])
        .assign(&mask);
    let closed = erode(dilate(padded.view(), radius).view(), radius);
    closed
        .slice(s![radius..radius + h, radius..radius + w])
        .to_owned()
}

/// 反复施加闭运算, 直到结果不再变化.
///
/// 闭运算是外延的, 每轮结果包含上一轮, 因此迭代一定会终止.
pub fn close_to_fixed_point(mask: ArrayView2<bool>, radius: usize) -> Array2<bool> {
    let mut cur = mask.to_owned();
    loop {
        let next = close(cur.view(), radius);
        if next == cur {
            return cur;
        }
        cur = next;
    }
}

/// 单遍 4-邻域投票填充.
///
/// 对 `region` 内距离边缘至少 1 的、仍为背景的像素, 统计其 4-邻域中等于
/// `target` 的像素个数, 不少于 `min_votes` 时将其置为 `target`.
/// 投票基于本遍开始前的状态, 因此结果与遍历顺序无关. 返回填充的像素个数.
pub fn neighbour_vote_fill(
    mask: &mut LabelSliceMut,
    region: &Region,
    target: u8,
    min_votes: usize,
) -> usize {
    let inner = region.shrink(1);
    let holes: Vec<_> = PosIter::within(inner.h, inner.w)
        .filter(|p| mask[*p] == HOTSPOT_BACKGROUND && mask.n4_count(*p, target) >= min_votes)
        .collect();
    mask.fill_batch(holes, target)
}

/// 对 `region` 内值为 `target` 的区域做迭代闭运算, 只把区域内仍为背景的像素填为 `target`.
/// 返回填充的像素个数.
pub fn closing_fill(mask: &mut LabelSliceMut, region: &Region, target: u8, radius: usize) -> usize {
    let binary = Array2::from_shape_fn(region.shape(), |(i, j)| {
        mask[(region.h.start + i, region.w.start + j)] == target
    });
    let closed = close_to_fixed_point(binary.view(), radius);
    let holes: Vec<_> = closed
        .indexed_iter()
        .filter(|(_, v)| **v)
        .map(|((i, j), _)| (region.h.start + i, region.w.start + j))
        .filter(|p| mask[*p] == HOTSPOT_BACKGROUND)
        .collect();
    mask.fill_batch(holes, target)
}
