//! 二维标签栅格 / 原始计数帧对象的操作.

mod core;
mod iter;
mod save;

use crate::Idx2d;

pub use core::{LabelSlice, LabelSliceMut, OwnedLabelSlice, OwnedScanSlice, ScanSlice};

pub use iter::PosIter;

pub use save::{ImgWriteRaw, ImgWriteVis};

pub(crate) use save::{decode_gray_png, decode_rgb_png, encode_gray_png, encode_rgb_png};

/// 获得 `(h, w)` 的 4-邻居索引. 不检查越界.
#[inline]
pub(crate) fn neighbour4((h, w): Idx2d) -> [Idx2d; 4] {
    [
        (h.wrapping_sub(1), w),
        (h.saturating_add(1), w),
        (h, w.wrapping_sub(1)),
        (h, w.saturating_add(1)),
    ]
}
