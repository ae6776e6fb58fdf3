use super::neighbour4;
use crate::consts::gray::*;
use crate::error::{BsiError, BsiResult};
use crate::Idx2d;
use ndarray::iter::Iter;
use ndarray::{Array2, ArrayView2, ArrayViewMut2, Ix2};
use std::borrow::Cow;
use std::ops::{Index, IndexMut};

/// 不可变、借用的二维标签栅格 (热点掩码或骨骼分割).
pub struct LabelSlice<'a> {
    data: ArrayView2<'a, u8>,
}

impl Index<Idx2d> for LabelSlice<'_> {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

/// 可变、借用的二维标签栅格.
pub struct LabelSliceMut<'a> {
    /// 底层数据的轻量级视图.
    data: ArrayViewMut2<'a, u8>,
}

impl LabelSliceMut<'_> {
    /// 将 `it` 中的每个索引对应的像素改为 `new`. 返回改动的像素数.
    pub fn fill_batch<I: IntoIterator<Item = Idx2d>>(&mut self, it: I, new: u8) -> usize {
        let mut changed = 0;
        for pos in it {
            let pix = &mut self.data[pos];
            if *pix != new {
                *pix = new;
                changed += 1;
            }
        }
        changed
    }
}

impl Index<Idx2d> for LabelSliceMut<'_> {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx2d> for LabelSliceMut<'_> {
    #[inline]
    fn index_mut(&mut self, index: Idx2d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

macro_rules! impl_label_slice_immut {
    ($life: lifetime, $slice: ty, $array: ty) => {
        impl<$life> $slice {
            #[inline]
            pub(crate) fn new(data: $array) -> Self {
                Self { data }
            }

            /// 行优先的像素迭代器.
            #[inline]
            pub fn iter(&self) -> Iter<'_, u8, Ix2> {
                self.data.iter()
            }

            /// 获取给定位置 (高, 宽) 的像素值. 越界时返回 `None`.
            #[inline]
            pub fn get(&self, pos: Idx2d) -> Option<&u8> {
                self.data.get(pos)
            }

            /// 是否所有像素都是背景?
            #[inline]
            pub fn is_background(&self) -> bool {
                self.data.iter().copied().all(is_background)
            }

            /// 栅格形状 (高, 宽).
            #[inline]
            pub fn shape(&self) -> Idx2d {
                self.data.dim()
            }

            /// 值为 `label` 的像素个数.
            #[inline]
            pub fn count(&self, label: u8) -> usize {
                self.data.iter().filter(|&p| *p == label).count()
            }

            /// 行优先序列化.
            pub fn as_row_major_vec(&self) -> Vec<u8> {
                self.data.iter().copied().collect()
            }

            /// 行优先序列化. 底层数据本身连续时不复制.
            pub fn as_row_major_slice(&self) -> Cow<[u8]> {
                match self.data.as_slice() {
                    Some(s) => Cow::Borrowed(s),
                    None => Cow::Owned(self.as_row_major_vec()),
                }
            }

            /// 深拷贝为 [`OwnedLabelSlice`].
            pub fn to_owned(&self) -> OwnedLabelSlice {
                OwnedLabelSlice {
                    data: self.data.to_owned(),
                }
            }

            /// 统计 `pos` 的 4-邻域中像素值为 `label` 的个数. 越界邻居不计入.
            #[inline]
            pub fn n4_count(&self, pos: Idx2d, label: u8) -> usize {
                neighbour4(pos)
                    .into_iter()
                    .filter_map(|p| self.get(p).copied())
                    .filter(|p| *p == label)
                    .count()
            }

            /// 行优先的 `(索引, 像素值)` 迭代器.
            #[inline]
            pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &u8)> {
                self.data.indexed_iter()
            }

            /// 检查所有像素都满足 `pred`, 否则返回第一个不满足的位置和值.
            pub fn ensure_all(&self, pred: impl Fn(u8) -> bool) -> BsiResult<()> {
                match self.indexed_iter().find(|&(_, &v)| !pred(v)) {
                    Some((pos, &value)) => Err(BsiError::InvalidPixel { pos, value }),
                    None => Ok(()),
                }
            }

            /// 判断 `self` 与 `other` 的背景集合是否完全一致.
            ///
            /// 形状不同时返回 `false`.
            pub fn same_background(&self, other: &LabelSlice) -> bool {
                self.shape() == other.shape()
                    && self
                        .iter()
                        .zip(other.iter())
                        .all(|(a, b)| is_background(*a) == is_background(*b))
            }
        }
    };
}
impl_label_slice_immut!('a, LabelSlice<'a>, ArrayView2<'a, u8>);
impl_label_slice_immut!('a, LabelSliceMut<'a>, ArrayViewMut2<'a, u8>);

/// 拥有所有权的二维标签栅格.
///
/// `OwnedLabelSlice` 仅提供到 `LabelSlice` 和 `LabelSliceMut`
/// 的轻量转换和底层数据移动, 不提供任何其它方法.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnedLabelSlice {
    data: Array2<u8>,
}

impl OwnedLabelSlice {
    /// 创建形状为 `shape` 的全背景栅格.
    #[inline]
    pub fn zeros(shape: Idx2d) -> Self {
        Self {
            data: Array2::zeros(shape),
        }
    }

    /// 由行优先的像素序列创建栅格. 长度与形状不符时返回 `Err`.
    pub fn from_row_major(shape: Idx2d, buf: Vec<u8>) -> BsiResult<Self> {
        let len = buf.len();
        let data = Array2::from_shape_vec(shape, buf).map_err(|_| BsiError::ShapeMismatch {
            expected: shape,
            actual: (1, len),
        })?;
        Ok(Self { data })
    }

    /// 获得不可变切片引用.
    #[inline]
    pub fn as_immut(&self) -> LabelSlice<'_> {
        LabelSlice::new(self.data.view())
    }

    /// 获得可变切片引用.
    #[inline]
    pub fn as_mutable(&mut self) -> LabelSliceMut<'_> {
        LabelSliceMut::new(self.data.view_mut())
    }

    /// 直接获得底层数据.
    #[inline]
    pub fn into_raw(self) -> Array2<u8> {
        self.data
    }
}

impl From<Array2<u8>> for OwnedLabelSlice {
    #[inline]
    fn from(data: Array2<u8>) -> Self {
        Self { data }
    }
}

/// 不可变、借用的二维原始计数 (强度) 帧.
pub struct ScanSlice<'a> {
    /// 底层数据的轻量级视图.
    data: ArrayView2<'a, f32>,
}

impl Index<Idx2d> for ScanSlice<'_> {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl<'a> ScanSlice<'a> {
    /// 直接初始化.
    #[inline]
    pub(crate) fn new(data: ArrayView2<'a, f32>) -> Self {
        Self { data }
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView2<f32> {
        self.data.view()
    }

    /// 获取可以迭代图像像素的迭代器.
    #[inline]
    pub fn iter(&self) -> Iter<'_, f32, Ix2> {
        self.data.iter()
    }

    /// 图像的分辨率 (高, 宽).
    #[inline]
    pub fn shape(&self) -> Idx2d {
        self.data.dim()
    }
}

/// 拥有所有权的二维原始计数帧.
///
/// `OwnedScanSlice` 仅提供到 `ScanSlice` 的轻量转换.
#[derive(Clone, Debug, PartialEq)]
pub struct OwnedScanSlice {
    data: Array2<f32>,
}

impl OwnedScanSlice {
    /// 获得不可变切片引用.
    #[inline]
    pub fn as_immutable(&self) -> ScanSlice<'_> {
        ScanSlice::new(self.data.view())
    }
}

impl From<Array2<f32>> for OwnedScanSlice {
    #[inline]
    fn from(data: Array2<f32>) -> Self {
        Self { data }
    }
}
