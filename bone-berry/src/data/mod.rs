use std::ops::Index;
use std::path::Path;

use ndarray::{Array2, Array3, Axis};
use ndarray_npy::ReadNpyExt;

use crate::error::{BsiError, BsiResult};
use crate::{Idx2d, Idx3d};

pub mod slice;
pub mod study;

pub use slice::{
    ImgWriteRaw, ImgWriteVis, LabelSlice, LabelSliceMut, OwnedLabelSlice, OwnedScanSlice,
    PosIter, ScanSlice,
};

pub use study::{RawFrame, Study, StudyDate, StudyKey};

/// 一次检查的多帧原始计数图像, 按 `(帧, 高, 宽)` 组织, 计数值以 `f32` 保存.
///
/// 典型的全身骨扫描含前位/后位两帧, 但也可能更多 (如附加的局部采集).
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStack {
    data: Array3<f32>,
}

impl Index<Idx3d> for FrameStack {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl FrameStack {
    /// 由 `(帧, 高, 宽)` 数组直接创建.
    #[inline]
    pub fn new(data: Array3<f32>) -> Self {
        Self { data }
    }

    /// 由若干形状相同的单帧拼接. 形状不一致时返回 `Err`.
    pub fn from_frames<I: IntoIterator<Item = Array2<f32>>>(frames: I) -> BsiResult<Self> {
        let frames: Vec<Array2<f32>> = frames.into_iter().collect();
        let Some(first) = frames.first() else {
            return Ok(Self {
                data: Array3::zeros((0, 0, 0)),
            });
        };
        let shape = first.dim();
        if let Some(bad) = frames.iter().find(|f| f.dim() != shape) {
            return Err(BsiError::ShapeMismatch {
                expected: shape,
                actual: bad.dim(),
            });
        }
        let views: Vec<_> = frames.iter().map(|f| f.view()).collect();
        // 形状已检查, 不会失败.
        let data = ndarray::stack(Axis(0), &views).map_err(|_| BsiError::ShapeMismatch {
            expected: shape,
            actual: shape,
        })?;
        Ok(Self { data })
    }

    /// 打开 npy 格式的多帧图像. 二维数组被视为单帧.
    pub fn open_npy<P: AsRef<Path>>(path: P) -> BsiResult<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        match Array3::<f32>::read_npy(bytes.as_slice()) {
            Ok(data) => Ok(Self { data }),
            Err(_) => {
                let single = Array2::<f32>::read_npy(bytes.as_slice())?;
                Ok(Self {
                    data: single.insert_axis(Axis(0)),
                })
            }
        }
    }

    /// 帧数.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// 是否不含任何帧?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 单帧形状 (高, 宽).
    #[inline]
    pub fn frame_shape(&self) -> Idx2d {
        let (_, h, w) = self.data.dim();
        (h, w)
    }

    /// 获取第 `index` 帧视图. 越界时返回 `None`.
    #[inline]
    pub fn frame_at(&self, index: usize) -> Option<ScanSlice<'_>> {
        (index < self.len()).then(|| ScanSlice::new(self.data.index_axis(Axis(0), index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_from_frames() {
        let a = array![[1.0f32, 2.0], [3.0, 4.0]];
        let b = array![[5.0f32, 6.0], [7.0, 8.0]];
        let stack = FrameStack::from_frames([a, b]).unwrap();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.frame_shape(), (2, 2));
        assert_eq!(stack[(1, 0, 1)], 6.0);
        assert_eq!(stack.frame_at(1).unwrap()[(1, 1)], 8.0);
        assert!(stack.frame_at(2).is_none());
    }

    #[test]
    fn test_from_frames_shape_mismatch() {
        let a = Array2::<f32>::zeros((2, 2));
        let b = Array2::<f32>::zeros((2, 3));
        assert!(FrameStack::from_frames([a, b]).is_err());
    }

    #[test]
    fn test_open_npy_single_frame() {
        use ndarray_npy::WriteNpyExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("single.npy");
        let frame = array![[1.0f32, 2.0, 3.0]];
        let mut buf = Vec::new();
        frame.write_npy(&mut buf).unwrap();
        std::fs::write(&path, buf).unwrap();

        let stack = FrameStack::open_npy(&path).unwrap();
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.frame_shape(), (1, 3));
    }
}
