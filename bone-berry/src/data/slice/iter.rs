use crate::Idx2d;
use std::ops::Range;

/// 行优先索引迭代器, 覆盖一个矩形区域 `[h0, h1) x [w0, w1)`.
///
/// 与 `(h0..h1).flat_map(move |h| (w0..w1).map(move |w| (h, w)))` 等价,
/// 但占用空间更小, 且可以直接以区域构造.
#[derive(Debug, Clone)]
pub struct PosIter {
    cur_h: usize,
    cur_w: usize,
    h: Range<usize>,
    w: Range<usize>,
}

impl PosIter {
    /// 覆盖形状为 `(h, w)` 的整幅图像.
    #[inline]
    pub fn new((h, w): Idx2d) -> Self {
        Self::within(0..h, 0..w)
    }

    /// 覆盖矩形区域 `h x w`.
    #[inline]
    pub fn within(h: Range<usize>, w: Range<usize>) -> Self {
        Self {
            cur_h: h.start,
            cur_w: w.start,
            h,
            w,
        }
    }
}

impl Iterator for PosIter {
    type Item = Idx2d;

    fn next(&mut self) -> Option<Self::Item> {
        if self.h.is_empty() || self.w.is_empty() || self.cur_h >= self.h.end {
            return None;
        }
        let ret_pos = (self.cur_h, self.cur_w);
        if self.cur_w + 1 == self.w.end {
            self.cur_w = self.w.start;
            self.cur_h += 1;
        } else {
            self.cur_w += 1;
        }
        Some(ret_pos)
    }
}

#[cfg(test)]
mod completeness_tests {
    use super::PosIter;
    use crate::Idx2d;
    use std::ops::Range;

    fn pos_iter_builtin(h: Range<usize>, w: Range<usize>) -> impl Iterator<Item = Idx2d> {
        h.flat_map(move |first| w.clone().map(move |second| (first, second)))
    }

    #[test]
    fn test_pos_iter() {
        for i in 0..=4 {
            for j in 0..=4 {
                assert!(Iterator::eq(pos_iter_builtin(0..i, 0..j), PosIter::new((i, j))));
            }
        }
    }

    #[test]
    fn test_pos_iter_within() {
        for (h, w) in [(2..5, 3..4), (1..1, 0..3), (0..3, 2..2), (4..6, 7..9)] {
            assert!(Iterator::eq(
                pos_iter_builtin(h.clone(), w.clone()),
                PosIter::within(h, w)
            ));
        }
    }
}
