//! 无直方图的 Otsu 等价阈值.
//!
//! 在裁剪区域的最小值与最大值之间以固定步长扫描候选切点,
//! 取使 `n_bg * var_bg + n_fg * var_fg` 最小的切点. 对于固定的裁剪区域,
//! 总方差不变, 因此这与最大化类间方差等价.

use crate::consts::MAX_THRESHOLD_CANDIDATES;
use crate::error::{BsiError, BsiResult};
use itertools::{Itertools, MinMaxResult};
use ndarray::ArrayView2;
use ordered_float::OrderedFloat;

/// 一类像素的计数与一阶/二阶矩.
#[derive(Copy, Clone, Debug, Default)]
struct Moments {
    n: f64,
    sum: f64,
    sum_sq: f64,
}

impl Moments {
    #[inline]
    fn push(&mut self, v: f64) {
        self.n += 1.0;
        self.sum += v;
        self.sum_sq += v * v;
    }

    /// `n * var`, 即类内离差平方和.
    #[inline]
    fn weighted_variance(&self) -> f64 {
        if self.n == 0.0 {
            return 0.0;
        }
        (self.sum_sq - self.sum * self.sum / self.n).max(0.0)
    }
}

/// 计算 `crop` 的自适应阈值. 前景定义为 `pixel > threshold`.
///
/// - 候选切点为 `min + k * step` (`k = 0, 1, ...`) 且严格小于 `max`;
/// - 候选个数超过 [`MAX_THRESHOLD_CANDIDATES`] 时, 步长放大到 `(max - min) / MAX_THRESHOLD_CANDIDATES`;
/// - 任一类为空的候选被跳过;
/// - 多个候选同为最小值时取最小的切点.
///
/// 如果 `crop` 为空则返回 `Ok(None)`; 如果 `crop` 是常数图像 (没有有效候选),
/// 返回其最小值, 此时不存在前景.
///
/// # 注意
///
/// `step` 不是正的有限值时返回 `Err(InvalidConfig)`.
pub fn adaptive_threshold(crop: ArrayView2<f32>, step: f32) -> BsiResult<Option<f32>> {
    if !(step.is_finite() && step > 0.0) {
        return Err(BsiError::InvalidConfig(format!(
            "阈值步长必须为正的有限值, 实际为 {step}"
        )));
    }

    let values: Vec<f64> = crop
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .map(f64::from)
        .collect();
    let (lo, hi) = match values.iter().copied().map(OrderedFloat).minmax() {
        MinMaxResult::NoElements => return Ok(None),
        MinMaxResult::OneElement(v) => return Ok(Some(v.0 as f32)),
        MinMaxResult::MinMax(lo, hi) => (lo.0, hi.0),
    };

    let step = f64::from(step).max((hi - lo) / MAX_THRESHOLD_CANDIDATES as f64);
    let candidates = (0u64..)
        .map(|k| lo + k as f64 * step)
        .take_while(|t| *t < hi);

    let best = candidates
        .filter_map(|t| {
            let (mut bg, mut fg) = (Moments::default(), Moments::default());
            for &v in values.iter() {
                if v > t {
                    fg.push(v);
                } else {
                    bg.push(v);
                }
            }
            (bg.n > 0.0 && fg.n > 0.0)
                .then(|| (t, bg.weighted_variance() + fg.weighted_variance()))
        })
        // `min_by_key` 在相等时保留第一个, 即最小的切点.
        .min_by_key(|(_, score)| OrderedFloat(*score))
        .map(|(t, _)| t);

    Ok(Some(best.unwrap_or(lo) as f32))
}
