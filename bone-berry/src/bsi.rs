//! 骨扫描指数 (BSI) 统计.
//!
//! 结合前位/后位两帧的骨骼分割与最终热点掩码, 逐分割区域统计像素数,
//! 并给出全身汇总.

use crate::consts::gray::{HOTSPOT_ABNORMAL, HOTSPOT_NORMAL};
use crate::consts::segment::{SEGMENT_LEN, SEGMENT_NAMES};
use crate::error::{BsiError, BsiResult};
use crate::LabelSlice;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// 单个分割区域的统计信息 (前位 + 后位之和).
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentStat {
    /// 区域像素总数.
    pub total_segment_pixels: usize,
    /// 区域内正常热点像素数.
    pub hotspot_normal: usize,
    /// `hotspot_normal / total_segment_pixels`, 区域为空时为 0.
    pub percentage_normal: f64,
    /// 区域内异常热点像素数.
    pub hotspot_abnormal: usize,
    /// `hotspot_abnormal / total_segment_pixels`, 区域为空时为 0.
    pub percentage_abnormal: f64,
}

impl SegmentStat {
    fn from_counts(total: usize, normal: usize, abnormal: usize) -> Self {
        Self {
            total_segment_pixels: total,
            hotspot_normal: normal,
            percentage_normal: ratio(normal, total),
            hotspot_abnormal: abnormal,
            percentage_abnormal: ratio(abnormal, total),
        }
    }
}

#[inline]
fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// 全身汇总.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// 13 个区域 (含背景) 的像素总数.
    pub total_pixels: usize,
    /// 正常热点像素总数.
    pub hotspot_normal: usize,
    /// 异常热点像素总数.
    pub hotspot_abnormal: usize,
    /// BSI 分数 (百分比), 分母包含背景像素.
    pub bsi_score: f64,
    /// 仅以骨骼区域 (标签 `1..=12`) 为分母的 BSI 分数 (百分比).
    pub skeletal_bsi_score: f64,
}

/// 13 个区域的统计结果, 按标签值顺序排列.
///
/// 序列化为 `{区域名: SegmentStat}` 的映射, 键的顺序与标签值顺序一致.
#[derive(Clone, Debug, PartialEq)]
pub struct BsiResults {
    stats: [SegmentStat; SEGMENT_LEN],
}

impl BsiResults {
    /// 标签值为 `id` 的区域统计. 非法标签返回 `None`.
    #[inline]
    pub fn get(&self, id: u8) -> Option<&SegmentStat> {
        self.stats.get(id as usize)
    }

    /// 按名称查询区域统计.
    pub fn by_name(&self, name: &str) -> Option<&SegmentStat> {
        let id = SEGMENT_NAMES.iter().position(|n| *n == name)?;
        self.stats.get(id)
    }

    /// 以 `(区域名, 统计)` 的形式按标签值顺序迭代.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &SegmentStat)> {
        SEGMENT_NAMES.iter().copied().zip(self.stats.iter())
    }

    /// 计算全身汇总.
    pub fn summary(&self) -> Summary {
        let sum = |stats: &[SegmentStat]| {
            stats.iter().fold((0, 0, 0), |(t, n, a), s| {
                (
                    t + s.total_segment_pixels,
                    n + s.hotspot_normal,
                    a + s.hotspot_abnormal,
                )
            })
        };
        let (total, normal, abnormal) = sum(&self.stats);
        let (bone_total, _, bone_abnormal) = sum(&self.stats[1..]);
        Summary {
            total_pixels: total,
            hotspot_normal: normal,
            hotspot_abnormal: abnormal,
            bsi_score: ratio(abnormal, total) * 100.0,
            skeletal_bsi_score: ratio(bone_abnormal, bone_total) * 100.0,
        }
    }
}

impl Serialize for BsiResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(SEGMENT_LEN))?;
        for (name, stat) in self.iter() {
            map.serialize_entry(name, stat)?;
        }
        map.end()
    }
}

fn ensure_same_shape(expected: &LabelSlice, actual: &LabelSlice) -> BsiResult<()> {
    if expected.shape() == actual.shape() {
        Ok(())
    } else {
        Err(BsiError::ShapeMismatch {
            expected: expected.shape(),
            actual: actual.shape(),
        })
    }
}

/// 统计一个视图. 非法的分割标签被忽略.
fn accumulate(
    seg: &LabelSlice,
    hot: &LabelSlice,
    counts: &mut [[usize; 3]; SEGMENT_LEN],
) -> BsiResult<()> {
    ensure_same_shape(seg, hot)?;
    for (&s, &h) in seg.iter().zip(hot.iter()) {
        let Some(c) = counts.get_mut(s as usize) else {
            continue;
        };
        c[0] += 1;
        match h {
            HOTSPOT_NORMAL => c[1] += 1,
            HOTSPOT_ABNORMAL => c[2] += 1,
            _ => {}
        }
    }
    Ok(())
}

/// 由两视图的分割与热点掩码计算逐区域 BSI 统计.
///
/// 每个视图的分割与热点掩码形状必须一致, 否则返回 `Err(ShapeMismatch)`.
/// 两个视图之间的形状可以不同.
pub fn aggregate(
    seg_ant: &LabelSlice,
    seg_post: &LabelSlice,
    hot_ant: &LabelSlice,
    hot_post: &LabelSlice,
) -> BsiResult<BsiResults> {
    let mut counts = [[0usize; 3]; SEGMENT_LEN];
    accumulate(seg_ant, hot_ant, &mut counts)?;
    accumulate(seg_post, hot_post, &mut counts)?;
    let stats = counts.map(|[t, n, a]| SegmentStat::from_counts(t, n, a));
    Ok(BsiResults { stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OwnedLabelSlice;
    use ndarray::{s, Array2};

    fn zeros() -> OwnedLabelSlice {
        OwnedLabelSlice::zeros((10, 10))
    }

    #[test]
    fn test_concrete_scenario() {
        // 前位 50 个像素属于区域 1, 其中 10 个异常; 后位 30 个像素属于区域 1.
        let mut seg_ant = Array2::<u8>::zeros((10, 10));
        seg_ant.slice_mut(s![0..5, ..]).fill(1);
        let mut hot_ant = Array2::<u8>::zeros((10, 10));
        hot_ant.slice_mut(s![0..1, ..]).fill(2);
        let mut seg_post = Array2::<u8>::zeros((10, 10));
        seg_post.slice_mut(s![0..3, ..]).fill(1);

        let seg_ant = OwnedLabelSlice::from(seg_ant);
        let hot_ant = OwnedLabelSlice::from(hot_ant);
        let seg_post = OwnedLabelSlice::from(seg_post);
        let hot_post = zeros();

        let r = aggregate(
            &seg_ant.as_immut(),
            &seg_post.as_immut(),
            &hot_ant.as_immut(),
            &hot_post.as_immut(),
        )
        .unwrap();
        let skull = r.by_name("skull").unwrap();
        assert_eq!(skull.total_segment_pixels, 80);
        assert_eq!(skull.hotspot_abnormal, 10);
        assert_eq!(skull.hotspot_normal, 0);
        assert!((skull.percentage_abnormal - 0.125).abs() < 1e-12);

        let bg = r.get(0).unwrap();
        assert_eq!(bg.total_segment_pixels, 120);

        let summary = r.summary();
        assert_eq!(summary.total_pixels, 200);
        assert!((summary.bsi_score - 5.0).abs() < 1e-9);
        assert!((summary.skeletal_bsi_score - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_case() {
        let mut seg = Array2::<u8>::zeros((10, 10));
        for (i, v) in seg.iter_mut().enumerate() {
            *v = (i % SEGMENT_LEN) as u8;
        }
        let seg = OwnedLabelSlice::from(seg);
        let hot = zeros();
        let r = aggregate(
            &seg.as_immut(),
            &seg.as_immut(),
            &hot.as_immut(),
            &hot.as_immut(),
        )
        .unwrap();
        for (_, stat) in r.iter() {
            assert_eq!(stat.percentage_normal, 0.0);
            assert_eq!(stat.percentage_abnormal, 0.0);
        }
        assert_eq!(r.summary().bsi_score, 0.0);
        assert_eq!(r.summary().total_pixels, 200);
    }

    #[test]
    fn test_conservation() {
        let seg = Array2::from_shape_fn((12, 12), |(h, w)| ((h * 7 + w) % SEGMENT_LEN) as u8);
        let hot = Array2::from_shape_fn((12, 12), |(h, w)| ((h + 2 * w) % 3) as u8);
        let (seg, hot) = (OwnedLabelSlice::from(seg), OwnedLabelSlice::from(hot));
        let r = aggregate(
            &seg.as_immut(),
            &seg.as_immut(),
            &hot.as_immut(),
            &hot.as_immut(),
        )
        .unwrap();
        let mut total = 0;
        for (_, stat) in r.iter() {
            assert!(stat.hotspot_normal + stat.hotspot_abnormal <= stat.total_segment_pixels);
            assert!(stat.percentage_normal + stat.percentage_abnormal <= 1.0 + 1e-9);
            total += stat.total_segment_pixels;
        }
        assert_eq!(total, 2 * 144);
    }

    #[test]
    fn test_shape_mismatch() {
        let seg = zeros();
        let hot = OwnedLabelSlice::zeros((10, 9));
        let ok = zeros();
        let err = aggregate(
            &seg.as_immut(),
            &ok.as_immut(),
            &hot.as_immut(),
            &ok.as_immut(),
        )
        .unwrap_err();
        assert!(matches!(err, BsiError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_serialize_in_label_order() {
        let z = zeros();
        let r = aggregate(&z.as_immut(), &z.as_immut(), &z.as_immut(), &z.as_immut()).unwrap();
        let json = serde_json::to_string(&r).unwrap();
        let pos = |name: &str| json.find(&format!("\"{name}\"")).unwrap();
        assert!(pos("background") < pos("skull"));
        assert!(pos("pelvis") < pos("femur"));
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["background"]["total_segment_pixels"], 200);
    }
}
