//! 热点提取: 在检测器给出的每个候选框内做自适应阈值分割, 得到热点掩码.
//!
//! 对每个候选框依次执行:
//!
//! 1. 将框裁剪到图像内, 面积为零则跳过;
//! 2. 在框内求自适应阈值 (见 [`otsu::adaptive_threshold`]);
//! 3. 二值化 `pixel > t`, 并在框内以正方形结构元膨胀;
//! 4. 用框的类别值 (1 正常 / 2 异常) 涂写膨胀后的像素;
//! 5. 框内空洞填充 (见 [`HoleFill`]).
//!
//! 框之间重叠时, 后处理的框覆盖先处理的框.
//!
//! # 注意
//!
//! 热点掩码中的非背景像素一定落在某个 (裁剪后的) 候选框内.

pub mod bbox;
pub mod morph;
pub mod otsu;

pub use bbox::{BoundingBox, HotspotClass, Region};

use crate::consts::{DEFAULT_DILATION_RADIUS, DEFAULT_HOLE_VOTES, DEFAULT_THRESHOLD_STEP};
use crate::error::{BsiError, BsiResult};
use crate::{LabelSliceMut, OwnedLabelSlice, ScanSlice};
use ndarray::s;
use serde::{Deserialize, Serialize};

/// 框内空洞填充方式.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HoleFill {
    /// 不填充.
    None,

    /// 单遍 4-邻域投票. 只能填补 1 像素宽的空洞.
    NeighbourVote {
        /// 至少多少个 4-邻居与目标值相同才填充.
        min_votes: usize,
    },

    /// 迭代闭运算直到收敛. 可以填补更大的空洞.
    Closing {
        /// 正方形结构元半径.
        radius: usize,
    },
}

impl Default for HoleFill {
    fn default() -> Self {
        Self::NeighbourVote {
            min_votes: DEFAULT_HOLE_VOTES,
        }
    }
}

/// 热点提取参数. 反序列化时会经过 [`ExtractorConfig::validate`].
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawExtractorConfig")]
pub struct ExtractorConfig {
    /// 阈值候选的扫描步长, 单位为原始计数值. 必须为正.
    pub threshold_step: f32,

    /// 二值化后膨胀所用的正方形结构元半径. `0` 表示不膨胀.
    pub dilation_radius: usize,

    /// 空洞填充方式.
    pub hole_fill: HoleFill,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            threshold_step: DEFAULT_THRESHOLD_STEP,
            dilation_radius: DEFAULT_DILATION_RADIUS,
            hole_fill: HoleFill::default(),
        }
    }
}

impl ExtractorConfig {
    /// 检查参数: `threshold_step` 必须为正的有限值, 投票下限必须在 `1..=4` 内.
    pub fn validate(&self) -> BsiResult<()> {
        if !(self.threshold_step.is_finite() && self.threshold_step > 0.0) {
            return Err(BsiError::InvalidConfig(format!(
                "threshold_step 必须为正的有限值, 实际为 {}",
                self.threshold_step
            )));
        }
        if let HoleFill::NeighbourVote { min_votes } = self.hole_fill {
            if !(1..=4).contains(&min_votes) {
                return Err(BsiError::InvalidConfig(format!(
                    "min_votes 必须在 1..=4 内, 实际为 {min_votes}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct RawExtractorConfig {
    threshold_step: f32,
    dilation_radius: usize,
    hole_fill: HoleFill,
}

impl Default for RawExtractorConfig {
    fn default() -> Self {
        let ExtractorConfig {
            threshold_step,
            dilation_radius,
            hole_fill,
        } = ExtractorConfig::default();
        Self {
            threshold_step,
            dilation_radius,
            hole_fill,
        }
    }
}

impl TryFrom<RawExtractorConfig> for ExtractorConfig {
    type Error = BsiError;

    fn try_from(raw: RawExtractorConfig) -> BsiResult<Self> {
        let config = Self {
            threshold_step: raw.threshold_step,
            dilation_radius: raw.dilation_radius,
            hole_fill: raw.hole_fill,
        };
        config.validate()?;
        Ok(config)
    }
}

/// 热点提取器. 纯计算, 不做任何 I/O.
#[derive(Clone, Debug, Default)]
pub struct HotspotExtractor {
    config: ExtractorConfig,
}

impl HotspotExtractor {
    /// 以给定参数创建.
    #[inline]
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// 获取当前参数.
    #[inline]
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// 对一帧原始计数图像和其候选框生成热点掩码. 掩码形状与 `frame` 相同.
    ///
    /// 越界或面积为零的框被跳过 (仅记录 `debug` 日志), 不影响其它框.
    /// 框按给定顺序处理; 需要确定性结果的调用方应先按 [`BoundingBox::sort_key`] 排序.
    ///
    /// 参数不合法时返回 `Err(InvalidConfig)`, 不产生任何掩码.
    pub fn extract(
        &self,
        frame: &ScanSlice,
        boxes: &[BoundingBox],
    ) -> BsiResult<OwnedLabelSlice> {
        self.config.validate()?;
        let mut mask = OwnedLabelSlice::zeros(frame.shape());
        for b in boxes {
            match b.clamp_to(frame.shape()) {
                Ok(region) => {
                    self.extract_one(frame, &region, b.class, &mut mask.as_mutable())?
                }
                Err(e) => log::debug!("跳过候选框: {e}"),
            }
        }
        Ok(mask)
    }

    fn extract_one(
        &self,
        frame: &ScanSlice,
        region: &Region,
        class: HotspotClass,
        mask: &mut LabelSliceMut,
    ) -> BsiResult<()> {
        let data = frame.data();
        let crop = data.slice(s![region.h.clone(), region.w.clone()]);
        let Some(t) = otsu::adaptive_threshold(crop, self.config.threshold_step)? else {
            return Ok(());
        };

        let binary = crop.map(|v| *v > t);
        let grown = morph::dilate(binary.view(), self.config.dilation_radius);
        let target = class.mask_value();
        let painted = grown
            .indexed_iter()
            .filter(|(_, v)| **v)
            .map(|((i, j), _)| (region.h.start + i, region.w.start + j));
        mask.fill_batch(painted, target);

        let filled = match self.config.hole_fill {
            HoleFill::None => 0,
            HoleFill::NeighbourVote { min_votes } => {
                morph::neighbour_vote_fill(mask, region, target, min_votes)
            }
            HoleFill::Closing { radius } => morph::closing_fill(mask, region, target, radius),
        };
        log::trace!("{class:?} 框 {region:?}: 阈值 {t}, 填充 {filled} 个空洞像素");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::gray::*;
    use crate::OwnedScanSlice;
    use ndarray::Array2;

    /// 背景为 50 的 `h x w` 帧, 在 `[h0, h1) x [w0, w1)` 内为 200.
    fn frame_with_block(h: usize, w: usize, block: Region) -> OwnedScanSlice {
        let mut data = Array2::from_elem((h, w), 50.0f32);
        data.slice_mut(s![block.h, block.w]).fill(200.0);
        OwnedScanSlice::from(data)
    }

    #[test]
    fn test_single_abnormal_box() {
        let frame = frame_with_block(32, 32, Region { h: 13..17, w: 12..18 });
        let boxes = [BoundingBox::new(10, 10, 20, 20, HotspotClass::Abnormal)];
        let mask = HotspotExtractor::default()
            .extract(&frame.as_immutable(), &boxes)
            .unwrap();
        let m = mask.as_immut();

        // 亮区膨胀一圈后被标为异常.
        for h in 12..18 {
            for w in 11..19 {
                assert_eq!(m[(h, w)], HOTSPOT_ABNORMAL, "({h}, {w})");
            }
        }
        assert_eq!(m.count(HOTSPOT_NORMAL), 0);
        assert_eq!(m.count(HOTSPOT_ABNORMAL), 6 * 8);
        for (pos, _) in m.indexed_iter().filter(|(_, v)| **v != 0) {
            assert!((10..20).contains(&pos.0) && (10..20).contains(&pos.1));
        }
    }

    #[test]
    fn test_containment() {
        let frame = frame_with_block(40, 40, Region { h: 0..40, w: 18..22 });
        let boxes = [
            BoundingBox::new(15, 5, 25, 12, HotspotClass::Normal),
            BoundingBox::new(15, 30, 25, 38, HotspotClass::Abnormal),
        ];
        let mask = HotspotExtractor::default()
            .extract(&frame.as_immutable(), &boxes)
            .unwrap();
        let m = mask.as_immut();
        let inside = |(h, w): (usize, usize)| {
            boxes.iter().any(|b| {
                (b.ymin as usize..b.ymax as usize).contains(&h)
                    && (b.xmin as usize..b.xmax as usize).contains(&w)
            })
        };
        for (pos, v) in m.indexed_iter() {
            if *v != HOTSPOT_BACKGROUND {
                assert!(inside(pos), "{pos:?} 在所有框外");
            }
        }
        assert!(m.count(HOTSPOT_NORMAL) > 0);
        assert!(m.count(HOTSPOT_ABNORMAL) > 0);
    }

    #[test]
    fn test_disjoint_boxes_are_independent() {
        let frame = frame_with_block(40, 40, Region { h: 5..35, w: 5..35 });
        let a = BoundingBox::new(0, 0, 12, 12, HotspotClass::Normal);
        let b = BoundingBox::new(25, 25, 40, 40, HotspotClass::Abnormal);
        let ex = HotspotExtractor::default();
        let f = frame.as_immutable();

        let both = ex.extract(&f, &[a, b]).unwrap();
        let reversed = ex.extract(&f, &[b, a]).unwrap();
        assert_eq!(both, reversed);

        let only_a = ex.extract(&f, &[a]).unwrap();
        let only_b = ex.extract(&f, &[b]).unwrap();
        let merged: Vec<u8> = only_a
            .as_immut()
            .iter()
            .zip(only_b.as_immut().iter())
            .map(|(x, y)| x.max(y).to_owned())
            .collect();
        assert_eq!(both.as_immut().as_row_major_vec(), merged);
    }

    #[test]
    fn test_degenerate_boxes_skipped() {
        let frame = frame_with_block(16, 16, Region { h: 4..8, w: 4..8 });
        let boxes = [
            BoundingBox::new(100, 100, 120, 120, HotspotClass::Abnormal),
            BoundingBox::new(5, 5, 5, 9, HotspotClass::Abnormal),
        ];
        let mask = HotspotExtractor::default()
            .extract(&frame.as_immutable(), &boxes)
            .unwrap();
        assert!(mask.as_immut().is_background());
    }

    #[test]
    fn test_partially_outside_box_is_clamped() {
        let frame = frame_with_block(16, 16, Region { h: 0..3, w: 0..3 });
        let boxes = [BoundingBox::new(-10, -10, 6, 6, HotspotClass::Normal)];
        let mask = HotspotExtractor::default()
            .extract(&frame.as_immutable(), &boxes)
            .unwrap();
        let m = mask.as_immut();
        assert_eq!(m.count(HOTSPOT_NORMAL), 16);
        assert_eq!(m[(3, 3)], HOTSPOT_NORMAL);
        assert_eq!(m[(4, 4)], HOTSPOT_BACKGROUND);
    }

    #[test]
    fn test_flat_crop_yields_nothing() {
        let frame = OwnedScanSlice::from(Array2::from_elem((10, 10), 80.0f32));
        let boxes = [BoundingBox::new(2, 2, 8, 8, HotspotClass::Abnormal)];
        let mask = HotspotExtractor::default()
            .extract(&frame.as_immutable(), &boxes)
            .unwrap();
        assert!(mask.as_immut().is_background());
    }

    #[test]
    fn test_later_box_overwrites() {
        let frame = frame_with_block(20, 20, Region { h: 8..12, w: 8..12 });
        let normal = BoundingBox::new(5, 5, 15, 15, HotspotClass::Normal);
        let abnormal = BoundingBox::new(5, 5, 15, 15, HotspotClass::Abnormal);
        let ex = HotspotExtractor::default();
        let mask = ex.extract(&frame.as_immutable(), &[normal, abnormal]).unwrap();
        assert_eq!(mask.as_immut().count(HOTSPOT_NORMAL), 0);
        let mask = ex.extract(&frame.as_immutable(), &[abnormal, normal]).unwrap();
        assert_eq!(mask.as_immut().count(HOTSPOT_ABNORMAL), 0);
    }

    #[test]
    fn test_hole_fill_modes() {
        // 一个 6x6 的亮环, 中间 2x2 为暗像素.
        let mut data = Array2::from_elem((20, 20), 10.0f32);
        data.slice_mut(s![7..13, 7..13]).fill(100.0);
        data.slice_mut(s![9..11, 9..11]).fill(10.0);
        let frame = OwnedScanSlice::from(data);
        let boxes = [BoundingBox::new(6, 6, 14, 14, HotspotClass::Abnormal)];

        let no_dilation = |hole_fill| ExtractorConfig {
            dilation_radius: 0,
            hole_fill,
            ..Default::default()
        };

        let none = HotspotExtractor::new(no_dilation(HoleFill::None))
            .extract(&frame.as_immutable(), &boxes)
            .unwrap();
        assert_eq!(none.as_immut().count(HOTSPOT_ABNORMAL), 32);

        // 每个空洞像素只有 2 个异常邻居, 投票不足.
        let vote = HotspotExtractor::new(no_dilation(HoleFill::default()))
            .extract(&frame.as_immutable(), &boxes)
            .unwrap();
        assert_eq!(vote, none);

        let closing = HotspotExtractor::new(no_dilation(HoleFill::Closing { radius: 1 }))
            .extract(&frame.as_immutable(), &boxes)
            .unwrap();
        assert_eq!(closing.as_immut().count(HOTSPOT_ABNORMAL), 36);
    }

    #[test]
    fn test_config_serde_defaults() {
        let cfg: ExtractorConfig = serde_json::from_str(r#"{"dilation_radius": 2}"#).unwrap();
        assert_eq!(cfg.dilation_radius, 2);
        assert_eq!(cfg.threshold_step, DEFAULT_THRESHOLD_STEP);
        assert_eq!(cfg.hole_fill, HoleFill::default());

        let cfg: ExtractorConfig =
            serde_json::from_str(r#"{"hole_fill": {"kind": "closing", "radius": 2}}"#).unwrap();
        assert_eq!(cfg.hole_fill, HoleFill::Closing { radius: 2 });
    }

    #[test]
    fn test_repeated_extraction_is_identical() {
        let frame = frame_with_block(48, 48, Region { h: 6..30, w: 6..42 });
        let boxes = [
            BoundingBox::new(2, 2, 20, 20, HotspotClass::Normal),
            BoundingBox::new(24, 4, 46, 22, HotspotClass::Abnormal),
            BoundingBox::new(10, 26, 30, 40, HotspotClass::Abnormal),
        ];
        for config in [
            ExtractorConfig::default(),
            ExtractorConfig {
                hole_fill: HoleFill::Closing { radius: 2 },
                ..Default::default()
            },
        ] {
            let ex = HotspotExtractor::new(config);
            let first = ex.extract(&frame.as_immutable(), &boxes).unwrap();
            let second = ex.extract(&frame.as_immutable(), &boxes).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_config_rejects_bad_values() {
        for json in [
            r#"{"threshold_step": 0}"#,
            r#"{"threshold_step": -2.5}"#,
            r#"{"hole_fill": {"kind": "neighbour_vote", "min_votes": 0}}"#,
            r#"{"hole_fill": {"kind": "neighbour_vote", "min_votes": 5}}"#,
        ] {
            assert!(serde_json::from_str::<ExtractorConfig>(json).is_err(), "{json}");
        }
        assert!(serde_json::from_str::<ExtractorConfig>("{}").is_ok());
    }

    #[test]
    fn test_invalid_config_fails_extraction() {
        let frame = frame_with_block(16, 16, Region { h: 4..8, w: 4..8 });
        let boxes = [BoundingBox::new(2, 2, 10, 10, HotspotClass::Abnormal)];
        let ex = HotspotExtractor::new(ExtractorConfig {
            threshold_step: 0.0,
            ..Default::default()
        });
        assert!(matches!(
            ex.extract(&frame.as_immutable(), &boxes),
            Err(BsiError::InvalidConfig(_))
        ));
    }
}
