//! 检测器给出的候选框, 以及在检测器边界处定型的热点类别.

use crate::consts::gray::{HOTSPOT_ABNORMAL, HOTSPOT_NORMAL};
use crate::error::{BsiError, BsiResult};
use crate::Idx2d;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// 热点类别. 检测器的字符串标签在进入算法核心前被一次性转换为该枚举.
///
/// 反序列化时接受 [`HotspotClass::from_label`] 认可的所有同义词, 序列化为小写名称.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum HotspotClass {
    /// 正常摄取.
    Normal,

    /// 异常摄取.
    Abnormal,
}

impl HotspotClass {
    /// 解析检测器标签 (大小写不敏感).
    ///
    /// - `normal`, `negative`, `benign` → [`HotspotClass::Normal`];
    /// - `abnormal`, `positive`, `hotspot`, `malignant`, `metastasis` →
    ///   [`HotspotClass::Abnormal`].
    pub fn from_label(label: &str) -> BsiResult<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "normal" | "negative" | "benign" => Ok(Self::Normal),
            "abnormal" | "positive" | "hotspot" | "malignant" | "metastasis" => Ok(Self::Abnormal),
            _ => Err(BsiError::UnknownHotspotLabel(label.to_owned())),
        }
    }

    /// 小写名称.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Abnormal => "abnormal",
        }
    }

    /// 在热点掩码中对应的像素值.
    #[inline]
    pub const fn mask_value(&self) -> u8 {
        match self {
            Self::Normal => HOTSPOT_NORMAL,
            Self::Abnormal => HOTSPOT_ABNORMAL,
        }
    }

    /// 由热点掩码像素值反查类别. 背景或非法值返回 `None`.
    #[inline]
    pub const fn from_mask_value(v: u8) -> Option<Self> {
        match v {
            HOTSPOT_NORMAL => Some(Self::Normal),
            HOTSPOT_ABNORMAL => Some(Self::Abnormal),
            _ => None,
        }
    }
}

impl TryFrom<String> for HotspotClass {
    type Error = BsiError;

    #[inline]
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_label(&value)
    }
}

impl From<HotspotClass> for &'static str {
    #[inline]
    fn from(value: HotspotClass) -> Self {
        value.as_str()
    }
}

/// 一个候选框. 坐标为半开区间 `[xmin, xmax) x [ymin, ymax)`,
/// `x` 沿图像宽度方向, `y` 沿图像高度方向.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    /// 左边界 (含).
    pub xmin: i64,
    /// 上边界 (含).
    pub ymin: i64,
    /// 右边界 (不含).
    pub xmax: i64,
    /// 下边界 (不含).
    pub ymax: i64,
    /// 检测器给出的暂定类别.
    #[serde(rename = "label")]
    pub class: HotspotClass,
}

impl BoundingBox {
    /// 直接初始化.
    #[inline]
    pub const fn new(xmin: i64, ymin: i64, xmax: i64, ymax: i64, class: HotspotClass) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
            class,
        }
    }

    /// 排序键. 需要确定性输出的调用方应按此键排序后再提取.
    #[inline]
    pub fn sort_key(&self) -> (i64, i64, i64, i64, HotspotClass) {
        (self.ymin, self.xmin, self.ymax, self.xmax, self.class)
    }

    /// 将候选框裁剪到形状为 `(h, w)` 的图像内.
    ///
    /// 完全越界或裁剪后面积为零时返回 `Err(DegenerateRegion)`.
    pub fn clamp_to(&self, (h, w): Idx2d) -> BsiResult<Region> {
        #[inline]
        fn clamp(v: i64, len: usize) -> usize {
            v.clamp(0, len as i64) as usize
        }
        let region = Region {
            h: clamp(self.ymin, h)..clamp(self.ymax, h),
            w: clamp(self.xmin, w)..clamp(self.xmax, w),
        };
        if region.is_empty() {
            Err(BsiError::DegenerateRegion(format!(
                "{self:?} 在 {h}x{w} 图像内面积为零"
            )))
        } else {
            Ok(region)
        }
    }
}

/// 图像内的矩形区域 `h x w` (半开区间).
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Region {
    /// 高度方向范围.
    pub h: Range<usize>,
    /// 宽度方向范围.
    pub w: Range<usize>,
}

impl Region {
    /// 是否为零面积?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.h.is_empty() || self.w.is_empty()
    }

    /// 区域形状 (高, 宽).
    #[inline]
    pub fn shape(&self) -> Idx2d {
        (self.h.len(), self.w.len())
    }

    /// 区域内是否包含图像坐标 `pos`?
    #[inline]
    pub fn contains(&self, (h, w): Idx2d) -> bool {
        self.h.contains(&h) && self.w.contains(&w)
    }

    /// 距离区域边缘至少 `margin` 的内部区域. 可能为空.
    pub fn shrink(&self, margin: usize) -> Region {
        let shrink = |r: &Range<usize>| {
            let start = r.start.saturating_add(margin);
            let end = r.end.saturating_sub(margin);
            start..end.max(start)
        };
        Region {
            h: shrink(&self.h),
            w: shrink(&self.w),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_synonyms() {
        for s in ["Abnormal", "abnormal", "HOTSPOT", "positive", " malignant "] {
            assert_eq!(HotspotClass::from_label(s).unwrap(), HotspotClass::Abnormal);
        }
        for s in ["Normal", "negative", "Benign"] {
            assert_eq!(HotspotClass::from_label(s).unwrap(), HotspotClass::Normal);
        }
        assert!(matches!(
            HotspotClass::from_label("artifact"),
            Err(BsiError::UnknownHotspotLabel(_))
        ));
    }

    #[test]
    fn test_clamp() {
        let b = BoundingBox::new(-5, 2, 4, 100, HotspotClass::Normal);
        let r = b.clamp_to((10, 10)).unwrap();
        assert_eq!(r, Region { h: 2..10, w: 0..4 });

        let outside = BoundingBox::new(20, 20, 30, 30, HotspotClass::Normal);
        assert!(matches!(
            outside.clamp_to((10, 10)),
            Err(BsiError::DegenerateRegion(_))
        ));

        let flat = BoundingBox::new(3, 3, 3, 8, HotspotClass::Abnormal);
        assert!(flat.clamp_to((10, 10)).is_err());

        let inverted = BoundingBox::new(8, 8, 3, 3, HotspotClass::Abnormal);
        assert!(inverted.clamp_to((10, 10)).is_err());
    }

    #[test]
    fn test_shrink() {
        let r = Region { h: 2..6, w: 0..3 };
        assert_eq!(r.shrink(1), Region { h: 3..5, w: 1..2 });
        assert!(r.shrink(2).is_empty());
    }

    #[test]
    fn test_serde_label_field() {
        let b = BoundingBox::new(1, 2, 3, 4, HotspotClass::Abnormal);
        let json = serde_json::to_value(b).unwrap();
        assert_eq!(json["label"], "abnormal");
        assert_eq!(json["xmax"], 3);

        let parsed: BoundingBox = serde_json::from_str(
            r#"{"label": "Abnormal", "xmin": 10, "ymin": 10, "xmax": 20, "ymax": 20}"#,
        )
        .unwrap();
        assert_eq!(parsed, BoundingBox::new(10, 10, 20, 20, HotspotClass::Abnormal));
        assert!(serde_json::from_str::<BoundingBox>(
            r#"{"label": "artifact", "xmin": 0, "ymin": 0, "xmax": 1, "ymax": 1}"#
        )
        .is_err());
    }
}
