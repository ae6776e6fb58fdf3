//! 通用常量.

/// 单通道颜色.
pub mod gray {
    /// 热点掩码中, 背景的像素值.
    pub const HOTSPOT_BACKGROUND: u8 = 0;

    /// 热点掩码中, 正常摄取 (normal) 区域的像素值.
    pub const HOTSPOT_NORMAL: u8 = 1;

    /// 热点掩码中, 异常摄取 (abnormal) 区域的像素值.
    pub const HOTSPOT_ABNORMAL: u8 = 2;

    /// 单通道黑色.
    pub const BLACK: u8 = 0b_0000_0000;

    /// 单通道灰色.
    pub const GRAY: u8 = 0b_1000_0000;

    /// 单通道白色.
    pub const WHITE: u8 = 0b_1111_1111;

    /// 像素是否是背景?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        matches!(p, HOTSPOT_BACKGROUND)
    }

    /// 像素是否是合法的热点掩码值?
    #[inline]
    pub const fn is_valid_hotspot(p: u8) -> bool {
        p <= HOTSPOT_ABNORMAL
    }
}

/// 骨骼分割标签.
pub mod segment {
    /// 分割标签种类数 (含背景).
    pub const SEGMENT_LEN: usize = 13;

    /// 按标签值顺序排列的分割区域名称.
    pub const SEGMENT_NAMES: [&str; SEGMENT_LEN] = [
        "background",
        "skull",
        "cervical_vertebrae",
        "thoracic_vertebrae",
        "rib",
        "sternum",
        "clavicle",
        "scapula",
        "humerus",
        "lumbar_vertebrae",
        "sacrum",
        "pelvis",
        "femur",
    ];

    /// 分割结果 `colored` 图像使用的固定调色板, 与 [`SEGMENT_NAMES`] 一一对应.
    ///
    /// 颜色两两不同, 以便无损地从 RGB 图像恢复标签.
    pub const SEGMENT_PALETTE: [[u8; 3]; SEGMENT_LEN] = [
        [0, 0, 0],
        [230, 25, 75],
        [60, 180, 75],
        [255, 225, 25],
        [0, 130, 200],
        [245, 130, 48],
        [145, 30, 180],
        [70, 240, 240],
        [240, 50, 230],
        [210, 245, 60],
        [250, 190, 212],
        [0, 128, 128],
        [170, 110, 40],
    ];

    /// 标签值对应的区域名称. 非法标签返回 `None`.
    #[inline]
    pub fn name_of(id: u8) -> Option<&'static str> {
        SEGMENT_NAMES.get(id as usize).copied()
    }

    /// 标签值是否合法?
    #[inline]
    pub const fn is_valid_segment(id: u8) -> bool {
        (id as usize) < SEGMENT_LEN
    }
}

/// 帧标签部分匹配时允许的最大标签长度. 更长的自由文本不参与部分匹配.
pub const MAX_PARTIAL_LABEL_LEN: usize = 12;

/// 默认的自适应阈值候选步长.
pub const DEFAULT_THRESHOLD_STEP: f32 = 1.0;

/// 单个候选框内阈值候选的最大个数. 步长过小时会按此放大.
pub const MAX_THRESHOLD_CANDIDATES: usize = 4096;

/// 研究锁文件存在超过该秒数后视为失效.
pub const DEFAULT_STALE_LOCK_SECS: u64 = 24 * 60 * 60;

/// 默认的膨胀半径 (像素).
pub const DEFAULT_DILATION_RADIUS: usize = 1;

/// 默认的空洞投票下限 (4-邻域中至少需要多少个同类像素).
pub const DEFAULT_HOLE_VOTES: usize = 3;

#[cfg(test)]
mod tests {
    use super::segment::*;
    use std::collections::HashSet;

    #[test]
    fn test_palette_is_injective() {
        let set: HashSet<[u8; 3]> = SEGMENT_PALETTE.iter().copied().collect();
        assert_eq!(set.len(), SEGMENT_LEN);
    }

    #[test]
    fn test_segment_names() {
        assert_eq!(name_of(0), Some("background"));
        assert_eq!(name_of(12), Some("femur"));
        assert_eq!(name_of(13), None);
        assert!(is_valid_segment(12));
        assert!(!is_valid_segment(13));
    }
}
