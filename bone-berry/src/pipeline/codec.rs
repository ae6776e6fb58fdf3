//! 产物编解码.

use crate::consts::gray::is_valid_hotspot;
use crate::consts::segment::{is_valid_segment, SEGMENT_PALETTE};
use crate::data::slice::{decode_gray_png, decode_rgb_png, encode_rgb_png};
use crate::error::{BsiError, BsiResult};
use crate::{ImgWriteRaw, ImgWriteVis, LabelSlice, OwnedLabelSlice, OwnedScanSlice, ScanSlice};
use ndarray::Array2;
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

/// 调色板颜色 → 分割标签.
static PALETTE_LOOKUP: Lazy<HashMap<[u8; 3], u8>> = Lazy::new(|| {
    SEGMENT_PALETTE
        .iter()
        .enumerate()
        .map(|(id, rgb)| (*rgb, id as u8))
        .collect()
});

/// 将原始计数帧编码为 `f32` npy.
pub fn encode_frame(frame: &ScanSlice) -> BsiResult<Vec<u8>> {
    let mut buf = Vec::new();
    frame.data().write_npy(&mut buf)?;
    Ok(buf)
}

/// 从 npy 解码原始计数帧.
pub fn decode_frame(bytes: &[u8]) -> BsiResult<OwnedScanSlice> {
    Ok(Array2::<f32>::read_npy(bytes)?.into())
}

/// 将热点掩码按原样编码为单通道 PNG. 出现 `{0, 1, 2}` 以外的值时返回 `Err`.
pub fn encode_hotspot(mask: &LabelSlice) -> BsiResult<Vec<u8>> {
    mask.ensure_all(is_valid_hotspot)?;
    Ok(mask.to_raw_png()?)
}

/// 将热点掩码编码为便于肉眼查看的单通道 PNG.
pub fn encode_hotspot_vis(mask: &LabelSlice) -> BsiResult<Vec<u8>> {
    Ok(mask.to_vis_png()?)
}

/// 从单通道 PNG 解码热点掩码, 并校验像素值.
pub fn decode_hotspot(bytes: &[u8]) -> BsiResult<OwnedLabelSlice> {
    let mask = decode_gray_png(bytes)?;
    mask.as_immut().ensure_all(is_valid_hotspot)?;
    Ok(mask)
}

/// 将骨骼分割按固定调色板编码为 RGB PNG.
pub fn encode_segments(seg: &LabelSlice) -> BsiResult<Vec<u8>> {
    seg.ensure_all(is_valid_segment)?;
    let rgb: Vec<u8> = seg
        .iter()
        .flat_map(|id| SEGMENT_PALETTE[*id as usize])
        .collect();
    Ok(encode_rgb_png(&rgb, seg.shape())?)
}

/// 从 RGB PNG 按调色板精确查表恢复骨骼分割. 出现未知颜色时返回 `Err`.
pub fn decode_segments(bytes: &[u8]) -> BsiResult<OwnedLabelSlice> {
    let (rgb, shape) = decode_rgb_png(bytes)?;
    let (_, w) = shape;
    let ids = rgb
        .chunks_exact(3)
        .enumerate()
        .map(|(i, px)| {
            let px = [px[0], px[1], px[2]];
            PALETTE_LOOKUP
                .get(&px)
                .copied()
                .ok_or(BsiError::UnknownSegmentColour {
                    pos: (i / w, i % w),
                    rgb: px,
                })
        })
        .collect::<BsiResult<Vec<u8>>>()?;
    OwnedLabelSlice::from_row_major(shape, ids)
}

/// 编码 JSON 记录.
#[inline]
pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> BsiResult<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(value)?)
}

/// 解码 JSON 记录.
#[inline]
pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> BsiResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotspot::{BoundingBox, HotspotClass};
    use ndarray::array;

    #[test]
    fn test_frame_npy() {
        let frame = OwnedScanSlice::from(array![[0.5f32, 1.0], [300.0, 7.25]]);
        let bytes = encode_frame(&frame.as_immutable()).unwrap();
        assert_eq!(decode_frame(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_segments_palette() {
        let seg = OwnedLabelSlice::from(array![[0, 1, 2, 3], [9, 10, 11, 12]]);
        let png = encode_segments(&seg.as_immut()).unwrap();
        assert_eq!(decode_segments(&png).unwrap(), seg);

        let bad = OwnedLabelSlice::from(array![[0, 13]]);
        assert!(matches!(
            encode_segments(&bad.as_immut()),
            Err(BsiError::InvalidPixel { pos: (0, 1), value: 13 })
        ));
    }

    #[test]
    fn test_unknown_colour() {
        let png = encode_rgb_png(&[0, 0, 0, 1, 2, 3], (1, 2)).unwrap();
        assert!(matches!(
            decode_segments(&png),
            Err(BsiError::UnknownSegmentColour { pos: (0, 1), rgb: [1, 2, 3] })
        ));
    }

    #[test]
    fn test_hotspot_validation() {
        let ok = OwnedLabelSlice::from(array![[0, 1, 2]]);
        let png = encode_hotspot(&ok.as_immut()).unwrap();
        assert_eq!(decode_hotspot(&png).unwrap(), ok);

        let bad = OwnedLabelSlice::from(array![[0, 3]]);
        assert!(encode_hotspot(&bad.as_immut()).is_err());
        let png = bad.as_immut().to_raw_png().unwrap();
        assert!(decode_hotspot(&png).is_err());
    }

    #[test]
    fn test_boxes_json() {
        let boxes = vec![BoundingBox::new(1, 2, 3, 4, HotspotClass::Normal)];
        let bytes = encode_json(&boxes).unwrap();
        let back: Vec<BoundingBox> = decode_json(&bytes).unwrap();
        assert_eq!(back, boxes);
    }
}
