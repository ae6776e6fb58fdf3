//! 图像的持久化存储.

use super::OwnedLabelSlice;
use crate::error::BsiResult;
use crate::{Idx2d, LabelSlice, LabelSliceMut};
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, ImageFormat, ImageResult};

/// 表明一个可以通过 **可视化友好** 模式持久化存储的图像对象.
///
/// 对于 `LabelSlice`, `LabelSliceMut` 这类仅存在 0, 1, 2 像素值的热点掩码,
/// 在保存时会映射到肉眼较易能区分的灰度.
pub trait ImgWriteVis {
    /// 按照一定的可视化规则将图片编码为 PNG 字节流.
    fn to_vis_png(&self) -> ImageResult<Vec<u8>>;
}

/// 表明一个可以通过 **按原样** 模式持久化存储的图像对象.
///
/// 保存的像素值即标签值, 读回后可以无损恢复.
pub trait ImgWriteRaw {
    /// 按原样将图片编码为 PNG 字节流.
    fn to_raw_png(&self) -> ImageResult<Vec<u8>>;
}

/// 使热点像素更有利于单通道可视化.
#[inline]
pub(crate) fn pretty(label: u8) -> u8 {
    use crate::consts::gray::*;
    match label {
        // 背景为黑色
        HOTSPOT_BACKGROUND => BLACK,

        // 正常摄取为灰色
        HOTSPOT_NORMAL => GRAY,

        // 异常摄取为白色
        HOTSPOT_ABNORMAL => WHITE,

        // 其它值 (如分割标签) 按原样保留
        any_else => any_else,
    }
}

/// 将行优先的单通道数据编码为 PNG.
pub(crate) fn encode_gray_png(raw: &[u8], (height, width): Idx2d) -> ImageResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(raw.len() / 4 + 64);
    PngEncoder::new(&mut buf).write_image(raw, width as u32, height as u32, ColorType::L8)?;
    Ok(buf)
}

/// 将行优先的 RGB 数据编码为 PNG.
pub(crate) fn encode_rgb_png(raw: &[u8], (height, width): Idx2d) -> ImageResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(raw.len() / 4 + 64);
    PngEncoder::new(&mut buf).write_image(raw, width as u32, height as u32, ColorType::Rgb8)?;
    Ok(buf)
}

/// 将 PNG 字节流解码为单通道标签栅格.
pub(crate) fn decode_gray_png(bytes: &[u8]) -> BsiResult<OwnedLabelSlice> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)?.into_luma8();
    let shape = (img.height() as usize, img.width() as usize);
    OwnedLabelSlice::from_row_major(shape, img.into_raw())
}

/// 将 PNG 字节流解码为行优先的 RGB 数据及其形状 (高, 宽).
pub(crate) fn decode_rgb_png(bytes: &[u8]) -> BsiResult<(Vec<u8>, Idx2d)> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)?.into_rgb8();
    let shape = (img.height() as usize, img.width() as usize);
    Ok((img.into_raw(), shape))
}

macro_rules! impl_label_png {
    ($($slice: ty),+) => {
        $(
            /// 会将背景/正常/异常像素分别映射为黑色/灰色/白色.
            impl ImgWriteVis for $slice {
                fn to_vis_png(&self) -> ImageResult<Vec<u8>> {
                    let buf: Vec<u8> = self.iter().map(|p| pretty(*p)).collect();
                    encode_gray_png(&buf, self.shape())
                }
            }

            /// 按原样存储.
            impl ImgWriteRaw for $slice {
                fn to_raw_png(&self) -> ImageResult<Vec<u8>> {
                    encode_gray_png(self.as_row_major_slice().as_ref(), self.shape())
                }
            }
        )+
    };
}

impl_label_png!(LabelSlice<'_>, LabelSliceMut<'_>);
