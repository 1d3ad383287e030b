//! RGB 与 alpha 通道合成 RGBA，以及 RGB 转灰度

use crate::error::OcclusionError;
use crate::volume::{GrayVolume, RgbVolume, RgbaVolume};

/// 逐体素拷贝 R、G、B，并把 alpha 作为第 4 个通道
/// 结果沿用 RGB 体的间距和原点；两者尺寸不一致时报错
pub fn compose_rgba(rgb: &RgbVolume, alpha: &GrayVolume) -> Result<RgbaVolume, OcclusionError> {
    rgb.ensure_same_shape(alpha)?;

    let data = rgb
        .data()
        .iter()
        .zip(alpha.data())
        .map(|(&[r, g, b], &a)| [r, g, b, a])
        .collect();
    Ok(RgbaVolume::new(rgb.shape(), data)?.with_geometry_of(rgb))
}

/// 亮度 0.30 R + 0.59 G + 0.11 B，截断为 u8
/// 用整数百分比计算，避免白色因浮点误差落到 254
pub fn luminance([r, g, b]: [u8; 3]) -> u8 {
    let y = (30 * u32::from(r) + 59 * u32::from(g) + 11 * u32::from(b)) / 100;
    y.min(255) as u8
}

pub fn rgb_to_gray(rgb: &RgbVolume) -> GrayVolume {
    rgb.map(|&px| luminance(px))
}
