//! 图片读取与 tensor 转换
//!
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use candle_core::{DType, Device, Tensor};
use image::{imageops::FilterType, DynamicImage, RgbImage};

use crate::error::Error;

/// 读取图片并转换为 RGB
pub fn load_rgb_image(path: &Path) -> Result<RgbImage, Error> {
    let image = image::open(path)?;
    Ok(image.to_rgb8())
}

/// 从内存解码图片并转换为 RGB
pub fn decode_rgb_image(bytes: &[u8]) -> Result<RgbImage, Error> {
    let image = image::load_from_memory(bytes)?;
    Ok(image.to_rgb8())
}

/// 解码 base64 图片, 支持 `data:image/png;base64,` 前缀
pub fn decode_base64_image(data: &str) -> Result<RgbImage, Error> {
    let payload = match data.split_once(";base64,") {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload,
        _ => data,
    };
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::Decode(format!("base64 image, {e}")))?;
    decode_rgb_image(&bytes)
}

/// 图片预处理
///
/// resize 到 size x size, 像素归一化到 [-1, 1]
///
/// output: NCHW
pub fn image_to_pixel_values(
    image: &RgbImage,
    size: u32,
    device: &Device,
    dtype: DType,
) -> Result<Tensor, Error> {
    let resized = DynamicImage::ImageRgb8(image.clone())
        .resize_exact(size, size, FilterType::CatmullRom)
        .to_rgb8();

    let data = resized.into_raw();
    // HWC
    let tensor = Tensor::from_vec(data, (size as usize, size as usize, 3), device)?;
    // HWC -> CHW, (x / 255 - 0.5) / 0.5
    let tensor = tensor
        .permute((2, 0, 1))?
        .to_dtype(DType::F32)?
        .affine(1.0 / 127.5, -1.0)?
        .unsqueeze(0)?
        .to_dtype(dtype)?;

    Ok(tensor)
}
