// 该文件是 annotate-batch 项目的一部分。
// src/input/decode.rs - 图像字节解码
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use image::ImageFormat;
use thiserror::Error;
use tracing::debug;

use crate::frame::PixelImage;

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("空的图像数据")]
  Empty,
  #[error("无法识别的图像格式: {0}")]
  UnrecognizedFormat(#[source] image::ImageError),
  #[error("不支持的图像格式: {0:?}（仅支持 JPEG/PNG）")]
  Unsupported(ImageFormat),
  #[error("图像解码错误: {0}")]
  Malformed(#[from] image::ImageError),
  #[error("图像宽或高为 0")]
  EmptyImage,
}

/// 将 JPEG/PNG 字节解码为 RGB 像素图像
///
/// 灰度、带 alpha 以及 16 位图像都会统一转换为 8 位 RGB。
pub fn decode(raw: &[u8]) -> Result<PixelImage, DecodeError> {
  if raw.is_empty() {
    return Err(DecodeError::Empty);
  }

  let format = image::guess_format(raw).map_err(DecodeError::UnrecognizedFormat)?;
  if !matches!(format, ImageFormat::Jpeg | ImageFormat::Png) {
    return Err(DecodeError::Unsupported(format));
  }

  let image = image::load_from_memory_with_format(raw, format)?;
  debug!(
    "解码 {:?} 图像: {}x{}, 颜色类型 {:?}",
    format,
    image.width(),
    image.height(),
    image.color()
  );

  PixelImage::from_rgb(image.to_rgb8()).ok_or(DecodeError::EmptyImage)
}
