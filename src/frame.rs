// 该文件是 annotate-batch 项目的一部分。
// src/frame.rs - HWC RGB 像素图像定义
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

use image::{Rgb, RgbImage};

pub const RGB_CHANNELS: usize = 3;

/// 解码后的图像，形状为 (height, width, 3)，通道顺序固定为 RGB。
///
/// 宽高总是大于 0；只能通过 [`PixelImage::from_rgb`] 或解码器构造。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelImage {
  data: RgbImage,
}

impl PixelImage {
  /// 从 RGB 图像构造，宽或高为 0 时返回 `None`
  pub fn from_rgb(image: RgbImage) -> Option<Self> {
    if image.width() == 0 || image.height() == 0 {
      return None;
    }
    Some(Self { data: image })
  }

  pub fn height(&self) -> usize {
    self.data.height() as usize
  }

  pub fn width(&self) -> usize {
    self.data.width() as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// (height, width, channels)
  pub fn shape(&self) -> (usize, usize, usize) {
    (self.height(), self.width(), self.channels())
  }

  /// 读取 (row, col) 处的 RGB 值
  pub fn pixel(&self, row: usize, col: usize) -> Option<[u8; 3]> {
    if row >= self.height() || col >= self.width() {
      return None;
    }
    let Rgb(value) = *self.data.get_pixel(col as u32, row as u32);
    Some(value)
  }

  /// 按 HWC 排列的原始字节
  pub fn as_hwc(&self) -> &[u8] {
    self.data.as_raw()
  }

  pub fn as_rgb_image(&self) -> &RgbImage {
    &self.data
  }

  // 借出的缓冲区无法改变尺寸
  pub(crate) fn as_rgb_image_mut(&mut self) -> &mut RgbImage {
    &mut self.data
  }

  pub fn into_rgb_image(self) -> RgbImage {
    self.data
  }
}

impl AsRef<[u8]> for PixelImage {
  fn as_ref(&self) -> &[u8] {
    self.as_hwc()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_zero_sized_image_is_rejected() {
    assert!(PixelImage::from_rgb(RgbImage::new(0, 4)).is_none());
    assert!(PixelImage::from_rgb(RgbImage::new(4, 0)).is_none());
  }

  #[test]
  fn test_shape_and_pixel_access() {
    let mut rgb = RgbImage::new(3, 2);
    rgb.put_pixel(2, 1, Rgb([1, 2, 3]));
    let image = PixelImage::from_rgb(rgb).unwrap();

    assert_eq!(image.shape(), (2, 3, 3));
    assert_eq!(image.pixel(1, 2), Some([1, 2, 3]));
    assert_eq!(image.pixel(2, 0), None);
    assert_eq!(image.as_hwc().len(), 2 * 3 * 3);
  }
}
