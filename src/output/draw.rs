// 该文件是 annotate-batch 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, error};

use crate::{
  frame::PixelImage,
  model::{Detection, DetectionSet},
  output::bitmap_font,
};

// 绘制常量
const STROKE_WIDTH: i32 = 2;
const PALETTE_SIZE: usize = 80;
const LABEL_PADDING: u32 = 2;
const BITMAP_FONT_SCALE: u32 = 2;
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]); // 白色

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("标签数量 ({labels}) 与检测数量 ({detections}) 不一致")]
pub struct AnnotationInputError {
  pub detections: usize,
  pub labels: usize,
}

/// 绘制了检测框与标签的图像，与原图不共享存储
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedImage {
  image: PixelImage,
}

impl AnnotatedImage {
  pub fn as_image(&self) -> &PixelImage {
    &self.image
  }

  pub fn into_image(self) -> PixelImage {
    self.image
  }
}

impl std::ops::Deref for AnnotatedImage {
  type Target = PixelImage;

  fn deref(&self) -> &Self::Target {
    &self.image
  }
}

pub enum LabelFont {
  /// 内置 5x7 点阵字体，按整数倍放大
  Bitmap { scale: u32 },
  /// TrueType 字体
  Glyph { font: FontArc, scale: PxScale },
}

impl LabelFont {
  fn text_size(&self, text: &str) -> (u32, u32) {
    match self {
      LabelFont::Bitmap { scale } => bitmap_font::text_size(text, *scale),
      LabelFont::Glyph { font, scale } => text_size(*scale, font, text),
    }
  }

  fn draw_text(&self, image: &mut RgbImage, text: &str, x: i32, y: i32, color: Rgb<u8>) {
    match self {
      LabelFont::Bitmap { scale } => bitmap_font::draw_text(image, text, x, y, *scale, color),
      LabelFont::Glyph { font, scale } => draw_text_mut(image, color, x, y, *scale, font, text),
    }
  }
}

pub struct Annotator {
  font: LabelFont,
  colors: Vec<Rgb<u8>>,
}

impl Default for Annotator {
  fn default() -> Self {
    Self::new()
  }
}

impl Annotator {
  pub fn new() -> Self {
    Self {
      font: LabelFont::Bitmap {
        scale: BITMAP_FONT_SCALE,
      },
      // 每个类别一个固定颜色，保证输出确定
      colors: class_palette(PALETTE_SIZE),
    }
  }

  pub fn with_font(mut self, font: FontArc, size: f32) -> Self {
    self.font = LabelFont::Glyph {
      font,
      scale: PxScale::from(size),
    };
    self
  }

  pub fn class_color(&self, class_id: u32) -> Rgb<u8> {
    self.colors[class_id as usize % self.colors.len()]
  }

  /// 在图像副本上按顺序绘制检测框和标签，输入图像不会被修改
  pub fn annotate(
    &self,
    image: &PixelImage,
    detections: &DetectionSet,
    labels: &[String],
  ) -> Result<AnnotatedImage, AnnotationInputError> {
    if labels.len() != detections.len() {
      let err = AnnotationInputError {
        detections: detections.len(),
        labels: labels.len(),
      };
      error!("{}", err);
      return Err(err);
    }

    let mut image = image.clone();
    for (detection, label) in detections.iter().zip(labels) {
      self.draw_bbox_with_label(image.as_rgb_image_mut(), detection, label);
    }

    Ok(AnnotatedImage { image })
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, detection: &Detection, label: &str) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    let [x0, y0, x1, y1] = detection.bbox;

    // 完全落在图像外的框没有可见像素
    if x1 <= 0.0 || y1 <= 0.0 || x0 >= w as f32 || y0 >= h as f32 {
      debug!("检测框 {:?} 完全位于图像外", detection.bbox);
      return;
    }

    // 裁剪到图像范围
    let x_min = (x0.floor() as i32).clamp(0, w - 1);
    let y_min = (y0.floor() as i32).clamp(0, h - 1);
    let x_max = (x1.ceil() as i32 - 1).clamp(x_min, w - 1);
    let y_max = (y1.ceil() as i32 - 1).clamp(y_min, h - 1);

    let color = self.class_color(detection.class_id);

    for t in 0..STROKE_WIDTH {
      let (left, top, right, bottom) = (x_min + t, y_min + t, x_max - t, y_max - t);
      if left > right || top > bottom {
        break;
      }
      let rect = Rect::at(left, top).of_size((right - left + 1) as u32, (bottom - top + 1) as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    if label.is_empty() {
      return;
    }

    let (text_width, text_height) = self.font.text_size(label);
    let label_width = text_width + 2 * LABEL_PADDING;
    let label_height = text_height + 2 * LABEL_PADDING;

    // 优先放在框的左上角上方，上方放不下时放在框内
    let label_x = x_min.min(w - label_width as i32).max(0);
    let label_y = if y_min >= label_height as i32 {
      y_min - label_height as i32
    } else {
      y_min
    };

    let background = Rect::at(label_x, label_y).of_size(label_width, label_height);
    draw_filled_rect_mut(image, background, color);
    self.font.draw_text(
      image,
      label,
      label_x + LABEL_PADDING as i32,
      label_y + LABEL_PADDING as i32,
      LABEL_TEXT_COLOR,
    );
  }
}

/// 类别调色板：色相在色环上均分，饱和度与亮度固定
fn class_palette(size: usize) -> Vec<Rgb<u8>> {
  const SATURATION: f32 = 0.8;
  const VALUE: f32 = 0.9;

  let chroma = VALUE * SATURATION;
  let base = VALUE - chroma;
  let channel = |v: f32| ((v + base) * 255.0).round() as u8;

  (0..size)
    .map(|i| {
      // 色环分为六段，每段内一个分量线性变化
      let sector = i as f32 * 6.0 / size as f32;
      let ramp = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
      let (r, g, b) = match sector as u32 {
        0 => (chroma, ramp, 0.0),
        1 => (ramp, chroma, 0.0),
        2 => (0.0, chroma, ramp),
        3 => (0.0, ramp, chroma),
        4 => (ramp, 0.0, chroma),
        _ => (chroma, 0.0, ramp),
      };
      Rgb([channel(r), channel(g), channel(b)])
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn gray_image(width: u32, height: u32) -> PixelImage {
    PixelImage::from_rgb(RgbImage::from_pixel(width, height, Rgb([40, 40, 40]))).unwrap()
  }

  fn detections(items: &[([f32; 4], u32)]) -> DetectionSet {
    DetectionSet::from_items(
      items
        .iter()
        .map(|&(bbox, class_id)| Detection {
          bbox,
          confidence: 0.9,
          class_id,
        })
        .collect(),
    )
  }

  fn labels(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("obj{} 0.90", i)).collect()
  }

  #[test]
  fn test_input_is_not_mutated() {
    let image = gray_image(64, 48);
    let before = image.as_hwc().to_vec();
    let dets = detections(&[([5.0, 20.0, 30.0, 40.0], 0), ([10.0, 10.0, 60.0, 45.0], 3)]);

    let annotated = Annotator::new()
      .annotate(&image, &dets, &labels(2))
      .unwrap();

    assert_eq!(image.as_hwc(), &before[..]);
    assert_ne!(annotated.as_hwc(), &before[..]);
    assert_eq!(annotated.shape(), image.shape());
  }

  #[test]
  fn test_label_count_mismatch() {
    let image = gray_image(16, 16);
    let dets = detections(&[([1.0, 1.0, 8.0, 8.0], 0)]);
    assert_eq!(
      Annotator::new().annotate(&image, &dets, &[]),
      Err(AnnotationInputError {
        detections: 1,
        labels: 0
      })
    );
  }

  #[test]
  fn test_annotation_is_deterministic() {
    let dets = detections(&[([2.0, 30.0, 40.0, 60.0], 1), ([20.0, 5.0, 70.0, 50.0], 7)]);
    let annotator = Annotator::new();

    let first = annotator.annotate(&gray_image(80, 64), &dets, &labels(2)).unwrap();
    let second = annotator.annotate(&gray_image(80, 64), &dets, &labels(2)).unwrap();
    assert_eq!(first.as_hwc(), second.as_hwc());
  }

  #[test]
  fn test_stroke_is_drawn_at_bbox() {
    let image = gray_image(64, 64);
    let dets = detections(&[([10.0, 30.0, 40.0, 50.0], 0)]);
    let annotator = Annotator::new();
    let color = annotator.class_color(0).0;

    let annotated = annotator.annotate(&image, &dets, &[String::new()]).unwrap();

    // 两像素宽的边框
    assert_eq!(annotated.pixel(30, 20), Some(color));
    assert_eq!(annotated.pixel(31, 20), Some(color));
    assert_eq!(annotated.pixel(32, 20), Some([40, 40, 40]));
    assert_eq!(annotated.pixel(49, 39), Some(color));
    // 框内不填充
    assert_eq!(annotated.pixel(40, 25), Some([40, 40, 40]));
  }

  #[test]
  fn test_partially_outside_box_is_clipped() {
    let image = gray_image(32, 32);
    let dets = detections(&[([-10.0, -10.0, 16.0, 40.0], 2)]);
    let annotator = Annotator::new();
    let color = annotator.class_color(2).0;

    let annotated = annotator.annotate(&image, &dets, &[String::new()]).unwrap();

    // 左边与下边被裁剪到图像边缘
    assert_eq!(annotated.pixel(16, 0), Some(color));
    assert_eq!(annotated.pixel(31, 8), Some(color));
    assert_eq!(annotated.pixel(20, 15), Some(color));
  }

  #[test]
  fn test_box_outside_image_leaves_it_untouched() {
    let image = gray_image(16, 16);
    let dets = detections(&[([20.0, 20.0, 30.0, 30.0], 0)]);
    let annotated = Annotator::new()
      .annotate(&image, &dets, &labels(1))
      .unwrap();
    assert_eq!(annotated.as_hwc(), image.as_hwc());
  }

  #[test]
  fn test_label_background_above_box() {
    let image = gray_image(128, 128);
    let dets = detections(&[([20.0, 60.0, 100.0, 120.0], 5)]);
    let annotator = Annotator::new();
    let color = annotator.class_color(5).0;

    let annotated = annotator
      .annotate(&image, &dets, &["cat".to_string()])
      .unwrap();

    // 背景左上角在框的上方
    let label_height = 7 * BITMAP_FONT_SCALE + 2 * LABEL_PADDING;
    assert_eq!(annotated.pixel(60 - label_height as usize, 20), Some(color));
  }

  #[test]
  fn test_class_palette() {
    // 红、绿、蓝三段的起点各只有一个主分量
    let palette = class_palette(6);
    for (index, main) in [(0, 0), (2, 1), (4, 2)] {
      let Rgb(color) = palette[index];
      for channel in 0..3 {
        if channel == main {
          assert!(color[channel] > 220, "{:?}", color);
        } else {
          assert_eq!(color[channel], 46, "{:?}", color);
        }
      }
    }

    let annotator = Annotator::new();
    assert_eq!(annotator.class_color(3), annotator.class_color(3 + PALETTE_SIZE as u32));
    assert_ne!(annotator.class_color(0), annotator.class_color(1));
  }

  #[test]
  fn test_label_inside_box_without_room_above() {
    let image = gray_image(128, 128);
    let dets = detections(&[([10.0, 2.0, 60.0, 40.0], 5)]);
    let annotator = Annotator::new();
    let color = annotator.class_color(5).0;

    let annotated = annotator
      .annotate(&image, &dets, &["cat".to_string()])
      .unwrap();

    // 背景从 y_min 开始向下，占据框内顶部
    let label_height = 7 * BITMAP_FONT_SCALE + 2 * LABEL_PADDING;
    let bottom = 2 + label_height as usize - 1;
    assert_eq!(annotated.pixel(bottom, 30), Some(color));
    assert_eq!(annotated.pixel(bottom + 1, 30), Some([40, 40, 40]));
    assert_eq!(annotated.pixel(0, 30), Some([40, 40, 40]));
  }

  #[test]
  fn test_label_shifted_left_at_right_edge() {
    let image = gray_image(128, 64);
    let dets = detections(&[([100.0, 40.0, 126.0, 60.0], 1)]);
    let annotator = Annotator::new();
    let color = annotator.class_color(1).0;

    let annotated = annotator
      .annotate(&image, &dets, &["cat 0.90".to_string()])
      .unwrap();

    let (text_width, text_height) = bitmap_font::text_size("cat 0.90", BITMAP_FONT_SCALE);
    let label_width = (text_width + 2 * LABEL_PADDING) as usize;
    let label_top = 40 - (text_height + 2 * LABEL_PADDING) as usize;
    let label_x = 128 - label_width;

    assert_eq!(annotated.pixel(label_top, label_x), Some(color));
    assert_eq!(annotated.pixel(label_top, 127), Some(color));
    assert_eq!(annotated.pixel(label_top, label_x - 1), Some([40, 40, 40]));
  }
}
