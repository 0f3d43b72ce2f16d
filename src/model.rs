// 该文件是 annotate-batch 项目的一部分。
// src/model.rs - 检测模型与检测结果
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

use crate::frame::PixelImage;

mod labels;
mod normalize;
mod record_replay;

pub use self::labels::{ClassNameTable, LabelFormatError, LabelFormatter, LabelTableError};
pub use self::normalize::{DetectionNormalizer, MalformedDetectionError};
pub use self::record_replay::{RecordReplayError, RecordReplayModel, parse_records};

/// 检测模型
///
/// 模型句柄在启动时创建一次，之后在每次批处理中以引用传入复用。
/// 类别表在模型初始化时加载，此后只读。
pub trait DetectionModel {
  type Error: std::error::Error + Send + Sync + 'static;

  fn class_names(&self) -> &ClassNameTable;

  /// 返回置信度不低于 `confidence_threshold` 的原始检测结果，保持模型输出顺序
  fn predict(
    &self,
    image: &PixelImage,
    confidence_threshold: f32,
  ) -> Result<Vec<RawDetection>, Self::Error>;
}

/// 模型输出的原始检测，类别 ID 可能以浮点数给出
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，像素坐标
  pub confidence: f32,
  pub class_id: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，像素坐标
  pub confidence: f32,
  pub class_id: u32,
}

impl Detection {
  pub fn width(&self) -> f32 {
    self.bbox[2] - self.bbox[0]
  }

  pub fn height(&self) -> f32 {
    self.bbox[3] - self.bbox[1]
  }
}

/// 同一张图像的检测结果，顺序即模型输出顺序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionSet {
  items: Box<[Detection]>,
}

impl DetectionSet {
  pub(crate) fn from_items(items: Vec<Detection>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
    self.items.iter()
  }

  pub fn as_slice(&self) -> &[Detection] {
    &self.items
  }

  pub fn get(&self, index: usize) -> Option<&Detection> {
    self.items.get(index)
  }
}

impl<'a> IntoIterator for &'a DetectionSet {
  type Item = &'a Detection;
  type IntoIter = std::slice::Iter<'a, Detection>;

  fn into_iter(self) -> Self::IntoIter {
    self.items.iter()
  }
}
