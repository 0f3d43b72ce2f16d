// 该文件是 annotate-batch 项目的一部分。
// src/model/normalize.rs - 原始检测结果规范化
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

use thiserror::Error;
use tracing::{debug, error};

use crate::model::{Detection, DetectionSet, RawDetection};

/// 模型输出违反取值约束；整张图像的检测步骤失败，不会只丢弃单个检测
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedDetectionError {
  #[error("第 {index} 个检测的置信度 {confidence} 不在 [0, 1] 范围内")]
  ConfidenceOutOfRange { index: usize, confidence: f32 },
  #[error("第 {index} 个检测的置信度 {confidence} 低于阈值 {threshold}")]
  BelowThreshold {
    index: usize,
    confidence: f32,
    threshold: f32,
  },
  #[error("第 {index} 个检测的类别 ID {class_id} 无效")]
  InvalidClassId { index: usize, class_id: f32 },
  #[error("第 {index} 个检测的边界框 {bbox:?} 无效")]
  InvalidBbox { index: usize, bbox: [f32; 4] },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DetectionNormalizer {
  threshold: Option<f32>,
}

impl DetectionNormalizer {
  pub fn new() -> Self {
    Self::default()
  }

  /// 低于该阈值的检测视为模型违约
  pub fn with_threshold(mut self, threshold: f32) -> Self {
    self.threshold = Some(threshold);
    self
  }

  pub fn normalize(&self, raw: &[RawDetection]) -> Result<DetectionSet, MalformedDetectionError> {
    let items = raw
      .iter()
      .enumerate()
      .map(|(index, det)| self.normalize_one(index, det))
      .collect::<Result<Vec<_>, _>>()
      .inspect_err(|e| error!("模型输出不合法: {}", e))?;

    debug!("规范化 {} 个检测结果", items.len());
    Ok(DetectionSet::from_items(items))
  }

  fn normalize_one(
    &self,
    index: usize,
    raw: &RawDetection,
  ) -> Result<Detection, MalformedDetectionError> {
    let confidence = raw.confidence;
    if !(0.0..=1.0).contains(&confidence) {
      return Err(MalformedDetectionError::ConfidenceOutOfRange { index, confidence });
    }
    if let Some(threshold) = self.threshold
      && confidence < threshold
    {
      return Err(MalformedDetectionError::BelowThreshold {
        index,
        confidence,
        threshold,
      });
    }

    let class_id = raw.class_id;
    if !class_id.is_finite() || class_id < 0.0 || class_id >= u32::MAX as f32 {
      return Err(MalformedDetectionError::InvalidClassId { index, class_id });
    }

    let bbox = raw.bbox;
    let [x_min, y_min, x_max, y_max] = bbox;
    if bbox.iter().any(|v| !v.is_finite()) || x_min >= x_max || y_min >= y_max {
      return Err(MalformedDetectionError::InvalidBbox { index, bbox });
    }

    Ok(Detection {
      bbox,
      confidence,
      // 与模型输出一致，向零截断
      class_id: class_id as u32,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn raw(class_id: f32, confidence: f32) -> RawDetection {
    RawDetection {
      bbox: [1.0, 2.0, 10.0, 20.0],
      confidence,
      class_id,
    }
  }

  #[test]
  fn test_preserves_cardinality_and_order() {
    let input = vec![raw(3.0, 0.9), raw(0.0, 0.4), raw(7.0, 0.6), raw(3.0, 1.0)];
    let set = DetectionNormalizer::new().normalize(&input).unwrap();

    assert_eq!(set.len(), input.len());
    for (det, raw) in set.iter().zip(&input) {
      assert_eq!(det.class_id as f32, raw.class_id);
      assert_eq!(det.confidence, raw.confidence);
      assert_eq!(det.bbox, raw.bbox);
    }
  }

  #[test]
  fn test_empty_input() {
    let set = DetectionNormalizer::new().normalize(&[]).unwrap();
    assert!(set.is_empty());
  }

  #[test]
  fn test_class_id_is_truncated() {
    let set = DetectionNormalizer::new()
      .normalize(&[raw(2.9999, 0.5)])
      .unwrap();
    assert_eq!(set.as_slice()[0].class_id, 2);
  }

  #[test]
  fn test_out_of_range_confidence_fails_whole_set() {
    let input = vec![raw(0.0, 0.5), raw(1.0, 1.5)];
    assert_eq!(
      DetectionNormalizer::new().normalize(&input),
      Err(MalformedDetectionError::ConfidenceOutOfRange {
        index: 1,
        confidence: 1.5
      })
    );

    assert!(matches!(
      DetectionNormalizer::new().normalize(&[raw(0.0, f32::NAN)]),
      Err(MalformedDetectionError::ConfidenceOutOfRange { index: 0, .. })
    ));
  }

  #[test]
  fn test_negative_class_id_fails() {
    assert_eq!(
      DetectionNormalizer::new().normalize(&[raw(-1.0, 0.5)]),
      Err(MalformedDetectionError::InvalidClassId {
        index: 0,
        class_id: -1.0
      })
    );
  }

  #[test]
  fn test_class_id_beyond_u32_fails() {
    assert!(matches!(
      DetectionNormalizer::new().normalize(&[raw(4_294_967_296.0, 0.5)]),
      Err(MalformedDetectionError::InvalidClassId { index: 0, .. })
    ));
    let set = DetectionNormalizer::new()
      .normalize(&[raw(4_294_967_040.0, 0.5)])
      .unwrap();
    assert_eq!(set.as_slice()[0].class_id, 4_294_967_040);
  }

  #[test]
  fn test_inverted_bbox_fails() {
    let det = RawDetection {
      bbox: [10.0, 2.0, 1.0, 20.0],
      confidence: 0.5,
      class_id: 0.0,
    };
    assert!(matches!(
      DetectionNormalizer::new().normalize(&[det]),
      Err(MalformedDetectionError::InvalidBbox { index: 0, .. })
    ));
  }

  #[test]
  fn test_below_threshold_is_rejected() {
    let normalizer = DetectionNormalizer::new().with_threshold(0.5);
    assert!(normalizer.normalize(&[raw(0.0, 0.5)]).is_ok());
    assert!(matches!(
      normalizer.normalize(&[raw(0.0, 0.49)]),
      Err(MalformedDetectionError::BelowThreshold { index: 0, .. })
    ));
  }
}
