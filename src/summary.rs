// 该文件是 annotate-batch 项目的一部分。
// src/summary.rs - 单张图像检测统计
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

use std::collections::HashSet;

use crate::model::DetectionSet;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
  pub count: usize,
  pub unique_class_count: usize,
  /// 没有检测时为 0.0
  pub mean_confidence: f32,
}

impl Summary {
  /// `Classes: <类别数> | Conf: <平均置信度>`，没有检测时为 `None`
  pub fn caption(&self) -> Option<String> {
    (self.count > 0).then(|| {
      format!(
        "Classes: {} | Conf: {:.2}",
        self.unique_class_count, self.mean_confidence
      )
    })
  }
}

pub const NO_OBJECTS_DETECTED: &str = "No objects detected";

pub fn summarize(detections: &DetectionSet, detected_class_names: &[String]) -> Summary {
  let count = detections.len();
  let unique_class_count = detected_class_names.iter().collect::<HashSet<_>>().len();
  let mean_confidence = if count == 0 {
    0.0
  } else {
    let total: f64 = detections.iter().map(|det| det.confidence as f64).sum();
    (total / count as f64) as f32
  };

  Summary {
    count,
    unique_class_count,
    mean_confidence,
  }
}

/// 检测到的类别名，以 `, ` 连接
pub fn detected_list(detected_class_names: &[String]) -> String {
  detected_class_names.join(", ")
}
