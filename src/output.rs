// 该文件是 annotate-batch 项目的一部分。
// src/output.rs - 输出定义
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

use tracing::{info, warn};

use crate::{
  summary::{NO_OBJECTS_DETECTED, detected_list},
  task::BatchResult,
};

pub trait Render<R>: Sized {
  type Error;
  fn render_result(&self, result: &R) -> Result<(), Self::Error>;
}

mod bitmap_font;
pub mod draw;

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

/// 将每张图像的统计摘要写入日志
pub struct LogOutput;

impl Render<BatchResult> for LogOutput {
  type Error = std::convert::Infallible;

  fn render_result(&self, batch: &BatchResult) -> Result<(), Self::Error> {
    for (row, results) in batch.rows().enumerate() {
      info!("---- 第 {} 行 ----", row + 1);
      for result in results {
        let summary = result.summary();
        match summary.caption() {
          Some(caption) => {
            info!(
              "Image {} ({}) | Detections: {} | {}",
              result.sequence_index(),
              result.name(),
              summary.count,
              caption
            );
            info!("  Detected: {}", detected_list(result.detected_class_names()));
          }
          None => info!(
            "Image {} ({}) | {}",
            result.sequence_index(),
            result.name(),
            NO_OBJECTS_DETECTED
          ),
        }
      }
    }

    for skipped in batch.skipped() {
      warn!(
        "Image {} ({}) 已跳过: {}",
        skipped.sequence_index, skipped.name, skipped.reason
      );
    }
    Ok(())
  }
}
