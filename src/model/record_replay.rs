// 该文件是 annotate-batch 项目的一部分。
// src/model/record_replay.rs - 回放已记录的检测结果
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

use std::{
  collections::VecDeque,
  path::Path,
  sync::{Mutex, PoisonError},
};

use thiserror::Error;
use tracing::{debug, info};

use crate::{
  frame::PixelImage,
  model::{ClassNameTable, DetectionModel, RawDetection},
};

const RECORD_FIELDS: usize = 6;

#[derive(Error, Debug)]
pub enum RecordReplayError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("第 {line} 行记录格式错误: {message}")]
  ParseError { line: usize, message: String },
  #[error("第 {call} 次推理没有对应的检测记录")]
  NoRecord { call: usize },
}

/// 解析检测记录，每行 `类别, score, x_min, y_min, x_max, y_max`
///
/// 类别可以是类别 ID，也可以是 `class_names` 中的类别名。
/// 空行和以 `#` 开头的行会被忽略。
pub fn parse_records(
  text: &str,
  class_names: &ClassNameTable,
) -> Result<Vec<RawDetection>, RecordReplayError> {
  let mut records = Vec::new();
  for (number, line) in text.lines().enumerate() {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
      continue;
    }

    let parse_error = |message: String| RecordReplayError::ParseError {
      line: number + 1,
      message,
    };

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != RECORD_FIELDS {
      return Err(parse_error(format!(
        "期望 {} 个字段, 实际 {} 个",
        RECORD_FIELDS,
        fields.len()
      )));
    }

    let class_id = match fields[0].parse::<f32>() {
      Ok(class_id) => class_id,
      Err(_) => class_names
        .id_of(fields[0])
        .map(|id| id as f32)
        .ok_or_else(|| parse_error(format!("未知类别 '{}'", fields[0])))?,
    };

    let values = fields[1..]
      .iter()
      .map(|field| {
        field
          .parse::<f32>()
          .map_err(|e| parse_error(format!("'{}': {}", field, e)))
      })
      .collect::<Result<Vec<_>, _>>()?;

    records.push(RawDetection {
      class_id,
      confidence: values[0],
      bbox: [values[1], values[2], values[3], values[4]],
    });
  }
  Ok(records)
}

#[derive(Default)]
struct ReplayQueue {
  pending: VecDeque<Vec<RawDetection>>,
  replayed: usize,
}

/// 按调用顺序回放事先记录的检测结果
///
/// 第 n 次 `predict` 返回第 n 次登记的记录，与图像内容无关。
/// 置信度阈值在回放时生效。
pub struct RecordReplayModel {
  class_names: ClassNameTable,
  queue: Mutex<ReplayQueue>,
}

impl RecordReplayModel {
  pub fn new(class_names: ClassNameTable) -> Self {
    Self {
      class_names,
      queue: Mutex::new(ReplayQueue::default()),
    }
  }

  fn queue(&self) -> std::sync::MutexGuard<'_, ReplayQueue> {
    self.queue.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn register(&mut self, records: Vec<RawDetection>) {
    let queue = self.queue.get_mut().unwrap_or_else(PoisonError::into_inner);
    debug!(
      "登记第 {} 组检测记录 ({} 条)",
      queue.replayed + queue.pending.len() + 1,
      records.len()
    );
    queue.pending.push_back(records);
  }

  pub fn register_file(&mut self, path: impl AsRef<Path>) -> Result<(), RecordReplayError> {
    let path = path.as_ref();
    let records = parse_records(&std::fs::read_to_string(path)?, &self.class_names)?;
    info!("读取检测记录: {} ({} 条)", path.display(), records.len());
    self.register(records);
    Ok(())
  }

  /// 尚未回放的记录组数
  pub fn remaining(&self) -> usize {
    self.queue().pending.len()
  }
}

impl DetectionModel for RecordReplayModel {
  type Error = RecordReplayError;

  fn class_names(&self) -> &ClassNameTable {
    &self.class_names
  }

  fn predict(
    &self,
    image: &PixelImage,
    confidence_threshold: f32,
  ) -> Result<Vec<RawDetection>, Self::Error> {
    let mut queue = self.queue();
    queue.replayed += 1;
    let call = queue.replayed;
    let records = queue
      .pending
      .pop_front()
      .ok_or(RecordReplayError::NoRecord { call })?;

    debug!(
      "回放第 {} 组记录到 {}x{} 图像",
      call,
      image.width(),
      image.height()
    );
    Ok(
      records
        .into_iter()
        .filter(|det| det.confidence >= confidence_threshold)
        .collect(),
    )
  }
}
