// 该文件是 annotate-batch 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::path::{Path, PathBuf};

use chrono::{Datelike, Utc};
use thiserror::Error;
use tracing::{error, info};

use crate::{
  FromUrl, FromUrlWithScheme,
  output::Render,
  summary::{NO_OBJECTS_DETECTED, detected_list},
  task::{BatchResult, ImageResult},
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 将批处理结果写入目录：原图、标注图、检测记录与摘要
///
/// 每次批处理写入 `<目录>/<年>/<月>/<日>/<时-分-秒>/`。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  label_with_name: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        uri.scheme()
      );
      return Err(DirectoryRecordOutputError::SchemeMismatch(
        uri.scheme().to_string(),
      ));
    }

    let label_with_name = uri
      .query_pairs()
      .any(|(k, v)| k == "record" && v == "name");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      label_with_name,
    })
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      label_with_name: false,
    }
  }

  /// 记录中写类别名而不是类别 ID
  pub fn with_label_name(mut self, label_with_name: bool) -> Self {
    self.label_with_name = label_with_name;
    self
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  fn batch_directory(&self) -> PathBuf {
    let now = Utc::now();
    self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()))
      .join(now.format("%H-%M-%S").to_string())
  }

  /// 每行 `类别, 置信度, x_min, y_min, x_max, y_max`
  fn record(&self, result: &ImageResult) -> String {
    result
      .detections()
      .iter()
      .zip(result.detected_class_names())
      .map(|(det, name)| {
        let kind = if self.label_with_name {
          name.clone()
        } else {
          det.class_id.to_string()
        };
        format!(
          "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
          kind, det.confidence, det.bbox[0], det.bbox[1], det.bbox[2], det.bbox[3]
        )
      })
      .collect::<Vec<_>>()
      .join("\n")
  }

  fn summary(batch: &BatchResult) -> String {
    let mut lines = Vec::new();
    for result in batch {
      let summary = result.summary();
      let line = match summary.caption() {
        Some(caption) => format!(
          "Image {} ({}): Detections: {} | {} | Detected: {}",
          result.sequence_index(),
          result.name(),
          summary.count,
          caption,
          detected_list(result.detected_class_names())
        ),
        None => format!(
          "Image {} ({}): {}",
          result.sequence_index(),
          result.name(),
          NO_OBJECTS_DETECTED
        ),
      };
      lines.push(line);
    }
    for skipped in batch.skipped() {
      lines.push(format!(
        "Image {} ({}): skipped: {}",
        skipped.sequence_index, skipped.name, skipped.reason
      ));
    }
    lines.join("\n")
  }

  pub fn write_batch(
    &self,
    directory: &Path,
    batch: &BatchResult,
  ) -> Result<(), DirectoryRecordOutputError> {
    std::fs::create_dir_all(directory)?;

    for result in batch {
      let stem = format!("image-{:04}", result.sequence_index());
      result
        .original()
        .as_rgb_image()
        .save(directory.join(format!("{}-original.png", stem)))?;
      result
        .annotated()
        .as_rgb_image()
        .save(directory.join(format!("{}-annotated.png", stem)))?;
      std::fs::write(directory.join(format!("{}.txt", stem)), self.record(result))?;
    }

    std::fs::write(directory.join("summary.txt"), Self::summary(batch))?;
    info!("保存 {} 个结果到目录: {}", batch.len(), directory.display());
    Ok(())
  }
}

impl Render<BatchResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, batch: &BatchResult) -> Result<(), Self::Error> {
    self.write_batch(&self.batch_directory(), batch)
  }
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use image::{ImageFormat, Rgb, RgbImage};

  use super::*;
  use crate::{
    input::UploadedFile,
    model::{ClassNameTable, RecordReplayModel, parse_records},
    task::{BatchPipeline, NoProgress},
  };

  fn png(value: u8) -> Vec<u8> {
    let image = RgbImage::from_pixel(32, 24, Rgb([value, value, value]));
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
  }

  fn batch() -> BatchResult {
    let files = vec![
      UploadedFile::new("busy.png", png(10)),
      UploadedFile::new("broken.png", b"broken".to_vec()),
      UploadedFile::new("quiet.png", png(20)),
    ];

    let table = ClassNameTable::from_names(["cat", "dog"]);
    let mut model = RecordReplayModel::new(table.clone());
    model.register(parse_records("1, 0.8, 2, 3, 20, 18\n0, 0.6, 4, 4, 10, 10", &table).unwrap());
    model.register(Vec::new());

    BatchPipeline::builder()
      .build()
      .unwrap()
      .run(&model, &files, &mut NoProgress)
      .unwrap()
  }

  #[test]
  fn test_from_url() {
    let url = url::Url::parse("folder:///tmp/out?record=name").unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert_eq!(output.directory(), Path::new("/tmp/out"));
    assert!(output.label_with_name);

    let url = url::Url::parse("image:///tmp/out.png").unwrap();
    assert!(matches!(
      DirectoryRecordOutput::from_url(&url),
      Err(DirectoryRecordOutputError::SchemeMismatch(_))
    ));
  }

  #[test]
  fn test_write_batch() {
    let dir = tempfile::tempdir().unwrap();
    let output = DirectoryRecordOutput::new(dir.path());
    output.write_batch(dir.path(), &batch()).unwrap();

    assert!(dir.path().join("image-0001-original.png").exists());
    assert!(dir.path().join("image-0001-annotated.png").exists());
    assert!(dir.path().join("image-0003-annotated.png").exists());
    assert!(!dir.path().join("image-0002-original.png").exists());

    // 记录文件可以被重新读取
    let text = std::fs::read_to_string(dir.path().join("image-0001.txt")).unwrap();
    let records = parse_records(&text, &ClassNameTable::coco()).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].class_id, 1.0);
    assert_eq!(records[1].bbox, [4.0, 4.0, 10.0, 10.0]);

    let summary = std::fs::read_to_string(dir.path().join("summary.txt")).unwrap();
    let lines: Vec<&str> = summary.lines().collect();
    assert_eq!(
      lines[0],
      "Image 1 (busy.png): Detections: 2 | Classes: 2 | Conf: 0.70 | Detected: dog, cat"
    );
    assert_eq!(lines[1], "Image 3 (quiet.png): No objects detected");
    assert!(lines[2].starts_with("Image 2 (broken.png): skipped: "));
  }

  #[test]
  fn test_record_with_names() {
    let output = DirectoryRecordOutput::new("unused").with_label_name(true);
    let batch = batch();
    let record = output.record(&batch.results()[0]);
    assert!(record.starts_with("dog, 0.8000, 2.0000, 3.0000, 20.0000, 18.0000"));

    // 写类别名的记录可以按同一类别表读回
    let table = ClassNameTable::from_names(["cat", "dog"]);
    let records = parse_records(&record, &table).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].class_id, 1.0);
    assert_eq!(records[1].class_id, 0.0);
    assert_eq!(records[1].bbox, [4.0, 4.0, 10.0, 10.0]);
  }
}
