// 该文件是 annotate-batch 项目的一部分。
// src/task.rs - 批量检测任务
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

use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  frame::PixelImage,
  input::{DecodeError, UploadedFile, decode},
  model::{
    DetectionModel, DetectionNormalizer, DetectionSet, LabelFormatError, LabelFormatter,
    MalformedDetectionError,
  },
  output::draw::{AnnotatedImage, AnnotationInputError, Annotator},
  summary::{Summary, summarize},
};

/// 展示层每行的结果数
pub const ROW_SIZE: usize = 3;

const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("图像解码失败: {0}")]
  Decode(#[from] DecodeError),
  #[error("模型推理失败: {0}")]
  Inference(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("模型输出不合法: {0}")]
  MalformedDetection(#[from] MalformedDetectionError),
  #[error("标签生成失败: {0}")]
  LabelFormat(#[from] LabelFormatError),
  #[error("标注输入不合法: {0}")]
  AnnotationInput(#[from] AnnotationInputError),
}

impl PipelineError {
  /// 是否属于内部约定被破坏，而不是输入数据本身的问题
  pub fn is_contract_violation(&self) -> bool {
    matches!(
      self,
      PipelineError::MalformedDetection(_)
        | PipelineError::LabelFormat(_)
        | PipelineError::AnnotationInput(_)
    )
  }
}

#[derive(Error, Debug)]
#[error("第 {sequence_index} 个文件 {name} 处理失败，批处理中止: {source}")]
pub struct BatchAborted {
  pub sequence_index: usize,
  pub name: String,
  #[source]
  pub source: PipelineError,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
  #[error("置信度阈值必须在 [0, 1] 范围内, 实际为 {0}")]
  ConfidenceThreshold(f32),
}

/// 单个文件失败时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
  /// 记录原因并继续处理后续文件
  #[default]
  Skip,
  /// 立即中止整个批处理
  Abort,
}

/// 进度回调，每处理完一个文件调用一次，参数在 (0, 1] 内
pub trait Progress {
  fn report(&mut self, fraction: f32);
}

impl<F: FnMut(f32)> Progress for F {
  fn report(&mut self, fraction: f32) {
    self(fraction)
  }
}

/// 忽略进度
pub struct NoProgress;

impl Progress for NoProgress {
  fn report(&mut self, _fraction: f32) {}
}

/// 单个上传文件的处理结果，创建后不可修改
#[derive(Debug, Clone)]
pub struct ImageResult {
  sequence_index: usize,
  name: String,
  original: PixelImage,
  annotated: AnnotatedImage,
  detections: DetectionSet,
  detected_class_names: Vec<String>,
  summary: Summary,
}

impl ImageResult {
  /// 上传顺序中的位置，从 1 开始
  pub fn sequence_index(&self) -> usize {
    self.sequence_index
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn original(&self) -> &PixelImage {
    &self.original
  }

  pub fn annotated(&self) -> &AnnotatedImage {
    &self.annotated
  }

  pub fn detections(&self) -> &DetectionSet {
    &self.detections
  }

  /// 与 `detections()` 按下标对齐
  pub fn detected_class_names(&self) -> &[String] {
    &self.detected_class_names
  }

  pub fn summary(&self) -> &Summary {
    &self.summary
  }
}

/// 被跳过的文件及原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
  pub sequence_index: usize,
  pub name: String,
  pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct BatchResult {
  results: Vec<ImageResult>,
  skipped: Vec<SkippedFile>,
}

impl BatchResult {
  /// 成功处理的结果，保持上传顺序
  pub fn results(&self) -> &[ImageResult] {
    &self.results
  }

  pub fn skipped(&self) -> &[SkippedFile] {
    &self.skipped
  }

  pub fn len(&self) -> usize {
    self.results.len()
  }

  pub fn is_empty(&self) -> bool {
    self.results.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, ImageResult> {
    self.results.iter()
  }

  /// 按每行三个分组，顺序不变
  pub fn rows(&self) -> std::slice::Chunks<'_, ImageResult> {
    self.results.chunks(ROW_SIZE)
  }

  pub fn into_results(self) -> Vec<ImageResult> {
    self.results
  }
}

impl<'a> IntoIterator for &'a BatchResult {
  type Item = &'a ImageResult;
  type IntoIter = std::slice::Iter<'a, ImageResult>;

  fn into_iter(self) -> Self::IntoIter {
    self.results.iter()
  }
}

pub struct BatchPipelineBuilder {
  confidence_threshold: f32,
  show_confidence: bool,
  failure_policy: FailurePolicy,
  annotator: Option<Annotator>,
}

impl Default for BatchPipelineBuilder {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      show_confidence: true,
      failure_policy: FailurePolicy::default(),
      annotator: None,
    }
  }
}

impl BatchPipelineBuilder {
  pub fn confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn show_confidence(mut self, show: bool) -> Self {
    self.show_confidence = show;
    self
  }

  pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
    self.failure_policy = policy;
    self
  }

  pub fn annotator(mut self, annotator: Annotator) -> Self {
    self.annotator = Some(annotator);
    self
  }

  pub fn build(self) -> Result<BatchPipeline, ConfigError> {
    if !(0.0..=1.0).contains(&self.confidence_threshold) {
      error!("置信度阈值不合法: {}", self.confidence_threshold);
      return Err(ConfigError::ConfidenceThreshold(self.confidence_threshold));
    }

    debug!(
      "批处理配置: 阈值 {}, 显示置信度 {}, 失败策略 {:?}",
      self.confidence_threshold, self.show_confidence, self.failure_policy
    );

    Ok(BatchPipeline {
      confidence_threshold: self.confidence_threshold,
      show_confidence: self.show_confidence,
      failure_policy: self.failure_policy,
      annotator: self.annotator.unwrap_or_default(),
    })
  }
}

/// 对一批上传文件依次执行 解码 → 推理 → 规范化 → 标签 → 标注 → 统计
pub struct BatchPipeline {
  confidence_threshold: f32,
  show_confidence: bool,
  failure_policy: FailurePolicy,
  annotator: Annotator,
}

impl BatchPipeline {
  pub fn builder() -> BatchPipelineBuilder {
    BatchPipelineBuilder::default()
  }

  pub fn confidence_threshold(&self) -> f32 {
    self.confidence_threshold
  }

  pub fn show_confidence(&self) -> bool {
    self.show_confidence
  }

  pub fn run<M, P>(
    &self,
    model: &M,
    files: &[UploadedFile],
    progress: &mut P,
  ) -> Result<BatchResult, BatchAborted>
  where
    M: DetectionModel + ?Sized,
    P: Progress + ?Sized,
  {
    info!("开始批处理, 共 {} 个文件", files.len());
    let total = files.len();
    let mut batch = BatchResult::default();

    for (position, file) in files.iter().enumerate() {
      let sequence_index = position + 1;
      let outcome = self.process_file(model, sequence_index, file);
      progress.report(sequence_index as f32 / total as f32);

      match outcome {
        Ok(result) => batch.results.push(result),
        Err(e) => {
          if e.is_contract_violation() {
            error!("({}) {} 处理失败: {}", sequence_index, file.name, e);
          } else {
            warn!("({}) {} 处理失败: {}", sequence_index, file.name, e);
          }

          if self.failure_policy == FailurePolicy::Abort {
            return Err(BatchAborted {
              sequence_index,
              name: file.name.clone(),
              source: e,
            });
          }

          batch.skipped.push(SkippedFile {
            sequence_index,
            name: file.name.clone(),
            reason: e.to_string(),
          });
        }
      }
    }

    info!(
      "批处理完成: 成功 {} 个, 跳过 {} 个",
      batch.results.len(),
      batch.skipped.len()
    );
    Ok(batch)
  }

  pub fn process_file<M>(
    &self,
    model: &M,
    sequence_index: usize,
    file: &UploadedFile,
  ) -> Result<ImageResult, PipelineError>
  where
    M: DetectionModel + ?Sized,
  {
    debug!("({}) 解码 {} ({} 字节)", sequence_index, file.name, file.bytes.len());
    let original = decode(&file.bytes)?;

    let now = Instant::now();
    let raw = model
      .predict(&original, self.confidence_threshold)
      .map_err(|e| PipelineError::Inference(Box::new(e)))?;
    debug!(
      "({}) 推理完成，耗时: {:.2?}, 原始检测 {} 个",
      sequence_index,
      now.elapsed(),
      raw.len()
    );

    let detections = DetectionNormalizer::new()
      .with_threshold(self.confidence_threshold)
      .normalize(&raw)?;

    let formatter = LabelFormatter::new(model.class_names());
    let labels = formatter.labels(&detections, self.show_confidence)?;
    let detected_class_names = formatter.class_names(&detections)?;

    let annotated = self.annotator.annotate(&original, &detections, &labels)?;
    let summary = summarize(&detections, &detected_class_names);
    info!(
      "({}) {}: 检测到 {} 个对象",
      sequence_index, file.name, summary.count
    );

    Ok(ImageResult {
      sequence_index,
      name: file.name.clone(),
      original,
      annotated,
      detections,
      detected_class_names,
      summary,
    })
  }
}
