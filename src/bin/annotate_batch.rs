// 该文件是 annotate-batch 项目的一部分。
// src/bin/annotate_batch.rs - 批量标注命令行工具
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
};

use ab_glyph::FontArc;
use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use annotate_batch::{
  FromUrl,
  input::{UploadedFile, decode},
  model::{ClassNameTable, RecordReplayModel},
  output::{DirectoryRecordOutput, LogOutput, Render, draw::Annotator},
  task::{BatchPipeline, FailurePolicy},
};

/// 批量目标检测标注
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测记录目录，每张图片对应 `<文件名去扩展名>.txt`
  #[arg(long, value_name = "DIR")]
  pub records: PathBuf,

  /// 类别表 JSON 文件（数组或对象），缺省为 COCO 80 类
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,

  /// 输出路径，例如 folder:///tmp/annotated
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.3", value_name = "THRESHOLD")]
  pub confidence: f32,

  /// 标签中不显示置信度
  #[arg(long)]
  pub hide_confidence: bool,

  /// 任一文件失败即中止
  #[arg(long)]
  pub strict: bool,

  /// 标签使用的 TrueType 字体，缺省使用内置点阵字体
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 字体大小（像素）
  #[arg(long, default_value = "16.0", value_name = "PX")]
  pub font_size: f32,

  /// 输入图片（JPEG/PNG）
  #[arg(required = true, value_name = "IMAGE")]
  pub inputs: Vec<PathBuf>,
}

/// 每个输入图片对应的检测记录文件 `<records>/<文件名去扩展名>.txt`
///
/// 文件名去扩展名后重复的输入会读到同一个记录文件，直接报错。
fn record_paths(records: &Path, inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
  let mut seen = HashMap::new();
  inputs
    .iter()
    .map(|path| {
      let stem = path
        .file_stem()
        .ok_or_else(|| anyhow!("无法确定文件名: {}", path.display()))?
        .to_string_lossy();
      if let Some(previous) = seen.insert(stem.to_string(), path) {
        bail!(
          "{} 与 {} 对应同一个检测记录 {}.txt",
          previous.display(),
          path.display(),
          stem
        );
      }
      Ok(records.join(format!("{}.txt", stem)))
    })
    .collect()
}

fn load_model(args: &Args, files: &[UploadedFile]) -> Result<RecordReplayModel> {
  let class_names = match &args.labels {
    Some(path) => ClassNameTable::from_json_file(path)
      .with_context(|| format!("无法加载类别表: {}", path.display()))?,
    None => ClassNameTable::coco(),
  };

  let mut model = RecordReplayModel::new(class_names);
  let records = record_paths(&args.records, &args.inputs)?;
  for (file, record) in files.iter().zip(&records) {
    // 只有能解码的文件才会调用模型，记录按同样的顺序登记
    if decode(&file.bytes).is_err() {
      continue;
    }

    if record.exists() {
      model
        .register_file(record)
        .with_context(|| format!("无法读取检测记录: {}", record.display()))?;
    } else {
      warn!("没有检测记录: {}，视为无检测", record.display());
      model.register(Vec::new());
    }
  }
  Ok(model)
}

fn load_annotator(args: &Args) -> Result<Annotator> {
  let annotator = Annotator::new();
  let Some(path) = &args.font else {
    return Ok(annotator);
  };

  let data =
    std::fs::read(path).with_context(|| format!("无法读取字体文件: {}", path.display()))?;
  let font = FontArc::try_from_vec(data)
    .map_err(|e| anyhow!("无法加载字体 {}: {}", path.display(), e))?;
  Ok(annotator.with_font(font, args.font_size))
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  info!("检测记录目录: {}", args.records.display());
  info!("输入图片: {} 张", args.inputs.len());
  info!("置信度阈值: {}", args.confidence);

  let files = args
    .inputs
    .iter()
    .map(|path| {
      UploadedFile::from_path(path).with_context(|| format!("无法读取文件: {}", path.display()))
    })
    .collect::<Result<Vec<_>>>()?;

  let model = load_model(&args, &files)?;
  let pipeline = BatchPipeline::builder()
    .confidence_threshold(args.confidence)
    .show_confidence(!args.hide_confidence)
    .failure_policy(if args.strict {
      FailurePolicy::Abort
    } else {
      FailurePolicy::Skip
    })
    .annotator(load_annotator(&args)?)
    .build()?;

  let now = std::time::Instant::now();
  let batch = pipeline.run(&model, &files, &mut |fraction: f32| {
    info!("进度: {:.0}%", fraction * 100.0);
  })?;
  info!("处理完成，耗时: {:.2?}", now.elapsed());

  LogOutput.render_result(&batch)?;

  if let Some(url) = &args.output {
    DirectoryRecordOutput::from_url(url)?.render_result(&batch)?;
  }

  Ok(())
}
