// 该文件是 annotate-batch 项目的一部分。
// src/input.rs - 上传文件输入
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

use std::path::Path;

mod decode;
pub use self::decode::{DecodeError, decode};

/// 一个上传文件：文件名与未解码的原始字节
#[derive(Debug, Clone)]
pub struct UploadedFile {
  pub name: String,
  pub bytes: Vec<u8>,
}

impl UploadedFile {
  pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
    Self {
      name: name.into(),
      bytes: bytes.into(),
    }
  }

  /// 从磁盘读取文件，文件名取路径的最后一段
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let name = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_else(|| path.display().to_string());
    Ok(Self { name, bytes })
  }
}

impl<N: Into<String>, B: Into<Vec<u8>>> From<(N, B)> for UploadedFile {
  fn from((name, bytes): (N, B)) -> Self {
    Self::new(name, bytes)
  }
}
