// 该文件是 annotate-batch 项目的一部分。
// src/model/labels.rs - 类别表与标签文本
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

use std::{collections::BTreeMap, path::Path};

use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::model::DetectionSet;

const COCO_NAMES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

#[derive(Error, Debug)]
pub enum LabelTableError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("类别 ID 无效: {0}")]
  InvalidId(String),
  #[error("类别 {0} 的名称不是字符串")]
  InvalidName(String),
  #[error("类别表必须是 JSON 数组或对象")]
  UnexpectedShape,
  #[error("类别表为空")]
  Empty,
}

/// 类别 ID 到名称的映射，加载后只读
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassNameTable {
  names: BTreeMap<u32, String>,
}

impl ClassNameTable {
  pub fn new<I, S>(entries: I) -> Self
  where
    I: IntoIterator<Item = (u32, S)>,
    S: Into<String>,
  {
    Self {
      names: entries
        .into_iter()
        .map(|(id, name)| (id, name.into()))
        .collect(),
    }
  }

  /// 按顺序编号 0, 1, 2, ...
  pub fn from_names<I, S>(names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self::new((0u32..).zip(names))
  }

  /// COCO 数据集 80 类
  pub fn coco() -> Self {
    Self::from_names(COCO_NAMES)
  }

  /// 解析 `["person", ...]` 或 `{"0": "person", ...}`
  pub fn from_json_str(text: &str) -> Result<Self, LabelTableError> {
    let table = match serde_json::from_str::<Value>(text)? {
      Value::Array(items) => {
        let mut names = Vec::with_capacity(items.len());
        for (id, item) in items.into_iter().enumerate() {
          match item {
            Value::String(name) => names.push(name),
            _ => return Err(LabelTableError::InvalidName(id.to_string())),
          }
        }
        Self::from_names(names)
      }
      Value::Object(map) => {
        let mut names = BTreeMap::new();
        for (key, value) in map {
          let id = key
            .trim()
            .parse::<u32>()
            .map_err(|_| LabelTableError::InvalidId(key.clone()))?;
          match value {
            Value::String(name) => names.insert(id, name),
            _ => return Err(LabelTableError::InvalidName(key)),
          };
        }
        Self { names }
      }
      _ => return Err(LabelTableError::UnexpectedShape),
    };

    if table.is_empty() {
      return Err(LabelTableError::Empty);
    }
    Ok(table)
  }

  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LabelTableError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let table = Self::from_json_str(&text)?;
    info!("从 {} 加载 {} 个类别", path.display(), table.len());
    Ok(table)
  }

  pub fn name(&self, class_id: u32) -> Option<&str> {
    self.names.get(&class_id).map(String::as_str)
  }

  /// 按类别名反查类别 ID
  pub fn id_of(&self, name: &str) -> Option<u32> {
    self
      .names
      .iter()
      .find_map(|(id, n)| (n == name).then_some(*id))
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("未知类别 ID: {class_id}（类别表共 {table_len} 项）")]
pub struct LabelFormatError {
  pub class_id: u32,
  pub table_len: usize,
}

/// 根据类别表生成检测框标签
pub struct LabelFormatter<'a> {
  table: &'a ClassNameTable,
}

impl<'a> LabelFormatter<'a> {
  pub fn new(table: &'a ClassNameTable) -> Self {
    Self { table }
  }

  fn class_name(&self, class_id: u32) -> Result<&'a str, LabelFormatError> {
    self.table.name(class_id).ok_or(LabelFormatError {
      class_id,
      table_len: self.table.len(),
    })
  }

  /// `"<名称> <置信度两位小数>"` 或 `"<名称>"`
  pub fn format(
    &self,
    class_id: u32,
    confidence: f32,
    show_confidence: bool,
  ) -> Result<String, LabelFormatError> {
    let name = self.class_name(class_id)?;
    if show_confidence {
      Ok(format!("{} {:.2}", name, confidence))
    } else {
      Ok(name.to_string())
    }
  }

  /// 每个检测一个标签，与检测结果顺序一致
  pub fn labels(
    &self,
    detections: &DetectionSet,
    show_confidence: bool,
  ) -> Result<Vec<String>, LabelFormatError> {
    detections
      .iter()
      .map(|det| self.format(det.class_id, det.confidence, show_confidence))
      .collect()
  }

  /// 每个检测对应的类别名，与检测结果顺序一致
  pub fn class_names(&self, detections: &DetectionSet) -> Result<Vec<String>, LabelFormatError> {
    detections
      .iter()
      .map(|det| self.class_name(det.class_id).map(str::to_string))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Detection;

  fn cat_table() -> ClassNameTable {
    ClassNameTable::new([(0, "cat")])
  }

  #[test]
  fn test_format_with_confidence() {
    let table = cat_table();
    let formatter = LabelFormatter::new(&table);
    assert_eq!(formatter.format(0, 0.837, true).unwrap(), "cat 0.84");
    assert_eq!(formatter.format(0, 0.837, false).unwrap(), "cat");
  }

  #[test]
  fn test_unknown_class_is_error() {
    let table = cat_table();
    let formatter = LabelFormatter::new(&table);
    assert_eq!(
      formatter.format(3, 0.5, true),
      Err(LabelFormatError {
        class_id: 3,
        table_len: 1
      })
    );
  }

  #[test]
  fn test_labels_follow_detection_order() {
    let table = ClassNameTable::from_names(["cat", "dog"]);
    let formatter = LabelFormatter::new(&table);
    let detections = DetectionSet::from_items(vec![
      Detection {
        bbox: [0.0, 0.0, 1.0, 1.0],
        confidence: 0.5,
        class_id: 1,
      },
      Detection {
        bbox: [0.0, 0.0, 1.0, 1.0],
        confidence: 0.25,
        class_id: 0,
      },
    ]);

    assert_eq!(
      formatter.labels(&detections, true).unwrap(),
      vec!["dog 0.50", "cat 0.25"]
    );
    assert_eq!(formatter.class_names(&detections).unwrap(), vec!["dog", "cat"]);
  }

  #[test]
  fn test_coco_table() {
    let table = ClassNameTable::coco();
    assert_eq!(table.len(), 80);
    assert_eq!(table.name(0), Some("person"));
    assert_eq!(table.name(15), Some("cat"));
    assert_eq!(table.name(79), Some("toothbrush"));
    assert_eq!(table.name(80), None);
    assert_eq!(table.id_of("cat"), Some(15));
    assert_eq!(table.id_of("teapot"), None);
  }

  #[test]
  fn test_table_from_json() {
    let table = ClassNameTable::from_json_str(r#"["cat", "dog"]"#).unwrap();
    assert_eq!(table.name(1), Some("dog"));

    let table = ClassNameTable::from_json_str(r#"{"0": "cat", "7": "truck"}"#).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.name(7), Some("truck"));

    assert!(matches!(
      ClassNameTable::from_json_str(r#"{"x": "cat"}"#),
      Err(LabelTableError::InvalidId(_))
    ));
    assert!(matches!(
      ClassNameTable::from_json_str(r#"[1, 2]"#),
      Err(LabelTableError::InvalidName(_))
    ));
    assert!(matches!(
      ClassNameTable::from_json_str("[]"),
      Err(LabelTableError::Empty)
    ));
    assert!(matches!(
      ClassNameTable::from_json_str("42"),
      Err(LabelTableError::UnexpectedShape)
    ));
  }
}
