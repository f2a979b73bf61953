// 该文件是 Kanjian （看见） 项目的一部分。
// src/label.rs - 类别标签表
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

use tracing::{debug, info};

use crate::error::InitializationError;

/// 越界类别索引对应的标签
pub const UNKNOWN_LABEL: &str = "Unknown";

/// 有序类别名称表，第一行对应索引 0
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelCatalog {
  labels: Box<[String]>,
}

impl LabelCatalog {
  /// 从标签文件加载，每行一个标签，行序即索引
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, InitializationError> {
    let path = path.as_ref();
    info!("加载标签文件: {}", path.display());
    let text = std::fs::read_to_string(path).map_err(|source| InitializationError::LabelLoad {
      path: path.display().to_string(),
      source,
    })?;
    let catalog = Self::parse(&text);
    debug!("标签数量: {}", catalog.len());
    Ok(catalog)
  }

  /// 按行解析标签文本。`str::lines` 会去掉行尾的 `\r`，
  /// 文件末尾的换行不会产生额外的空标签。
  pub fn parse(text: &str) -> Self {
    Self {
      labels: text.lines().map(str::to_string).collect(),
    }
  }

  pub fn label_for(&self, class_index: i64) -> &str {
    usize::try_from(class_index)
      .ok()
      .and_then(|idx| self.labels.get(idx))
      .map(String::as_str)
      .unwrap_or(UNKNOWN_LABEL)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.labels.iter().map(String::as_str)
  }
}

impl<S: Into<String>> FromIterator<S> for LabelCatalog {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self {
      labels: iter.into_iter().map(Into::into).collect(),
    }
  }
}
