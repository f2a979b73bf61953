// 该文件是 Kanjian （看见） 项目的一部分。
// src/error.rs - 初始化与推理错误定义
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

/// 组件构造阶段的错误。出现该错误时组件不会被创建。
#[derive(Error, Debug)]
pub enum InitializationError {
  #[error("模型加载错误: {0}")]
  ModelLoad(std::io::Error),
  #[error("推理运行时错误: {0}")]
  ModelRuntime(#[from] ort::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("标签文件加载错误: {path}: {source}")]
  LabelLoad {
    path: String,
    source: std::io::Error,
  },
  #[error("字体加载错误: {0}")]
  FontLoad(String),
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch {
    expected: &'static str,
    actual: String,
  },
  #[error("URI 参数无效: {0}")]
  InvalidUrl(String),
}

impl InitializationError {
  pub fn invalid(msg: impl Into<String>) -> Self {
    InitializationError::ModelInvalid(msg.into())
  }
}

/// 单次推理过程中的错误，不携带任何部分结果。
#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("推理运行时错误: {0}")]
  Runtime(#[from] ort::Error),
  #[error("缺少模型输出: {0}")]
  MissingOutput(String),
  #[error("输出 {slot} 大小不匹配: 期望至少 {expected}, 实际 {actual}")]
  OutputShape {
    slot: &'static str,
    expected: usize,
    actual: usize,
  },
  #[error("输入张量大小不匹配: 期望 {expected}, 实际 {actual}")]
  InputShape { expected: usize, actual: usize },
  #[error("推理会话锁已损坏")]
  LockPoisoned,
}
