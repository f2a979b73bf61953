// 该文件是 Kanjian （看见） 项目的一部分。
// src/model.rs - 模型
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

use serde::{Deserialize, Serialize};

use crate::{error::InferenceError, frame::InputTensor};

/// 单次前向推理。实现者自行保证同一实例上的调用互斥。
pub trait Model {
  fn infer(&self, input: &InputTensor) -> Result<RawDetectionOutputs, InferenceError>;

  /// 模型输入分辨率 (width, height)
  fn input_size(&self) -> (u32, u32);
}

impl<M: Model + ?Sized> Model for Box<M> {
  fn infer(&self, input: &InputTensor) -> Result<RawDetectionOutputs, InferenceError> {
    (**self).infer(input)
  }

  fn input_size(&self) -> (u32, u32) {
    (**self).input_size()
  }
}

/// 一次推理的原始输出，每个数组长度为模型的检测槽数 N
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDetectionOutputs {
  pub boxes: Vec<[f32; 4]>, // [y_min, x_min, y_max, x_max]，归一化坐标
  pub class_indices: Vec<f32>,
  pub scores: Vec<f32>,
  pub count: f32,
}

impl RawDetectionOutputs {
  /// 检测槽数
  pub fn slots(&self) -> usize {
    self
      .boxes
      .len()
      .min(self.class_indices.len())
      .min(self.scores.len())
  }

  /// 有效检测数，不会超过槽数；负数或 NaN 视为 0
  pub fn valid_count(&self) -> usize {
    if !(self.count > 0.0) {
      return 0;
    }
    (self.count as usize).min(self.slots())
  }
}

/// 原图像素坐标系下的边界框
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
  pub left: f32,
  pub top: f32,
  pub right: f32,
  pub bottom: f32,
}

impl BoundingBox {
  pub fn width(&self) -> f32 {
    self.right - self.left
  }

  pub fn height(&self) -> f32 {
    self.bottom - self.top
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  pub label: String,
  pub class_index: i64,
  pub score: f32,
  pub bbox: BoundingBox,
}

pub mod decode;
pub use self::decode::{DEFAULT_SCORE_THRESHOLD, decode};

mod ssd;
pub use self::ssd::{
  OutputSlots, SSD_INPUT_SIZE, SSD_MAX_DETECTIONS, SsdDetector, SsdDetectorBuilder,
};
