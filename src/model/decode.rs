// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/decode.rs - 检测输出解码
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

use tracing::debug;

use crate::{
  label::LabelCatalog,
  model::{BoundingBox, Detection, RawDetectionOutputs},
};

pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.9;

/// 将原始输出解码为检测结果。
///
/// 按模型输出顺序遍历前 `count` 个槽位，不重新排序；分数低于阈值的跳过，
/// 等于阈值的保留。归一化坐标按原图尺寸换算为像素坐标，不裁剪到图像范围内，
/// 因此边界框可能略微超出图像。
pub fn decode(
  outputs: &RawDetectionOutputs,
  original_width: u32,
  original_height: u32,
  score_threshold: f32,
  labels: &LabelCatalog,
) -> Vec<Detection> {
  let (w, h) = (original_width as f32, original_height as f32);
  let count = outputs.valid_count();
  let mut items = Vec::with_capacity(count);

  for i in 0..count {
    let score = outputs.scores[i];
    // NaN 分数同样被丢弃
    if !(score >= score_threshold) {
      continue;
    }

    let [y_min, x_min, y_max, x_max] = outputs.boxes[i];
    let class_index = outputs.class_indices[i].round() as i64;

    items.push(Detection {
      label: labels.label_for(class_index).to_string(),
      class_index,
      score,
      bbox: BoundingBox {
        left: x_min * w,
        top: y_min * h,
        right: x_max * w,
        bottom: y_max * h,
      },
    });
  }

  debug!(
    "解码完成: 有效槽位 {}, 阈值 {:.2}, 保留 {} 个",
    count,
    score_threshold,
    items.len()
  );
  items
}
