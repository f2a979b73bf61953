// 该文件是 Kanjian （看见） 项目的一部分。
// src/pipeline.rs - 预处理、推理、解码与绘制流水线
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

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  error::InferenceError,
  frame::preprocess,
  label::LabelCatalog,
  model::{Detection, Model, decode},
  output::Annotator,
};

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("推理失败: {0}")]
  Inference(#[from] InferenceError),
}

/// 一张图像的检测结果与绘制后的图像
#[derive(Debug, Clone)]
pub struct DetectResult {
  pub detections: Vec<Detection>,
  pub image: RgbImage,
}

impl DetectResult {
  pub fn count(&self) -> usize {
    self.detections.len()
  }

  pub fn is_empty(&self) -> bool {
    self.detections.is_empty()
  }
}

/// 同步流水线，每次调用处理一张图像。
///
/// 流水线本身不持有可变状态，模型实例负责保证推理调用互斥。
pub struct Pipeline<M> {
  model: M,
  labels: LabelCatalog,
  annotator: Annotator,
}

impl<M: Model> Pipeline<M> {
  pub fn new(model: M, labels: LabelCatalog, annotator: Annotator) -> Self {
    info!(
      "创建流水线: 输入 {:?}, 标签 {} 个",
      model.input_size(),
      labels.len()
    );
    Self {
      model,
      labels,
      annotator,
    }
  }

  pub fn model(&self) -> &M {
    &self.model
  }

  /// 只做检测，不绘制
  pub fn detections(
    &self,
    image: &RgbImage,
    score_threshold: f32,
  ) -> Result<Vec<Detection>, PipelineError> {
    let (width, height) = self.model.input_size();
    let input = preprocess(image, width, height);
    debug!("预处理完成: {}x{} -> {}x{}", image.width(), image.height(), width, height);

    let outputs = self.model.infer(&input)?;

    Ok(decode(
      &outputs,
      image.width(),
      image.height(),
      score_threshold,
      &self.labels,
    ))
  }

  /// 检测并绘制，同时返回检测结果
  pub fn detect(
    &self,
    image: &RgbImage,
    score_threshold: f32,
  ) -> Result<DetectResult, PipelineError> {
    let detections = self.detections(image, score_threshold)?;
    info!("检测到 {} 个物体", detections.len());
    for det in &detections {
      debug!(
        "  - {}: {:.2} at ({:.0}, {:.0}), {:.0}x{:.0}",
        det.label,
        det.score,
        det.bbox.left,
        det.bbox.top,
        det.bbox.width(),
        det.bbox.height()
      );
    }

    let image = self.annotator.annotate(image, &detections);
    Ok(DetectResult { detections, image })
  }

  /// 返回绘制后的图像
  pub fn process(
    &self,
    image: &RgbImage,
    score_threshold: f32,
  ) -> Result<RgbImage, PipelineError> {
    self.detect(image, score_threshold).map(|result| result.image)
  }
}
