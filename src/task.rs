// 该文件是 Kanjian （看见） 项目的一部分。
// src/task.rs - 任务定义
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
use tracing::info;

use crate::{
  model::{DEFAULT_SCORE_THRESHOLD, Model},
  output::Render,
  pipeline::{DetectResult, Pipeline},
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(
    self,
    input: I,
    pipeline: &Pipeline<M>,
    output: O,
  ) -> Result<Self::Output, Self::Error>;
}

/// 取输入的第一张图像，推理、绘制并输出一次
#[derive(Debug, Clone, Copy)]
pub struct OneShotTask {
  score_threshold: f32,
}

impl Default for OneShotTask {
  fn default() -> Self {
    Self {
      score_threshold: DEFAULT_SCORE_THRESHOLD,
    }
  }
}

impl OneShotTask {
  pub fn with_score_threshold(mut self, score_threshold: f32) -> Self {
    self.score_threshold = score_threshold;
    self
  }
}

impl<RE, I, M, O> Task<I, M, O> for OneShotTask
where
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbImage>,
  M: Model,
  O: Render<DetectResult, Error = RE>,
{
  type Output = DetectResult;
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    pipeline: &Pipeline<M>,
    output: O,
  ) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let image = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像获取成功，开始推理...");
    let now = std::time::Instant::now();
    let result = pipeline.detect(&image, self.score_threshold)?;
    let elapsed = now.elapsed();
    info!("推理完成，耗时: {:.2?}", elapsed);
    output.render_result(&result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());
    info!("检测到 {} 个物体", result.count());

    Ok(result)
  }
}
