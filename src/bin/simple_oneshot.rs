// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/simple_oneshot.rs - 单张图像推理
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;

use kanjian::{
  FromUrl, LabelCatalog, Pipeline,
  input::ImageFileInput,
  model::{DEFAULT_SCORE_THRESHOLD, SsdDetectorBuilder},
  output::{Annotator, SaveImageFileOutput},
  task::{OneShotTask, Task},
};
use tracing::info;

/// Kanjian 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型路径，例如 ssd:///models/detect.onnx?size=320x320&slots=0,1,2,3
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 标签文件路径，每行一个标签
  #[arg(long, value_name = "LABELS")]
  pub labels: PathBuf,
  /// 输入来源，例如 image:///photos/photo.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，例如 image:///photos/photo-detected.png?record
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_SCORE_THRESHOLD, value_name = "THRESHOLD")]
  pub threshold: f32,
  /// 标签字体文件，缺省时尝试系统字体
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("标签文件路径: {}", args.labels.display());
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);
  info!("置信度阈值: {}", args.threshold);

  let input_image = ImageFileInput::from_url(&args.input)?;
  let model = SsdDetectorBuilder::from_url(&args.model)?.build()?;
  let labels = LabelCatalog::from_path(&args.labels)?;
  let annotator = match &args.font {
    Some(path) => Annotator::from_font_path(path)?,
    None => Annotator::with_system_font(),
  };
  let output = SaveImageFileOutput::from_url(&args.output)?;

  let pipeline = Pipeline::new(model, labels, annotator);
  let result = OneShotTask::default()
    .with_score_threshold(args.threshold)
    .run_task(input_image, &pipeline, output)?;

  info!("任务结束，共 {} 个物体", result.count());

  Ok(())
}
