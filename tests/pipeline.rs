// 该文件是 Kanjian （看见） 项目的一部分。
// tests/pipeline.rs - 流水线端到端测试
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

use std::cell::RefCell;

use image::{Rgb, RgbImage};
use kanjian::{
  InferenceError, LabelCatalog, Pipeline, PipelineError,
  frame::InputTensor,
  label::UNKNOWN_LABEL,
  model::{DEFAULT_SCORE_THRESHOLD, Model, RawDetectionOutputs},
  output::{Annotator, draw::PALETTE},
};
#[cfg(all(feature = "read_image_file", feature = "save_image_file"))]
use kanjian::{
  input::ImageFileInput,
  output::SaveImageFileOutput,
  task::{OneShotTask, Task},
};

/// 返回固定输出的模型，并记录收到的输入尺寸
struct FixedModel {
  outputs: RawDetectionOutputs,
  seen: RefCell<Vec<(u32, u32, usize)>>,
}

impl FixedModel {
  fn new(outputs: RawDetectionOutputs) -> Self {
    Self {
      outputs,
      seen: RefCell::new(Vec::new()),
    }
  }
}

impl Model for FixedModel {
  fn infer(&self, input: &InputTensor) -> Result<RawDetectionOutputs, InferenceError> {
    self
      .seen
      .borrow_mut()
      .push((input.width(), input.height(), input.len()));
    Ok(self.outputs.clone())
  }

  fn input_size(&self) -> (u32, u32) {
    (320, 320)
  }
}

struct FailingModel;

impl Model for FailingModel {
  fn infer(&self, _input: &InputTensor) -> Result<RawDetectionOutputs, InferenceError> {
    Err(InferenceError::MissingOutput("detection_scores".to_string()))
  }

  fn input_size(&self) -> (u32, u32) {
    (320, 320)
  }
}

fn one_detection(score: f32, class_index: f32, bbox: [f32; 4]) -> RawDetectionOutputs {
  let mut boxes = vec![[0.0; 4]; 10];
  let mut class_indices = vec![0.0; 10];
  let mut scores = vec![0.0; 10];
  boxes[0] = bbox;
  class_indices[0] = class_index;
  scores[0] = score;
  RawDetectionOutputs {
    boxes,
    class_indices,
    scores,
    count: 1.0,
  }
}

fn fifty_labels() -> LabelCatalog {
  (0..50).map(|i| format!("label-{i}")).collect()
}

fn photo() -> RgbImage {
  RgbImage::from_fn(640, 480, |x, y| Rgb([(x % 200) as u8, (y % 200) as u8, 90]))
}

#[test]
fn scenario_a_decodes_pixel_rectangle() {
  let model = FixedModel::new(one_detection(0.95, 2.0, [0.1, 0.2, 0.5, 0.6]));
  let pipeline = Pipeline::new(model, fifty_labels(), Annotator::default());

  let result = pipeline.detect(&photo(), DEFAULT_SCORE_THRESHOLD).unwrap();
  assert_eq!(result.count(), 1);

  let det = &result.detections[0];
  assert_eq!(det.label, "label-2");
  assert_eq!(det.score, 0.95);
  assert!((det.bbox.left - 128.0).abs() < 1e-3);
  assert!((det.bbox.top - 48.0).abs() < 1e-3);
  assert!((det.bbox.right - 384.0).abs() < 1e-3);
  assert!((det.bbox.bottom - 240.0).abs() < 1e-3);

  // 左边框使用类别 2 的颜色
  assert_eq!(*result.image.get_pixel(128, 150), PALETTE[2]);
  assert_eq!(result.image.dimensions(), (640, 480));

  // 模型收到的是 320x320x3 的张量
  assert_eq!(
    pipeline.model().seen.borrow().as_slice(),
    &[(320, 320, 320 * 320 * 3)]
  );
}

#[test]
fn scenario_b_below_threshold_leaves_image_untouched() {
  let model = FixedModel::new(one_detection(0.5, 2.0, [0.1, 0.2, 0.5, 0.6]));
  let pipeline = Pipeline::new(model, fifty_labels(), Annotator::default());
  let image = photo();

  let result = pipeline.detect(&image, DEFAULT_SCORE_THRESHOLD).unwrap();
  assert!(result.is_empty());
  assert_eq!(result.image, image);

  let processed = pipeline.process(&image, DEFAULT_SCORE_THRESHOLD).unwrap();
  assert_eq!(processed, image);
}

#[test]
fn scenario_c_unknown_class_index() {
  let model = FixedModel::new(one_detection(0.95, 999.0, [0.1, 0.2, 0.5, 0.6]));
  let pipeline = Pipeline::new(model, fifty_labels(), Annotator::default());

  let detections = pipeline.detections(&photo(), DEFAULT_SCORE_THRESHOLD).unwrap();
  assert_eq!(detections.len(), 1);
  assert_eq!(detections[0].label, UNKNOWN_LABEL);
}

#[test]
fn threshold_is_a_parameter() {
  let model = FixedModel::new(one_detection(0.5, 1.0, [0.1, 0.2, 0.5, 0.6]));
  let pipeline = Pipeline::new(model, fifty_labels(), Annotator::default());

  assert!(pipeline.detections(&photo(), 0.9).unwrap().is_empty());
  assert_eq!(pipeline.detections(&photo(), 0.5).unwrap().len(), 1);
}

#[test]
fn zero_count_means_no_detections() {
  let mut outputs = one_detection(0.99, 1.0, [0.1, 0.2, 0.5, 0.6]);
  outputs.scores = vec![0.99; 10];
  outputs.count = 0.0;
  let pipeline = Pipeline::new(FixedModel::new(outputs), fifty_labels(), Annotator::default());

  assert!(pipeline.detections(&photo(), 0.0).unwrap().is_empty());
}

#[test]
fn inference_failure_yields_no_result() {
  let pipeline = Pipeline::new(FailingModel, fifty_labels(), Annotator::default());
  let err = pipeline.process(&photo(), DEFAULT_SCORE_THRESHOLD).unwrap_err();
  assert!(matches!(
    err,
    PipelineError::Inference(InferenceError::MissingOutput(_))
  ));
}

#[test]
fn boxed_model_works_through_pipeline() {
  let model: Box<dyn Model> = Box::new(FixedModel::new(one_detection(
    0.92,
    0.0,
    [0.0, 0.0, 0.5, 0.5],
  )));
  let pipeline = Pipeline::new(model, fifty_labels(), Annotator::default());
  assert_eq!(pipeline.detections(&photo(), 0.9).unwrap().len(), 1);
}

#[cfg(all(feature = "read_image_file", feature = "save_image_file"))]
#[test]
fn one_shot_task_reads_detects_and_saves() {
  let dir = tempfile::tempdir().unwrap();
  let out_path = dir.path().join("annotated.png");

  let model = FixedModel::new(one_detection(0.95, 3.0, [0.1, 0.2, 0.5, 0.6]));
  let pipeline = Pipeline::new(model, fifty_labels(), Annotator::default());
  let input = ImageFileInput::from(photo());
  let output = SaveImageFileOutput::new(&out_path).with_record(true);
  let record_path = output.record_path();

  let result = OneShotTask::default()
    .run_task(input, &pipeline, output)
    .unwrap();
  assert_eq!(result.count(), 1);

  let saved = image::open(&out_path).unwrap().into_rgb8();
  assert_eq!(saved, result.image);

  let record: serde_json::Value =
    serde_json::from_str(&std::fs::read_to_string(record_path).unwrap()).unwrap();
  assert_eq!(record["count"], 1);
  assert_eq!(record["detections"][0]["label"], "label-3");
}

#[cfg(all(feature = "read_image_file", feature = "save_image_file"))]
#[test]
fn one_shot_task_without_input_fails() {
  let pipeline = Pipeline::new(
    FixedModel::new(RawDetectionOutputs::default()),
    fifty_labels(),
    Annotator::default(),
  );
  let dir = tempfile::tempdir().unwrap();
  let output = SaveImageFileOutput::new(dir.path().join("never.png"));

  let result = OneShotTask::default().run_task(std::iter::empty::<RgbImage>(), &pipeline, output);
  assert!(result.is_err());
}
