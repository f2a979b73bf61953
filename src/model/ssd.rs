// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/ssd.rs - SSD 检测模型（ONNX Runtime）
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

use std::{path::PathBuf, sync::Mutex};

use ort::{
  session::Session,
  tensor::TensorElementType,
  value::{Tensor, ValueType},
};
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  error::{InferenceError, InitializationError},
  frame::InputTensor,
  model::{Model, RawDetectionOutputs},
  path_from_url,
};

const SSD_NUM_INPUTS: usize = 1;
const SSD_NUM_OUTPUTS: usize = 4;
const SSD_BOX_VALUES: usize = 4;
pub const SSD_INPUT_SIZE: (u32, u32) = (320, 320);
pub const SSD_MAX_DETECTIONS: usize = 10;

/// 模型输出槽位到语义的映射，必须与模型导出时的顺序一致。
/// 顺序错误不会报错，只会得到错误的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSlots {
  pub scores: usize,
  pub boxes: usize,
  pub count: usize,
  pub classes: usize,
}

impl Default for OutputSlots {
  fn default() -> Self {
    Self {
      scores: 0,
      boxes: 1,
      count: 2,
      classes: 3,
    }
  }
}

impl OutputSlots {
  fn as_array(&self) -> [usize; 4] {
    [self.scores, self.boxes, self.count, self.classes]
  }

  fn roles(&self) -> [(OutputRole, usize); 4] {
    [
      (OutputRole::Scores, self.scores),
      (OutputRole::Boxes, self.boxes),
      (OutputRole::Count, self.count),
      (OutputRole::Classes, self.classes),
    ]
  }

  /// 检查槽位互不相同且都在模型输出范围内
  pub fn validate(&self, num_outputs: usize) -> Result<(), InitializationError> {
    let slots = self.as_array();
    if let Some(slot) = slots.iter().find(|&&s| s >= num_outputs) {
      return Err(InitializationError::invalid(format!(
        "输出槽位 {} 超出模型输出数量 {}",
        slot, num_outputs
      )));
    }
    for (i, a) in slots.iter().enumerate() {
      if slots[i + 1..].contains(a) {
        return Err(InitializationError::invalid(format!(
          "输出槽位 {} 被重复使用: {:?}",
          a, self
        )));
      }
    }
    Ok(())
  }

  /// 解析 `scores,boxes,count,classes` 顺序的槽位列表，例如 `0,1,2,3`
  fn parse(value: &str) -> Result<Self, InitializationError> {
    let parsed = value
      .split(',')
      .map(|s| s.trim().parse::<usize>())
      .collect::<Result<Vec<_>, _>>()
      .map_err(|e| InitializationError::InvalidUrl(format!("slots={}: {}", value, e)))?;
    match parsed.as_slice() {
      &[scores, boxes, count, classes] => Ok(Self {
        scores,
        boxes,
        count,
        classes,
      }),
      _ => Err(InitializationError::InvalidUrl(format!(
        "slots 需要 4 个索引, 实际为 {}",
        value
      ))),
    }
  }
}

pub struct SsdDetector {
  session: Mutex<Session>,
  input_size: (u32, u32),
  max_detections: usize,
  slots: OutputSlots,
  // 按模型输出顺序排列
  output_names: Vec<String>,
}

pub struct SsdDetectorBuilder {
  model_path: PathBuf,
  input_size: (u32, u32),
  max_detections: usize,
  slots: OutputSlots,
}

impl FromUrlWithScheme for SsdDetectorBuilder {
  const SCHEME: &'static str = "ssd";
}

impl FromUrl for SsdDetectorBuilder {
  type Error = InitializationError;

  /// `ssd:///path/model.onnx?size=320x320&detections=10&slots=0,1,2,3`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InitializationError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }

    let mut builder = SsdDetectorBuilder::new(path_from_url(url));
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "size" => builder.input_size = parse_size(&v)?,
        "detections" => {
          builder.max_detections = v
            .parse()
            .map_err(|e| InitializationError::InvalidUrl(format!("detections={}: {}", v, e)))?
        }
        "slots" => builder.slots = OutputSlots::parse(&v)?,
        other => debug!("忽略未知的模型参数: {}", other),
      }
    }
    Ok(builder)
  }
}

fn parse_size(value: &str) -> Result<(u32, u32), InitializationError> {
  let invalid = || InitializationError::InvalidUrl(format!("size={}, 期望格式 WxH", value));
  let (w, h) = value.split_once('x').ok_or_else(invalid)?;
  let w: u32 = w.trim().parse().map_err(|_| invalid())?;
  let h: u32 = h.trim().parse().map_err(|_| invalid())?;
  if w == 0 || h == 0 {
    return Err(invalid());
  }
  Ok((w, h))
}

/// 输出槽位承载的语义
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputRole {
  Scores,
  Boxes,
  Count,
  Classes,
}

impl OutputRole {
  fn name(self) -> &'static str {
    match self {
      OutputRole::Scores => "scores",
      OutputRole::Boxes => "boxes",
      OutputRole::Count => "count",
      OutputRole::Classes => "classes",
    }
  }

  /// 模型声明的维度是否符合该语义，负数表示动态维度
  fn accepts(self, dims: &[i64], max_detections: usize) -> bool {
    match self {
      OutputRole::Count => dims.iter().all(|&d| dim_is(d, 1)),
      OutputRole::Scores | OutputRole::Classes => match dims.split_last() {
        Some((&n, batch)) => dim_at_least(n, max_detections) && batch.iter().all(|&d| dim_is(d, 1)),
        None => false,
      },
      OutputRole::Boxes => match dims {
        [batch @ .., n, values] => {
          dim_is(*values, SSD_BOX_VALUES as u64)
            && dim_at_least(*n, max_detections)
            && batch.iter().all(|&d| dim_is(d, 1))
        }
        _ => false,
      },
    }
  }
}

fn dim_is(dim: i64, expected: u64) -> bool {
  dim < 0 || dim as u64 == expected
}

fn dim_at_least(dim: i64, expected: usize) -> bool {
  dim < 0 || dim as u64 >= expected as u64
}

/// 输入须为 1xHxWx3
fn input_dims_match(dims: &[i64], (width, height): (u32, u32)) -> bool {
  match dims {
    &[n, h, w, c] => {
      dim_is(n, 1) && dim_is(h, height as u64) && dim_is(w, width as u64) && dim_is(c, 3)
    }
    _ => false,
  }
}

/// 取出 f32 张量的维度
fn f32_tensor_dims<'a>(
  what: &str,
  value_type: &'a ValueType,
) -> Result<&'a [i64], InitializationError> {
  match (value_type.tensor_type(), value_type.tensor_shape()) {
    (Some(TensorElementType::Float32), Some(shape)) => Ok(&**shape),
    _ => {
      error!("{} 不是 f32 张量: {:?}", what, value_type);
      Err(InitializationError::invalid(format!(
        "{} 不是 f32 张量: {:?}",
        what, value_type
      )))
    }
  }
}

impl SsdDetectorBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
      input_size: SSD_INPUT_SIZE,
      max_detections: SSD_MAX_DETECTIONS,
      slots: OutputSlots::default(),
    }
  }

  pub fn input_size(mut self, width: u32, height: u32) -> Self {
    self.input_size = (width, height);
    self
  }

  pub fn max_detections(mut self, max_detections: usize) -> Self {
    self.max_detections = max_detections;
    self
  }

  pub fn slots(mut self, slots: OutputSlots) -> Self {
    self.slots = slots;
    self
  }

  pub fn build(self) -> Result<SsdDetector, InitializationError> {
    info!("加载模型文件: {}", self.model_path.display());
    let model_data = std::fs::read(&self.model_path).map_err(InitializationError::ModelLoad)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 ONNX Runtime 推理会话");
    let session = Session::builder()?.commit_from_memory(&model_data)?;

    let num_inputs = session.inputs.len();
    let num_outputs = session.outputs.len();
    debug!("模型输入数量: {}", num_inputs);
    debug!("模型输出数量: {}", num_outputs);

    if num_inputs != SSD_NUM_INPUTS {
      error!(
        "预期模型输入数量为 {}, 实际为 {}",
        SSD_NUM_INPUTS, num_inputs
      );
      return Err(InitializationError::invalid(format!(
        "预期模型输入数量为 {}, 实际为 {}",
        SSD_NUM_INPUTS, num_inputs
      )));
    }

    if num_outputs != SSD_NUM_OUTPUTS {
      error!(
        "预期模型输出数量为 {}, 实际为 {}",
        SSD_NUM_OUTPUTS, num_outputs
      );
      return Err(InitializationError::invalid(format!(
        "预期模型输出数量为 {}, 实际为 {}",
        SSD_NUM_OUTPUTS, num_outputs
      )));
    }

    if self.max_detections == 0 {
      return Err(InitializationError::invalid("检测槽数不能为 0"));
    }

    self.slots.validate(num_outputs)?;

    let input = &session.inputs[0];
    let input_dims = f32_tensor_dims(&input.name, &input.input_type)?;
    if !input_dims_match(input_dims, self.input_size) {
      let (w, h) = self.input_size;
      error!("模型输入 {} 形状为 {:?}, 期望 [1, {}, {}, 3]", input.name, input_dims, h, w);
      return Err(InitializationError::invalid(format!(
        "模型输入 {} 形状为 {:?}, 期望 [1, {}, {}, 3]",
        input.name, input_dims, h, w
      )));
    }

    for (role, slot) in self.slots.roles() {
      let output = &session.outputs[slot];
      let dims = f32_tensor_dims(&output.name, &output.output_type)?;
      if !role.accepts(dims, self.max_detections) {
        error!(
          "输出槽位 {} ({}) 形状 {:?} 不符合 {}",
          slot,
          output.name,
          dims,
          role.name()
        );
        return Err(InitializationError::invalid(format!(
          "输出槽位 {} ({}) 形状 {:?} 不符合 {}",
          slot,
          output.name,
          dims,
          role.name()
        )));
      }
      info!("输出 {}: {} {:?}", role.name(), output.name, dims);
    }

    let output_names = session.outputs.iter().map(|o| o.name.clone()).collect();
    info!("模型加载完成");

    Ok(SsdDetector {
      session: Mutex::new(session),
      input_size: self.input_size,
      max_detections: self.max_detections,
      slots: self.slots,
      output_names,
    })
  }
}

/// 检查输出长度并截取前 `expected` 个值
fn take_at_least(
  slot: &'static str,
  data: &[f32],
  expected: usize,
) -> Result<Vec<f32>, InferenceError> {
  if data.len() < expected {
    error!("输出 {} 大小不足: 期望 {}, 实际 {}", slot, expected, data.len());
    return Err(InferenceError::OutputShape {
      slot,
      expected,
      actual: data.len(),
    });
  }
  Ok(data[..expected].to_vec())
}

/// 按槽位映射把模型输出（按模型输出顺序）组装为原始检测结果
fn assemble_outputs(
  tensors: &[Vec<f32>],
  slots: OutputSlots,
  max_detections: usize,
) -> Result<RawDetectionOutputs, InferenceError> {
  let n = max_detections;
  let tensor = |role: OutputRole, slot: usize| {
    tensors
      .get(slot)
      .map(Vec::as_slice)
      .ok_or_else(|| InferenceError::MissingOutput(format!("{} (#{})", role.name(), slot)))
  };

  let scores = take_at_least("scores", tensor(OutputRole::Scores, slots.scores)?, n)?;
  let boxes = take_at_least("boxes", tensor(OutputRole::Boxes, slots.boxes)?, n * SSD_BOX_VALUES)?;
  let count = take_at_least("count", tensor(OutputRole::Count, slots.count)?, 1)?;
  let class_indices = take_at_least("classes", tensor(OutputRole::Classes, slots.classes)?, n)?;

  debug!("检测框: {:?}", boxes);
  debug!("检测类别: {:?}", class_indices);
  debug!("检测分数: {:?}", scores);
  debug!("检测数量: {:?}", count);

  Ok(RawDetectionOutputs {
    boxes: boxes
      .chunks_exact(SSD_BOX_VALUES)
      .map(|b| [b[0], b[1], b[2], b[3]])
      .collect(),
    class_indices,
    scores,
    count: count[0],
  })
}

impl Model for SsdDetector {
  fn infer(&self, input: &InputTensor) -> Result<RawDetectionOutputs, InferenceError> {
    let (w, h) = self.input_size;
    let expected = (w as usize) * (h as usize) * input.channels();
    if input.len() != expected || (input.width(), input.height()) != self.input_size {
      return Err(InferenceError::InputShape {
        expected,
        actual: input.len(),
      });
    }

    debug!("设置模型输入");
    let tensor = Tensor::from_array((input.shape(), input.as_slice().to_vec()))?;

    let mut session = self.session.lock().map_err(|_| InferenceError::LockPoisoned)?;

    debug!("执行模型推理");
    let outputs = session.run(ort::inputs![tensor])?;

    debug!("获取模型输出");
    let tensors = self
      .output_names
      .iter()
      .map(|name| -> Result<Vec<f32>, InferenceError> {
        let value = outputs
          .get(name.as_str())
          .ok_or_else(|| InferenceError::MissingOutput(name.clone()))?;
        let (_, data) = value.try_extract_tensor::<f32>()?;
        Ok(data.to_vec())
      })
      .collect::<Result<Vec<_>, _>>()?;

    assemble_outputs(&tensors, self.slots, self.max_detections)
  }

  fn input_size(&self) -> (u32, u32) {
    self.input_size
  }
}
