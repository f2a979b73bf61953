// 该文件是 Kanjian （看见） 项目的一部分。
// src/frame.rs - NHWC 浮点输入张量
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

use std::borrow::Cow;

use image::{RgbImage, imageops::FilterType};

pub const RGB_CHANNELS: usize = 3;

// (v - 128) / 128
const PIXEL_MEAN: f32 = 128.0;
const PIXEL_STD: f32 = 128.0;

/// 模型输入：按行优先、像素内 R,G,B 交错排列的 f32 缓冲区
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
  width: u32,
  height: u32,
  data: Box<[f32]>,
}

impl InputTensor {
  /// 将图像缩放到 `width × height` 并归一化
  pub fn from_image(image: &RgbImage, width: u32, height: u32) -> Self {
    let resized = if image.dimensions() == (width, height) {
      Cow::Borrowed(image)
    } else {
      Cow::Owned(image::imageops::resize(
        image,
        width,
        height,
        FilterType::Triangle,
      ))
    };

    let mut data = Vec::with_capacity(RGB_CHANNELS * width as usize * height as usize);
    // pixels() 按行优先遍历
    for pixel in resized.pixels() {
      for &value in pixel.0.iter() {
        data.push(normalize(value));
      }
    }

    Self {
      width,
      height,
      data: data.into_boxed_slice(),
    }
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// NHWC 形状，批大小固定为 1
  pub fn shape(&self) -> [usize; 4] {
    [1, self.height as usize, self.width as usize, RGB_CHANNELS]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  /// 按本机字节序序列化，供直接接受字节缓冲区的推理后端使用
  pub fn to_ne_bytes(&self) -> Vec<u8> {
    self.data.iter().flat_map(|v| v.to_ne_bytes()).collect()
  }
}

fn normalize(value: u8) -> f32 {
  (value as f32 - PIXEL_MEAN) / PIXEL_STD
}

/// 预处理：缩放（不保持宽高比）并序列化为模型输入
pub fn preprocess(image: &RgbImage, target_width: u32, target_height: u32) -> InputTensor {
  InputTensor::from_image(image, target_width, target_height)
}
