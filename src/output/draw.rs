// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use tracing::{debug, info, warn};

use crate::{error::InitializationError, model::Detection};

// 绘制常量
const STROKE_WIDTH: i32 = 8;
const LABEL_FONT_SIZE: f32 = 48.0;
const LABEL_OFFSET: f32 = 40.0; // 标签基线位于框上沿之上
const SCORE_OFFSET: f32 = 80.0; // 分数基线位于框上沿之上

/// 固定调色板，颜色 = PALETTE[类别索引 mod 10]
pub const PALETTE: [Rgb<u8>; 10] = [
  Rgb([255, 0, 0]),     // 红
  Rgb([0, 255, 0]),     // 绿
  Rgb([0, 0, 255]),     // 蓝
  Rgb([255, 255, 0]),   // 黄
  Rgb([0, 255, 255]),   // 青
  Rgb([255, 0, 255]),   // 品红
  Rgb([0, 0, 0]),       // 黑
  Rgb([136, 136, 136]), // 灰
  Rgb([68, 68, 68]),    // 深灰
  Rgb([204, 204, 204]), // 浅灰
];

// 常见系统字体位置
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
  "/System/Library/Fonts/Supplemental/Arial.ttf",
  "C:\\Windows\\Fonts\\arial.ttf",
];

pub fn color_for(class_index: i64) -> Rgb<u8> {
  PALETTE[class_index.rem_euclid(PALETTE.len() as i64) as usize]
}

/// 在原图副本上绘制检测框、标签和分数
#[derive(Clone)]
pub struct Annotator {
  font: Option<FontArc>,
  font_size: f32,
  stroke_width: i32,
}

impl Default for Annotator {
  fn default() -> Self {
    Self::new(None)
  }
}

impl Annotator {
  pub fn new(font: Option<FontArc>) -> Self {
    if font.is_none() {
      warn!("未提供字体，仅绘制检测框");
    }
    Self {
      font,
      font_size: LABEL_FONT_SIZE,
      stroke_width: STROKE_WIDTH,
    }
  }

  pub fn from_font_path(path: impl AsRef<Path>) -> Result<Self, InitializationError> {
    let path = path.as_ref();
    let data = std::fs::read(path)
      .map_err(|e| InitializationError::FontLoad(format!("{}: {}", path.display(), e)))?;
    let font = FontArc::try_from_vec(data)
      .map_err(|e| InitializationError::FontLoad(format!("{}: {}", path.display(), e)))?;
    info!("加载字体: {}", path.display());
    Ok(Self::new(Some(font)))
  }

  /// 依次尝试常见的系统字体，都不可用时不绘制文字
  pub fn with_system_font() -> Self {
    for candidate in SYSTEM_FONT_CANDIDATES {
      match Self::from_font_path(candidate) {
        Ok(annotator) => return annotator,
        Err(e) => debug!("跳过字体 {}", e),
      }
    }
    Self::new(None)
  }

  /// 返回绘制了检测结果的新图像，输入图像保持不变
  pub fn annotate(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
    let mut canvas = image.clone();
    for detection in detections {
      self.draw_detection(&mut canvas, detection);
    }
    canvas
  }

  fn draw_detection(&self, image: &mut RgbImage, detection: &Detection) {
    let color = color_for(detection.class_index);
    let (w, h) = (image.width() as f32, image.height() as f32);

    // 边框几何只需保留两个描边宽度的余量，
    // 裁剪后可见像素不变，且避免沿超长线段逐点迭代
    let margin = (2 * self.stroke_width) as f32;
    let clip_x = |v: f32| v.clamp(-margin, w + margin).round() as i32;
    let clip_y = |v: f32| v.clamp(-margin, h + margin).round() as i32;

    let bbox = &detection.bbox;
    let left = clip_x(bbox.left);
    let top = clip_y(bbox.top);
    let right = clip_x(bbox.right);
    let bottom = clip_y(bbox.bottom);

    // 描边以边框线为中心向内外各扩展一半
    let half = self.stroke_width / 2;
    for offset in -half..(self.stroke_width - half) {
      let width = right - left - 2 * offset;
      let height = bottom - top - 2 * offset;
      if width <= 0 || height <= 0 {
        continue;
      }
      let rect = Rect::at(left + offset, top + offset).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    // 文字位置取自未裁剪的边框
    if let Some(font) = &self.font {
      let scale = PxScale::from(self.font_size);
      let ascent = font.as_scaled(scale).ascent();
      // draw_text_mut 的 y 为文字顶部，换算为基线位置
      let text_y = |offset: f32| bbox.top - offset - ascent;

      let label_at = (bbox.left, text_y(LABEL_OFFSET));
      let score_at = (bbox.left, text_y(SCORE_OFFSET));
      self.draw_text(image, color, font, scale, label_at, &detection.label);
      self.draw_text(image, color, font, scale, score_at, &score_text(detection.score));
    }
  }

  fn draw_text(
    &self,
    image: &mut RgbImage,
    color: Rgb<u8>,
    font: &FontArc,
    scale: PxScale,
    (x, y): (f32, f32),
    text: &str,
  ) {
    let (text_w, text_h) = text_size(scale, font, text);
    // 字形可能略超出排版框，多留一个字号的余量
    let slack = self.font_size;
    let visible = x + text_w as f32 + slack > 0.0
      && x - slack < image.width() as f32
      && y + text_h as f32 + slack > 0.0
      && y - slack < image.height() as f32;
    if !visible {
      return;
    }
    draw_text_mut(image, color, x.round() as i32, y.round() as i32, scale, font, text);
  }
}

fn score_text(score: f32) -> String {
  format!("{:.2}", score)
}
