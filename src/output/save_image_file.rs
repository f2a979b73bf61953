// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::Detection,
  output::Render,
  path_from_url,
  pipeline::DetectResult,
};

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("记录序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 检测记录，与图像同名、扩展名为 json
#[derive(Serialize)]
struct DetectionRecord<'a> {
  created_at: String,
  count: usize,
  detections: &'a [Detection],
}

pub struct SaveImageFileOutput {
  path: PathBuf,
  record: bool,
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  /// `image:///path/out.png`，附加 `?record` 时同时写出检测记录
  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let record = uri.query_pairs().any(|(k, _)| k == "record");

    Ok(SaveImageFileOutput {
      path: path_from_url(uri),
      record,
    })
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      record: false,
    }
  }

  pub fn with_record(mut self, record: bool) -> Self {
    self.record = record;
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn record_path(&self) -> PathBuf {
    self.path.with_extension("json")
  }

  fn save_image(&self, image: &image::RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;
    info!("保存图像到文件: {}", self.path.display());
    Ok(())
  }

  fn save_record(&self, detections: &[Detection]) -> Result<(), SaveImageFileError> {
    let record = DetectionRecord {
      created_at: Local::now().to_rfc3339(),
      count: detections.len(),
      detections,
    };
    let path = self.record_path();
    std::fs::write(&path, serde_json::to_string_pretty(&record)?)?;
    info!("保存检测记录到文件: {}", path.display());
    Ok(())
  }
}

impl Render<DetectResult> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, result: &DetectResult) -> Result<(), Self::Error> {
    self.save_image(&result.image)?;
    if self.record {
      self.save_record(&result.detections)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::BoundingBox;
  use image::{Rgb, RgbImage};

  fn result() -> DetectResult {
    DetectResult {
      detections: vec![Detection {
        label: "dog".to_string(),
        class_index: 17,
        score: 0.93,
        bbox: BoundingBox {
          left: 1.0,
          top: 2.0,
          right: 30.0,
          bottom: 40.0,
        },
      }],
      image: RgbImage::from_pixel(48, 32, Rgb([1, 2, 3])),
    }
  }

  #[test]
  fn from_url_reads_path_and_record_flag() {
    let url = Url::parse("image:///tmp/out/result.png?record").unwrap();
    let output = SaveImageFileOutput::from_url(&url).unwrap();
    assert_eq!(output.path(), Path::new("/tmp/out/result.png"));
    assert!(output.record);
    assert_eq!(output.record_path(), PathBuf::from("/tmp/out/result.json"));

    let url = Url::parse("image:///tmp/out/result.png").unwrap();
    assert!(!SaveImageFileOutput::from_url(&url).unwrap().record);
  }

  #[test]
  fn from_url_rejects_other_schemes() {
    let url = Url::parse("folder:///tmp/out").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
  }

  #[test]
  fn saves_image_and_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("annotated.png");
    let output = SaveImageFileOutput::new(&path).with_record(true);

    output.render_result(&result()).unwrap();

    let saved = image::open(&path).unwrap().into_rgb8();
    assert_eq!(saved.dimensions(), (48, 32));
    assert_eq!(*saved.get_pixel(0, 0), Rgb([1, 2, 3]));

    let text = std::fs::read_to_string(output.record_path()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["count"], 1);
    assert_eq!(json["detections"][0]["label"], "dog");
    assert_eq!(json["detections"][0]["class_index"], 17);
  }

  #[test]
  fn record_is_skipped_without_flag() {
    let dir = tempfile::tempdir().unwrap();
    let output = SaveImageFileOutput::new(dir.path().join("plain.png"));
    output.render_result(&result()).unwrap();
    assert!(!output.record_path().exists());
  }
}
