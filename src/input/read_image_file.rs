// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, path_from_url};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 单张图像输入，作为只产出一帧的迭代器使用
pub struct ImageFileInput {
  image: Option<RgbImage>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    Self::open(path_from_url(url))
  }
}

impl ImageFileInput {
  /// 解码图像文件，带透明通道的图像会丢弃 alpha
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    debug!(
      "读取图像 {}: {}x{}",
      path.display(),
      image.width(),
      image.height()
    );

    Ok(ImageFileInput {
      image: Some(image.into_rgb8()),
    })
  }
}

impl From<RgbImage> for ImageFileInput {
  fn from(image: RgbImage) -> Self {
    Self { image: Some(image) }
  }
}

impl Iterator for ImageFileInput {
  type Item = RgbImage;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgba, RgbaImage};

  #[test]
  fn reads_png_and_drops_alpha() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("photo.png");
    RgbaImage::from_pixel(5, 4, Rgba([200, 100, 50, 7]))
      .save(&path)
      .unwrap();

    let url = Url::parse(&format!("image://{}", path.display())).unwrap();
    let mut input = ImageFileInput::from_url(&url).unwrap();
    let image = input.next().unwrap();
    assert_eq!(image.dimensions(), (5, 4));
    assert_eq!(image.get_pixel(2, 2).0, [200, 100, 50]);
    assert!(input.next().is_none());
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("file:///tmp/photo.png").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch)
    ));
  }

  #[test]
  fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = ImageFileInput::open(dir.path().join("missing.jpg"));
    assert!(matches!(result, Err(ImageFileInputError::IoError(_))));
  }
}
