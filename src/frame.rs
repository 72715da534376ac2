// 该文件是 Shijian （食鉴） 项目的一部分。
// src/frame.rs - NHWC 帧定义
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

use image::{DynamicImage, RgbImage, imageops};
use thiserror::Error;
use tracing::warn;

use crate::geometry::{CropRect, Letterbox};

const RGB_CHANNELS: usize = 3;

/// 文字识别前的放大倍数
pub const OCR_UPSCALE: u32 = 2;
/// 文字识别前的对比度系数
pub const OCR_CONTRAST: f32 = 1.8;
/// 文字识别前的亮度偏移
pub const OCR_BRIGHTNESS: f32 = 20.0;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

pub trait AsNhwcFrame<const W: u32, const H: u32> {
  fn as_nhwc(&self) -> &[u8];
}

/// 固定尺寸的 RGB 帧，NHWC 排列，每通道 8 位
#[derive(Debug, Clone)]
pub struct RgbNhwcFrame<const W: u32, const H: u32> {
  data: Box<[u8]>,
}

impl<const W: u32, const H: u32> TryFrom<Vec<u8>> for RgbNhwcFrame<W, H> {
  type Error = FrameError;

  fn try_from(data: Vec<u8>) -> Result<Self, Self::Error> {
    let expected = RGB_CHANNELS * W as usize * H as usize;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
    })
  }
}

impl<const W: u32, const H: u32> Default for RgbNhwcFrame<W, H> {
  fn default() -> Self {
    let size = RGB_CHANNELS * (W as usize) * (H as usize);
    let data = vec![0u8; size].into_boxed_slice();
    Self { data }
  }
}

impl<const W: u32, const H: u32> RgbNhwcFrame<W, H> {
  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// 将任意尺寸的 RGB 图像等比缩放并居中放入帧中（最近邻采样，黑边填充）
  pub fn letterbox(
    source: &[u8],
    source_width: u32,
    source_height: u32,
  ) -> Result<(Self, Letterbox), FrameError> {
    let expected = RGB_CHANNELS * source_width as usize * source_height as usize;
    if source.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: source.len(),
      });
    }

    let mut frame = Self::default();
    if source_width == 0 || source_height == 0 {
      return Ok((frame, Letterbox::fit(source_width, source_height, W.min(H))));
    }

    // 按较小边构造正方形变换
    let lb = Letterbox::fit(source_width, source_height, W.min(H));
    let slice = frame.as_mut();

    for h in 0..H {
      for w in 0..W {
        let (sx, sy) = lb.to_source_point(w as f32 + 0.5, h as f32 + 0.5);
        if sx < 0.0 || sy < 0.0 || sx >= source_width as f32 || sy >= source_height as f32 {
          continue;
        }
        let src = ((sy as usize) * source_width as usize + sx as usize) * RGB_CHANNELS;
        let dst = ((h as usize) * W as usize + w as usize) * RGB_CHANNELS;
        slice[dst..dst + RGB_CHANNELS].copy_from_slice(&source[src..src + RGB_CHANNELS]);
      }
    }

    Ok((frame, lb))
  }

  /// 模型输入：每个通道除以 255 归一化到 [0, 1]
  pub fn normalized(&self) -> Box<[f32]> {
    self.data.iter().map(|&v| v as f32 / 255.0).collect()
  }

  /// 截取区域，区域会被限制在帧范围内
  pub fn crop(&self, rect: &CropRect) -> RgbRegion {
    if W == 0 || H == 0 {
      return RgbRegion {
        width: 0,
        height: 0,
        data: Vec::new(),
      };
    }

    let x = rect.x.min(W.saturating_sub(1));
    let y = rect.y.min(H.saturating_sub(1));
    let width = rect.width.min(W - x).max(1);
    let height = rect.height.min(H - y).max(1);

    let mut data = Vec::with_capacity(RGB_CHANNELS * width as usize * height as usize);
    for h in y..y + height {
      let start = ((h as usize) * W as usize + x as usize) * RGB_CHANNELS;
      data.extend_from_slice(&self.data[start..start + width as usize * RGB_CHANNELS]);
    }

    RgbRegion {
      width,
      height,
      data,
    }
  }
}

impl<const W: u32, const H: u32> AsMut<[u8]> for RgbNhwcFrame<W, H> {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}

impl<const W: u32, const H: u32> AsNhwcFrame<W, H> for RgbNhwcFrame<W, H> {
  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}

/// 从帧中截取的区域，交给文字识别
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbRegion {
  pub width: u32,
  pub height: u32,
  pub data: Vec<u8>,
}

impl RgbRegion {
  /// 文字识别前的预处理：放大、去色，再调整对比度与亮度
  pub fn enhanced(&self) -> RgbRegion {
    if self.width == 0 || self.height == 0 {
      return self.clone();
    }
    let Some(image) = RgbImage::from_raw(self.width, self.height, self.data.clone()) else {
      warn!(
        "区域数据长度与尺寸 {}x{} 不符, 跳过预处理",
        self.width, self.height
      );
      return self.clone();
    };

    let (width, height) = (self.width * OCR_UPSCALE, self.height * OCR_UPSCALE);
    let scaled = imageops::resize(&image, width, height, imageops::FilterType::Triangle);
    let mut gray = imageops::grayscale(&scaled);
    for v in gray.iter_mut() {
      *v = (*v as f32 * OCR_CONTRAST + OCR_BRIGHTNESS)
        .round()
        .clamp(0.0, 255.0) as u8;
    }

    RgbRegion {
      width,
      height,
      data: DynamicImage::ImageLuma8(gray).to_rgb8().into_raw(),
    }
  }
}
