// 该文件是 Shijian （食鉴） 项目的一部分。
// src/geometry.rs - 边界框几何工具
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

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
  #[error("坐标或置信度不是有限数值: ({0}, {1}, {2}, {3}, {4})")]
  NonFinite(f32, f32, f32, f32, f32),
  #[error("边界框角点颠倒: x1={x1}, y1={y1}, x2={x2}, y2={y2}")]
  Inverted { x1: f32, y1: f32, x2: f32, y2: f32 },
  #[error("置信度超出 [0, 1] 范围: {0}")]
  ScoreOutOfRange(f32),
}

/// 检测结果，坐标为模型输入参考系（例如 640x640）中的像素角点
///
/// 构造时校验，之后不可变。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
  x1: f32,
  y1: f32,
  x2: f32,
  y2: f32,
  score: f32,
}

impl Detection {
  pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Result<Self, GeometryError> {
    if ![x1, y1, x2, y2, score].iter().all(|v| v.is_finite()) {
      return Err(GeometryError::NonFinite(x1, y1, x2, y2, score));
    }
    if x2 < x1 || y2 < y1 {
      return Err(GeometryError::Inverted { x1, y1, x2, y2 });
    }
    if !(0.0..=1.0).contains(&score) {
      return Err(GeometryError::ScoreOutOfRange(score));
    }
    Ok(Self {
      x1,
      y1,
      x2,
      y2,
      score,
    })
  }

  pub fn x1(&self) -> f32 {
    self.x1
  }

  pub fn y1(&self) -> f32 {
    self.y1
  }

  pub fn x2(&self) -> f32 {
    self.x2
  }

  pub fn y2(&self) -> f32 {
    self.y2
  }

  pub fn score(&self) -> f32 {
    self.score
  }

  pub fn width(&self) -> f32 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> f32 {
    self.y2 - self.y1
  }

  pub fn area(&self) -> f32 {
    area(self)
  }

  /// 将边界框裁剪到图像范围内，得到用于文字识别的整数像素区域
  pub fn crop_rect(&self, image_width: u32, image_height: u32) -> CropRect {
    let x1 = self.x1.max(0.0) as u32;
    let y1 = self.y1.max(0.0) as u32;
    let x2 = self.x2.min(image_width as f32).max(0.0) as u32;
    let y2 = self.y2.min(image_height as f32).max(0.0) as u32;
    CropRect {
      x: x1,
      y: y1,
      width: x2.saturating_sub(x1).max(1),
      height: y2.saturating_sub(y1).max(1),
    }
  }
}

/// 图像上的整数像素区域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CropRect {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

pub fn area(det: &Detection) -> f32 {
  det.width() * det.height()
}

/// 计算两个边界框的 IoU，并集面积不为正时返回 0
pub fn iou(a: &Detection, b: &Detection) -> f32 {
  let x1 = a.x1.max(b.x1);
  let y1 = a.y1.max(b.y1);
  let x2 = a.x2.min(b.x2);
  let y2 = a.y2.min(b.y2);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let union = area(a) + area(b) - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 等比缩放并居中填充到正方形画布的变换
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub scale: f32,
  pub dx: f32,
  pub dy: f32,
  pub source_width: u32,
  pub source_height: u32,
  pub size: u32,
}

impl Letterbox {
  pub fn fit(source_width: u32, source_height: u32, size: u32) -> Self {
    let (sw, sh) = (source_width.max(1) as f32, source_height.max(1) as f32);
    let scale = (size as f32 / sw).min(size as f32 / sh);
    Self {
      scale,
      dx: (size as f32 - sw * scale) / 2.0,
      dy: (size as f32 - sh * scale) / 2.0,
      source_width,
      source_height,
      size,
    }
  }

  /// 画布坐标 -> 原图坐标（不裁剪）
  pub fn to_source_point(&self, x: f32, y: f32) -> (f32, f32) {
    ((x - self.dx) / self.scale, (y - self.dy) / self.scale)
  }

  /// 将画布上的检测框映射回原图并裁剪到原图范围
  pub fn to_source(&self, det: &Detection) -> Detection {
    let (w, h) = (self.source_width as f32, self.source_height as f32);
    let (x1, y1) = self.to_source_point(det.x1, det.y1);
    let (x2, y2) = self.to_source_point(det.x2, det.y2);
    let x1 = x1.clamp(0.0, w);
    let y1 = y1.clamp(0.0, h);
    Detection {
      x1,
      y1,
      x2: x2.clamp(x1, w.max(x1)),
      y2: y2.clamp(y1, h.max(y1)),
      score: det.score,
    }
  }
}
