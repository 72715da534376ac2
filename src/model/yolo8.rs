// 该文件是 Shijian （食鉴） 项目的一部分。
// src/model/yolo8.rs - YOLOv8 单类别输出解码
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

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::{
  geometry::Detection,
  model::{DetectorConfig, RawOutput},
};

pub const YOLO8_INPUT_SIZE: u32 = 640;
pub const YOLO8_ANCHORS: usize = 8400;
/// `[cx, cy, w, h, score]`
pub const YOLO8_CHANNELS: usize = 5;
pub const YOLO8_CONFIDENCE_THRESH: f32 = 0.30;
pub const YOLO8_IOU_THRESH: f32 = 0.50;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
  #[error("输出形状不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  ShapeMismatch {
    expected: [usize; 3],
    actual: [usize; 3],
  },
}

/// 使用默认锚点数量解码
pub fn decode(
  output: &RawOutput,
  input_size: u32,
  confidence_threshold: f32,
) -> Result<Vec<Detection>, DecodeError> {
  decode_with(
    output,
    &DetectorConfig::default()
      .with_input_size(input_size)
      .with_confidence_threshold(confidence_threshold),
  )
}

/// 将 `[1, 5, N]` 输出转换为像素角点坐标的检测框，顺序与锚点顺序一致
pub fn decode_with(output: &RawOutput, config: &DetectorConfig) -> Result<Vec<Detection>, DecodeError> {
  let expected = [1, YOLO8_CHANNELS, config.anchors];
  if output.shape() != expected {
    error!(
      "预期模型输出形状为 {:?}, 实际为 {:?}",
      expected,
      output.shape()
    );
    return Err(DecodeError::ShapeMismatch {
      expected,
      actual: output.shape(),
    });
  }

  let size = config.input_size as f32;
  let (cxs, cys) = (output.channel(0), output.channel(1));
  let (ws, hs) = (output.channel(2), output.channel(3));
  let scores = output.channel(4);

  let mut items = Vec::new();
  for i in 0..config.anchors {
    let (cx, cy, w, h, score) = (cxs[i], cys[i], ws[i], hs[i], scores[i]);
    if score < config.confidence_threshold || w <= 0.0 || h <= 0.0 {
      continue;
    }

    let x1 = (cx - w / 2.0) * size;
    let y1 = (cy - h / 2.0) * size;
    let x2 = (cx + w / 2.0) * size;
    let y2 = (cy + h / 2.0) * size;

    match Detection::new(x1, y1, x2, y2, score) {
      Ok(det) => items.push(det),
      Err(e) => warn!("跳过锚点 {}: {}", i, e),
    }
  }

  debug!("解码得到 {} 个候选框", items.len());
  Ok(items)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tensor(anchors: &[[f32; 5]], total: usize) -> RawOutput {
    let mut data = vec![0.0; YOLO8_CHANNELS * total];
    for (i, a) in anchors.iter().enumerate() {
      for c in 0..YOLO8_CHANNELS {
        data[c * total + i] = a[c];
      }
    }
    RawOutput::new([1, YOLO8_CHANNELS, total], data).unwrap()
  }

  #[test]
  fn test_all_below_threshold() {
    let out = tensor(&[[0.5, 0.5, 0.2, 0.2, 0.1]], YOLO8_ANCHORS);
    let dets = decode(&out, 640, 0.3).unwrap();
    assert!(dets.is_empty());
  }

  #[test]
  fn test_single_anchor_corner_coordinates() {
    let out = tensor(&[[0.5, 0.5, 0.2, 0.2, 0.9]], YOLO8_ANCHORS);
    let dets = decode(&out, 640, 0.3).unwrap();
    assert_eq!(dets.len(), 1);
    let d = dets[0];
    assert!((d.x1() - 256.0).abs() < 1e-3);
    assert!((d.y1() - 256.0).abs() < 1e-3);
    assert!((d.x2() - 384.0).abs() < 1e-3);
    assert!((d.y2() - 384.0).abs() < 1e-3);
    assert_eq!(d.score(), 0.9);
  }

  #[test]
  fn test_skips_non_positive_size_and_keeps_anchor_order() {
    let out = tensor(
      &[
        [0.2, 0.2, 0.1, 0.1, 0.4],
        [0.5, 0.5, 0.0, 0.2, 0.9],
        [0.5, 0.5, 0.2, -0.1, 0.9],
        [0.8, 0.8, 0.1, 0.1, 0.95],
      ],
      8,
    );
    let config = DetectorConfig::default().with_anchors(8);
    let dets = decode_with(&out, &config).unwrap();
    assert_eq!(dets.len(), 2);
    assert_eq!(dets[0].score(), 0.4);
    assert_eq!(dets[1].score(), 0.95);
  }

  #[test]
  fn test_threshold_is_inclusive() {
    let out = tensor(&[[0.5, 0.5, 0.2, 0.2, 0.3]], 4);
    let config = DetectorConfig::default()
      .with_anchors(4)
      .with_confidence_threshold(0.3);
    assert_eq!(decode_with(&out, &config).unwrap().len(), 1);
  }

  #[test]
  fn test_skips_nan_anchor() {
    let out = tensor(&[[f32::NAN, 0.5, 0.2, 0.2, 0.9]], 4);
    let config = DetectorConfig::default().with_anchors(4);
    assert!(decode_with(&out, &config).unwrap().is_empty());
  }

  #[test]
  fn test_shape_mismatch() {
    let out = RawOutput::new([1, 84, 10], vec![0.0; 840]).unwrap();
    let err = decode_with(&out, &DetectorConfig::default().with_anchors(10)).unwrap_err();
    assert_eq!(
      err,
      DecodeError::ShapeMismatch {
        expected: [1, 5, 10],
        actual: [1, 84, 10]
      }
    );

    let out = RawOutput::new([1, 5, 100], vec![0.0; 500]).unwrap();
    assert!(matches!(
      decode(&out, 640, 0.3),
      Err(DecodeError::ShapeMismatch { .. })
    ));
  }
}
