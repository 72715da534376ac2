// 该文件是 Shijian （食鉴） 项目的一部分。
// src/model.rs - 模型
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

/// 推理引擎。只负责把输入帧变成原始输出张量，后处理在本库中完成。
pub trait Model {
  type Input;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<RawOutput, Self::Error>;
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensorError {
  #[error("张量数据长度不匹配: 形状 {shape:?} 需要 {expected} 个元素, 实际 {actual} 个")]
  LengthMismatch {
    shape: [usize; 3],
    expected: usize,
    actual: usize,
  },
}

/// 模型原始输出，形状 `[batch, channels, anchors]`，行优先
#[derive(Debug, Clone)]
pub struct RawOutput {
  shape: [usize; 3],
  data: Box<[f32]>,
}

impl RawOutput {
  pub fn new(shape: [usize; 3], data: Vec<f32>) -> Result<Self, TensorError> {
    let expected = shape.iter().product::<usize>();
    if data.len() != expected {
      return Err(TensorError::LengthMismatch {
        shape,
        expected,
        actual: data.len(),
      });
    }
    Ok(Self {
      shape,
      data: data.into_boxed_slice(),
    })
  }

  pub fn shape(&self) -> [usize; 3] {
    self.shape
  }

  pub fn channels(&self) -> usize {
    self.shape[1]
  }

  pub fn anchors(&self) -> usize {
    self.shape[2]
  }

  /// 第一个批次中某个通道的全部锚点
  pub fn channel(&self, c: usize) -> &[f32] {
    let n = self.anchors();
    &self.data[c * n..(c + 1) * n]
  }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
  #[error("{name} 必须位于 [0, 1] 范围内, 实际为 {value}")]
  ThresholdOutOfRange { name: &'static str, value: f32 },
  #[error("{0} 不能为 0")]
  Zero(&'static str),
  #[error("模型输入尺寸 {input_size} 与帧尺寸 {width}x{height} 不一致")]
  FrameSizeMismatch {
    input_size: u32,
    width: u32,
    height: u32,
  },
}

/// 检测器参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
  pub input_size: u32,
  pub anchors: usize,
  pub confidence_threshold: f32,
  pub iou_threshold: f32,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      input_size: yolo8::YOLO8_INPUT_SIZE,
      anchors: yolo8::YOLO8_ANCHORS,
      confidence_threshold: yolo8::YOLO8_CONFIDENCE_THRESH,
      iou_threshold: yolo8::YOLO8_IOU_THRESH,
    }
  }
}

impl DetectorConfig {
  pub fn with_input_size(mut self, input_size: u32) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn with_anchors(mut self, anchors: usize) -> Self {
    self.anchors = anchors;
    self
  }

  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
    self.iou_threshold = threshold;
    self
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.input_size == 0 {
      return Err(ConfigError::Zero("input_size"));
    }
    if self.anchors == 0 {
      return Err(ConfigError::Zero("anchors"));
    }
    for (name, value) in [
      ("confidence_threshold", self.confidence_threshold),
      ("iou_threshold", self.iou_threshold),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ThresholdOutOfRange { name, value });
      }
    }
    Ok(())
  }

  /// 检测框按 `input_size` 的正方形坐标解码，帧必须是同样大小的正方形
  pub fn validate_for_frame(&self, width: u32, height: u32) -> Result<(), ConfigError> {
    self.validate()?;
    if self.input_size != width || width != height {
      return Err(ConfigError::FrameSizeMismatch {
        input_size: self.input_size,
        width,
        height,
      });
    }
    Ok(())
  }
}

pub mod nms;
mod yolo8;
pub use self::nms::suppress;
pub use self::yolo8::{
  DecodeError, YOLO8_ANCHORS, YOLO8_CHANNELS, YOLO8_CONFIDENCE_THRESH, YOLO8_INPUT_SIZE,
  YOLO8_IOU_THRESH, decode, decode_with,
};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_raw_output_channels() {
    let out = RawOutput::new([1, 2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    assert_eq!(out.channel(0), &[1.0, 2.0, 3.0]);
    assert_eq!(out.channel(1), &[4.0, 5.0, 6.0]);
  }

  #[test]
  fn test_raw_output_length_mismatch() {
    assert!(matches!(
      RawOutput::new([1, 5, 4], vec![0.0; 19]),
      Err(TensorError::LengthMismatch {
        expected: 20,
        actual: 19,
        ..
      })
    ));
  }

  #[test]
  fn test_config_validation() {
    assert!(DetectorConfig::default().validate().is_ok());
    assert_eq!(
      DetectorConfig::default()
        .with_iou_threshold(1.5)
        .validate(),
      Err(ConfigError::ThresholdOutOfRange {
        name: "iou_threshold",
        value: 1.5
      })
    );
    assert_eq!(
      DetectorConfig::default().with_anchors(0).validate(),
      Err(ConfigError::Zero("anchors"))
    );
  }

  #[test]
  fn test_config_must_match_frame() {
    let config = DetectorConfig::default().with_input_size(64);
    assert!(config.validate_for_frame(64, 64).is_ok());
    assert_eq!(
      DetectorConfig::default().validate_for_frame(64, 64),
      Err(ConfigError::FrameSizeMismatch {
        input_size: 640,
        width: 64,
        height: 64
      })
    );
    assert!(matches!(
      config.validate_for_frame(64, 32),
      Err(ConfigError::FrameSizeMismatch { .. })
    ));
    assert_eq!(
      config.with_anchors(0).validate_for_frame(64, 64),
      Err(ConfigError::Zero("anchors"))
    );
  }
}
