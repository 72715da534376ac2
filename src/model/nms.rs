// 该文件是 Shijian （食鉴） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use std::collections::VecDeque;

use tracing::debug;

use crate::geometry::{Detection, iou};

/// 贪心非极大值抑制
///
/// 按置信度降序处理，置信度相同时保持输入顺序（稳定排序），
/// 因此对相同输入总是得到相同输出。与已保留框的 IoU 严格大于阈值的框被移除。
pub fn suppress(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
  let mut sorted = detections.to_vec();
  sorted.sort_by(|a, b| b.score().total_cmp(&a.score()));

  let mut remaining: VecDeque<Detection> = sorted.into();
  let mut kept = Vec::new();

  while let Some(best) = remaining.pop_front() {
    remaining.retain(|det| iou(&best, det) <= iou_threshold);
    kept.push(best);
  }

  debug!("NMS 保留 {} 个检测框 (输入 {})", kept.len(), detections.len());
  kept
}
