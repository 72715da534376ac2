// 该文件是 Shijian （食鉴） 项目的一部分。
// src/report.rs - 扫描报告
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

use std::{collections::BTreeMap, fmt::Write, ops::Range};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  allergen::{AllergenHit, Lexicon, Severity},
  geometry::Detection,
  text::{NormalizedText, line_ranges},
};

/// 检测步骤的结果，“没有区域”与“检测失败”需要区分展示
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum DetectionStatus {
  Found,
  NoRegions,
  Failed(String),
  /// 只分析了文字，没有执行检测
  Skipped,
}

/// 一次扫描的完整输出
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
  pub full_text: String,
  pub hits: Vec<AllergenHit>,
  pub detections: Vec<Detection>,
  pub detection_status: DetectionStatus,
}

/// 交给持久化的摘要：过敏原名称及其声明强度
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
  pub detected: Vec<String>,
  pub severities: BTreeMap<String, Severity>,
}

/// 持久化记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
  pub timestamp: DateTime<Utc>,
  pub image_ref: Option<String>,
  pub detected: Vec<String>,
  pub severities: BTreeMap<String, Severity>,
  pub ocr_text: String,
}

impl ScanRecord {
  pub fn detected_line(&self) -> String {
    if self.detected.is_empty() {
      "Detected: None".to_string()
    } else {
      format!("Detected: {}", self.detected.join(", "))
    }
  }
}

#[derive(Debug, Default)]
pub struct ReportBuilder {
  status: Option<DetectionStatus>,
}

impl ReportBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// 覆盖默认的检测状态（默认根据检测框是否为空推断）
  pub fn with_detection_status(mut self, status: DetectionStatus) -> Self {
    self.status = Some(status);
    self
  }

  pub fn build(
    self,
    full_text: impl Into<String>,
    mut hits: Vec<AllergenHit>,
    detections: Vec<Detection>,
  ) -> ScanReport {
    hits.sort_by(|a, b| {
      b.severity
        .cmp(&a.severity)
        .then_with(|| a.category.cmp(&b.category))
    });
    let detection_status = self.status.unwrap_or(if detections.is_empty() {
      DetectionStatus::NoRegions
    } else {
      DetectionStatus::Found
    });
    ScanReport {
      full_text: full_text.into(),
      hits,
      detections,
      detection_status,
    }
  }
}

impl ScanReport {
  pub fn is_clean(&self) -> bool {
    self.hits.is_empty()
  }

  pub fn summary(&self) -> ScanSummary {
    let mut severities = BTreeMap::new();
    for hit in &self.hits {
      let name = hit.category.name().to_string();
      let entry = severities.entry(name).or_insert(hit.severity);
      *entry = (*entry).max(hit.severity);
    }
    ScanSummary {
      detected: severities.keys().cloned().collect(),
      severities,
    }
  }

  pub fn record(&self, image_ref: Option<String>, timestamp: DateTime<Utc>) -> ScanRecord {
    let ScanSummary {
      detected,
      severities,
    } = self.summary();
    ScanRecord {
      timestamp,
      image_ref,
      detected,
      severities,
      ocr_text: self.full_text.clone(),
    }
  }

  /// 全文中所有词库匹配的字节区间（原文坐标），重叠或相接的区间会合并
  pub fn highlights(&self, lexicon: &Lexicon) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    for line in line_ranges(&self.full_text) {
      let offset = line.start;
      let normalized = NormalizedText::new(&self.full_text[line]);
      for (_, patterns) in lexicon.iter() {
        for pattern in patterns {
          for m in pattern.find_iter(normalized.as_str()) {
            let range = normalized.to_original(m.range());
            spans.push(range.start + offset..range.end + offset);
          }
        }
      }
    }

    spans.sort_by_key(|r| (r.start, r.end));
    let mut merged: Vec<Range<usize>> = Vec::with_capacity(spans.len());
    for span in spans {
      match merged.last_mut() {
        Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
        _ => merged.push(span),
      }
    }
    merged
  }

  /// 与 `highlights` 相同，但以字符（Unicode 标量值）计数，供非 UTF-8 字节寻址的界面使用
  pub fn char_highlights(&self, lexicon: &Lexicon) -> Vec<Range<usize>> {
    let spans = self.highlights(lexicon);
    let mut chars = self.full_text.char_indices().map(|(b, _)| b).enumerate().peekable();
    let mut to_char = |byte: usize| {
      while let Some(&(i, b)) = chars.peek() {
        if b >= byte {
          return i;
        }
        chars.next();
      }
      self.full_text.chars().count()
    };
    spans
      .into_iter()
      .map(|r| {
        let start = to_char(r.start);
        start..to_char(r.end)
      })
      .collect()
  }

  /// 纯文本形式的报告
  pub fn render_text(&self) -> String {
    let mut out = String::new();
    let summary = self.summary();
    if summary.detected.is_empty() {
      out.push_str("Detected: None\n\n");
    } else {
      let _ = write!(out, "Detected: {}\n\n", summary.detected.join(", "));
    }

    out.push_str("Details:\n");
    if self.hits.is_empty() {
      out.push_str("• No EU-14 allergens found in the scanned text.\n\n");
    } else {
      for hit in &self.hits {
        let _ = writeln!(
          out,
          "• {} — {}: {}",
          hit.category,
          hit.severity.label(),
          hit.category.explanation()
        );
        if !hit.evidence_line.trim().is_empty() {
          let _ = writeln!(out, "   ↳ “{}”", hit.evidence_line);
        }
      }
      out.push('\n');
    }

    out.push_str("Ingredients (OCR):\n\n");
    out.push_str(&self.full_text);
    out
  }
}
