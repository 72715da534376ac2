// 该文件是 Shijian （食鉴） 项目的一部分。
// src/allergen/analyzer.rs - 过敏原分析
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

use std::collections::BTreeSet;

use tracing::debug;

use crate::{
  allergen::{AllergenHit, Lexicon},
  text::{normalize, split_lines},
};

/// 逐行匹配词库，每个类别合并为一条结果
///
/// 结果按声明强度降序、类别名称升序排列。没有命中时返回空列表。
pub fn analyze(text: &str, lexicon: &Lexicon) -> Vec<AllergenHit> {
  let lines: Vec<(&str, String)> = split_lines(text)
    .map(|line| (line, normalize(line)))
    .collect();

  let mut hits = Vec::new();
  for (category, patterns) in lexicon.iter() {
    let mut merged: Option<AllergenHit> = None;

    for (original, normalized) in &lines {
      let terms: BTreeSet<String> = patterns
        .iter()
        .flat_map(|p| p.find_iter(normalized).map(|m| m.as_str().to_string()))
        .collect();
      if terms.is_empty() {
        continue;
      }

      let severity = lexicon.markers().classify(normalized);
      match merged.as_mut() {
        Some(hit) => {
          hit.matched_terms.extend(terms);
          // 相同强度保留先出现的行
          if severity > hit.severity {
            hit.severity = severity;
            hit.evidence_line = original.trim().to_string();
          }
        }
        None => {
          merged = Some(AllergenHit {
            category,
            matched_terms: terms,
            severity,
            evidence_line: original.trim().to_string(),
          });
        }
      }
    }

    if let Some(hit) = merged {
      debug!("{}: {} ({:?})", hit.category, hit.severity, hit.matched_terms);
      hits.push(hit);
    }
  }

  hits.sort_by(|a, b| {
    b.severity
      .cmp(&a.severity)
      .then_with(|| a.category.cmp(&b.category))
  });
  hits
}
