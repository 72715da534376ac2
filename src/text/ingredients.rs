// 该文件是 Shijian （食鉴） 项目的一部分。
// src/text/ingredients.rs - 配料表文本挑选与合并
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

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// 配料表的多语言标志词
pub const INGREDIENT_KEYWORDS: [&str; 20] = [
  "ingredients",
  "ingredient",
  "contains",
  "may contain",
  "sastāvs",
  "sastavs",
  "var saturēt",
  "satur",
  "состав",
  "может содержать",
  "содержит",
  "sudėtis",
  "sudedamosios dalys",
  "suded.",
  "sudėtyje yra",
  "gali būti",
  "sastojci",
  "składniki",
  "zawiera",
  "może zawierać",
];

const KEYWORD_BONUS: i32 = 8;
const LENGTH_BUCKET: usize = 50;
const LENGTH_BONUS_CAP: usize = 10;

static SEPARATOR_REGEX: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"[,;•]|\band\b|\bun\b|\bи\b|\bir\b|\ba\b|\bor\b")
    .expect("separator regex is a valid constant")
});

pub fn looks_like_ingredients(text: &str) -> bool {
  let lower = text.to_lowercase();
  INGREDIENT_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// 评估一段文字像配料表的程度：标志词、分隔符数量与长度
pub fn score_ingredients_block(text: &str) -> i32 {
  let lower = text.to_lowercase();
  let mut score = 0;
  if INGREDIENT_KEYWORDS.iter().any(|k| lower.contains(k)) {
    score += KEYWORD_BONUS;
  }
  score += SEPARATOR_REGEX.find_iter(&lower).count() as i32;
  score += (lower.chars().count() / LENGTH_BUCKET).min(LENGTH_BONUS_CAP) as i32;
  score
}

/// 合并各检测区域与整图的识别结果
///
/// 顺序：得分最高的区域文字、整图文字、所有看起来像配料表的区域文字。
pub fn merge_ocr_texts<S: AsRef<str>>(crop_texts: &[S], full_text: &str) -> String {
  let crops: Vec<&str> = crop_texts
    .iter()
    .map(|t| t.as_ref().trim())
    .filter(|t| !t.is_empty())
    .collect();

  let mut best: Option<(&str, i32)> = None;
  for &text in &crops {
    let score = score_ingredients_block(text);
    if best.is_none_or(|(_, s)| score > s) {
      best = Some((text, score));
    }
  }
  if let Some((_, score)) = best {
    debug!("选中配料表区域, 得分 {}", score);
  }

  let explicit = crops
    .iter()
    .copied()
    .filter(|t| looks_like_ingredients(t))
    .collect::<Vec<_>>()
    .join("\n");

  let mut merged = String::new();
  for part in [best.map(|(t, _)| t).unwrap_or(""), full_text.trim(), explicit.as_str()] {
    if !part.trim().is_empty() {
      merged.push_str(part);
      merged.push('\n');
    }
  }
  merged.trim().to_string()
}
