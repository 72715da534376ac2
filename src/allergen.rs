// 该文件是 Shijian （食鉴） 项目的一部分。
// src/allergen.rs - 过敏原定义
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

use std::{cmp::Ordering, collections::BTreeSet, fmt};

use regex::{Match, Regex};
use serde::{Deserialize, Serialize};

mod analyzer;
pub mod lexicon;

pub use self::analyzer::analyze;
pub use self::lexicon::{Lexicon, LexiconBuilder, LexiconError, SeverityMarkers};

/// 欧盟法规要求标注的过敏原类别（谷物中单独列出小麦）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllergenCategory {
  Milk,
  Egg,
  Fish,
  Crustaceans,
  Molluscs,
  Peanut,
  #[serde(rename = "tree nuts")]
  TreeNuts,
  Soy,
  Gluten,
  Wheat,
  Sesame,
  Celery,
  Mustard,
  Lupin,
  Sulphites,
}

impl AllergenCategory {
  pub const ALL: [AllergenCategory; 15] = [
    AllergenCategory::Milk,
    AllergenCategory::Egg,
    AllergenCategory::Fish,
    AllergenCategory::Crustaceans,
    AllergenCategory::Molluscs,
    AllergenCategory::Peanut,
    AllergenCategory::TreeNuts,
    AllergenCategory::Soy,
    AllergenCategory::Gluten,
    AllergenCategory::Wheat,
    AllergenCategory::Sesame,
    AllergenCategory::Celery,
    AllergenCategory::Mustard,
    AllergenCategory::Lupin,
    AllergenCategory::Sulphites,
  ];

  pub fn name(&self) -> &'static str {
    match self {
      AllergenCategory::Milk => "milk",
      AllergenCategory::Egg => "egg",
      AllergenCategory::Fish => "fish",
      AllergenCategory::Crustaceans => "crustaceans",
      AllergenCategory::Molluscs => "molluscs",
      AllergenCategory::Peanut => "peanut",
      AllergenCategory::TreeNuts => "tree nuts",
      AllergenCategory::Soy => "soy",
      AllergenCategory::Gluten => "gluten",
      AllergenCategory::Wheat => "wheat",
      AllergenCategory::Sesame => "sesame",
      AllergenCategory::Celery => "celery",
      AllergenCategory::Mustard => "mustard",
      AllergenCategory::Lupin => "lupin",
      AllergenCategory::Sulphites => "sulphites",
    }
  }

  pub fn from_name(name: &str) -> Option<Self> {
    let name = name.trim().to_lowercase();
    Self::ALL.into_iter().find(|c| c.name() == name)
  }

  pub fn explanation(&self) -> &'static str {
    match self {
      AllergenCategory::Milk => "Dairy (cheese, yogurt, whey/casein).",
      AllergenCategory::Egg => "Egg proteins (incl. lysozyme E1105).",
      AllergenCategory::Fish => "Fish proteins.",
      AllergenCategory::Crustaceans => "Crustacean shellfish.",
      AllergenCategory::Molluscs => "Molluscs (mussels/squid).",
      AllergenCategory::Peanut => "Peanut proteins.",
      AllergenCategory::TreeNuts => "Almond, hazelnut, walnut, pistachio, etc.",
      AllergenCategory::Soy => "Soy (incl. lecithin E322).",
      AllergenCategory::Gluten => "Gluten grains/derivatives (barley/rye/oats/spelt/malt).",
      AllergenCategory::Wheat => "Wheat (a gluten source).",
      AllergenCategory::Sesame => "Sesame (incl. tahini).",
      AllergenCategory::Celery => "Celery.",
      AllergenCategory::Mustard => "Mustard.",
      AllergenCategory::Lupin => "Lupin flour/beans.",
      AllergenCategory::Sulphites => "Sulphites/preservatives (E220–E228).",
    }
  }
}

impl fmt::Display for AllergenCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

// 按名称排序，保证输出稳定
impl Ord for AllergenCategory {
  fn cmp(&self, other: &Self) -> Ordering {
    self.name().cmp(other.name())
  }
}

impl PartialOrd for AllergenCategory {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

/// 声明强度，`Contains > MayContain > Trace > Mentioned`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
  #[serde(rename = "mentioned")]
  Mentioned,
  #[serde(rename = "trace")]
  Trace,
  #[serde(rename = "may contain")]
  MayContain,
  #[serde(rename = "contains")]
  Contains,
}

impl Severity {
  pub fn label(&self) -> &'static str {
    match self {
      Severity::Contains => "Contains",
      Severity::MayContain => "May contain",
      Severity::Trace => "Trace",
      Severity::Mentioned => "Mentioned",
    }
  }
}

impl fmt::Display for Severity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Severity::Contains => "contains",
      Severity::MayContain => "may contain",
      Severity::Trace => "trace",
      Severity::Mentioned => "mentioned",
    })
  }
}

/// 一次扫描中某个类别的合并结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllergenHit {
  pub category: AllergenCategory,
  pub matched_terms: BTreeSet<String>,
  pub severity: Severity,
  pub evidence_line: String,
}

/// 单个匹配模式：一种或多种语言的写法，两侧不得紧邻字母
#[derive(Debug, Clone)]
pub struct DetectionPattern {
  alias: String,
  source: String,
  regex: Regex,
}

impl DetectionPattern {
  pub fn new(alias: &str, pattern: &str) -> Result<Self, regex::Error> {
    // regex 不支持环视，用前后各一个非字母字符（或文本边界）代替，词本身在第 1 组
    let regex = Regex::new(&format!(r"(?iu)(?:^|[^\p{{L}}])({pattern})(?:$|[^\p{{L}}])"))?;
    Ok(Self {
      alias: alias.to_string(),
      source: pattern.to_string(),
      regex,
    })
  }

  pub fn alias(&self) -> &str {
    &self.alias
  }

  pub fn source(&self) -> &str {
    &self.source
  }

  pub fn is_match(&self, text: &str) -> bool {
    self.regex.is_match(text)
  }

  pub fn find_iter<'r, 't>(&'r self, text: &'t str) -> BoundedMatches<'r, 't> {
    BoundedMatches {
      regex: &self.regex,
      text,
      pos: 0,
    }
  }
}

/// 依次返回满足字母边界的匹配
pub struct BoundedMatches<'r, 't> {
  regex: &'r Regex,
  text: &'t str,
  pos: usize,
}

impl<'t> Iterator for BoundedMatches<'_, 't> {
  type Item = Match<'t>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.pos > self.text.len() {
      return None;
    }
    let caps = self.regex.captures_at(self.text, self.pos)?;
    let term = caps.get(1)?;
    // 从词尾继续，尾部的边界字符可以作为下一个词的前导边界
    self.pos = if term.is_empty() {
      self.text[term.end()..]
        .chars()
        .next()
        .map(|c| term.end() + c.len_utf8())
        .unwrap_or(self.text.len() + 1)
    } else {
      term.end()
    };
    Some(term)
  }
}
