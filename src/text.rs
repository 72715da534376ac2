// 该文件是 Shijian （食鉴） 项目的一部分。
// src/text.rs - OCR 文本归一化
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

use std::ops::Range;

pub mod ingredients;

/// OCR 常见的形近字符替换表
const CONFUSABLES: [(char, char); 11] = [
  ('0', 'o'),
  ('1', 'l'),
  ('¡', 'l'),
  ('|', 'l'),
  ('5', 's'),
  ('€', 'e'),
  ('3', 'e'),
  ('4', 'a'),
  ('@', 'a'),
  ('8', 'b'),
  ('§', 's'),
];

const LINE_BREAKS: [char; 7] = [
  '\n', '\r', '\u{0B}', '\u{0C}', '\u{85}', '\u{2028}', '\u{2029}',
];

fn unconfuse(ch: char) -> char {
  CONFUSABLES
    .iter()
    .find(|(from, _)| *from == ch)
    .map(|(_, to)| *to)
    .unwrap_or(ch)
}

/// 归一化后的文本，同时记录每个输出字符来自原文的哪一段字节
///
/// 折叠后的空白对应原文中整段空白；小写展开出的多个字符对应同一个原字符。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedText {
  text: String,
  origins: Vec<(usize, Range<usize>)>,
}

impl NormalizedText {
  pub fn new(raw: &str) -> Self {
    let mut out = Self::default();
    let mut pending_space: Option<Range<usize>> = None;

    for (start, ch) in raw.char_indices() {
      let end = start + ch.len_utf8();
      let mapped = unconfuse(ch);

      if mapped.is_whitespace() {
        pending_space = match pending_space {
          Some(run) => Some(run.start..end),
          None => Some(start..end),
        };
        continue;
      }

      if let Some(run) = pending_space.take()
        && !out.text.is_empty()
      {
        out.push(' ', run);
      }
      for lower in mapped.to_lowercase() {
        out.push(lower, start..end);
      }
    }

    out
  }

  fn push(&mut self, ch: char, origin: Range<usize>) {
    self.origins.push((self.text.len(), origin));
    self.text.push(ch);
  }

  pub fn as_str(&self) -> &str {
    &self.text
  }

  pub fn into_string(self) -> String {
    self.text
  }

  /// 将归一化文本中的字节区间映射回原文字节区间
  pub fn to_original(&self, range: Range<usize>) -> Range<usize> {
    let first = self.origins.partition_point(|(off, _)| *off < range.start);
    let last = self.origins.partition_point(|(off, _)| *off < range.end);
    if first >= last {
      let at = self
        .origins
        .get(first)
        .map(|(_, origin)| origin.start)
        .or_else(|| self.origins.last().map(|(_, origin)| origin.end))
        .unwrap_or(0);
      return at..at;
    }
    self.origins[first].1.start..self.origins[last - 1].1.end
  }
}

/// 替换形近字符、转小写、折叠空白并去除首尾空白
pub fn normalize(raw: &str) -> String {
  NormalizedText::new(raw).into_string()
}

/// 非空行在原文中的字节区间
pub fn line_ranges(text: &str) -> impl Iterator<Item = Range<usize>> + '_ {
  let mut ranges = Vec::new();
  let mut start = 0;
  for (i, ch) in text.char_indices() {
    if LINE_BREAKS.contains(&ch) {
      ranges.push(start..i);
      start = i + ch.len_utf8();
    }
  }
  ranges.push(start..text.len());

  ranges
    .into_iter()
    .filter(move |range| !text[range.clone()].trim().is_empty())
}

/// 按换行符切分并丢弃空行
pub fn split_lines(text: &str) -> impl Iterator<Item = &str> {
  line_ranges(text).map(move |range| &text[range])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_normalize_confusables_and_case() {
    assert_eq!(normalize("M1LK P0WDER"), "mllk powder");
    assert_eq!(normalize("5OY @ND €GG"), "soy and egg");
    assert_eq!(normalize("Ch|ck§n"), "chlcksn");
  }

  #[test]
  fn test_normalize_unicode_case_folding() {
    assert_eq!(normalize("МОЛОКО"), "молоко");
    assert_eq!(normalize("SŪRIS"), "sūris");
    assert_eq!(normalize("ŻELATYNA"), "żelatyna");
  }

  #[test]
  fn test_normalize_collapses_whitespace() {
    assert_eq!(normalize("  may \t\n contain   nuts \r\n"), "may contain nuts");
    assert_eq!(normalize(" \t "), "");
    assert_eq!(normalize(""), "");
  }

  #[test]
  fn test_normalize_idempotent() {
    for s in [
      "Contains: MILK, 5OY and wheat!",
      "  Sastāvs:  piens\n\nSIERS 1OO%  ",
      "Может содержать следы ОРЕХОВ",
      "İstanbul ΣΟΦΙΑ | 8€@",
    ] {
      let once = normalize(s);
      assert_eq!(normalize(&once), once);
    }
  }

  #[test]
  fn test_offsets_map_back_to_original() {
    let raw = "  Contains:\t\tMILK  (5%)";
    let norm = NormalizedText::new(raw);
    assert_eq!(norm.as_str(), "contains: milk (s%)");

    let start = norm.as_str().find("milk").unwrap();
    let range = norm.to_original(start..start + 4);
    assert_eq!(&raw[range], "MILK");

    let start = norm.as_str().find(": m").unwrap();
    let range = norm.to_original(start..start + 3);
    assert_eq!(&raw[range], ":\t\tM");
  }

  #[test]
  fn test_offsets_with_multibyte_chars() {
    let raw = "Sūris, ЯЙЦА";
    let norm = NormalizedText::new(raw);
    let start = norm.as_str().find("яйца").unwrap();
    let range = norm.to_original(start..start + "яйца".len());
    assert_eq!(&raw[range], "ЯЙЦА");
  }

  #[test]
  fn test_split_lines() {
    let lines: Vec<&str> = split_lines("a\r\n\r\n b \n\n  \nc").collect();
    assert_eq!(lines, vec!["a", " b ", "c"]);
    assert_eq!(split_lines("").count(), 0);
  }

  #[test]
  fn test_line_ranges_with_wide_breaks() {
    let text = "milk\u{2028}\u{2028}eggs\r\nsoy";
    let lines: Vec<&str> = line_ranges(text).map(|r| &text[r]).collect();
    assert_eq!(lines, vec!["milk", "eggs", "soy"]);
  }
}
