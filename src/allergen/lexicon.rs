// 该文件是 Shijian （食鉴） 项目的一部分。
// src/allergen/lexicon.rs - 多语言过敏原词库
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

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::allergen::{AllergenCategory, DetectionPattern, Severity};

// 模式作用于归一化后的文本：数字 0 1 3 4 5 8 已被替换成 o l e a s b，
// 所以 E 编号按替换后的写法书写（E1105 -> ellos, E322 -> ee22）。
// 词干以 `\p{L}*` 结尾以匹配变格形式，词首仍受字母边界约束。
const BUILTIN_PATTERNS: &[(AllergenCategory, &[(&str, &str)])] = &[
  (
    AllergenCategory::Milk,
    &[
      ("milk", r"milk|pien\p{L}*|молок\p{L}*"),
      ("cheese", r"cheese|sier\p{L}*|sir|ser|sūri\p{L}*|suris|sieer"),
      ("lactose", r"lactose|lakto[zs]\p{L}*|лактоз\p{L}*"),
      ("casein", r"casein(at(e|s)?)?|kaze[iī]n\p{L}*|казеин\p{L}*"),
      ("whey", r"whey|sūkal\p{L}*|сыворот\p{L}*|išrūg\p{L}*"),
      ("butter", r"butter|sviest\p{L}*"),
      ("cream", r"cream|krēj\p{L}*|сливк\p{L}*|grietinėl\p{L}*"),
      ("yogurt", r"yogh?urt|jogurt\p{L}*|йогурт\p{L}*"),
    ],
  ),
  (
    AllergenCategory::Egg,
    &[
      ("egg", r"eggs?|olas?|kiauš\p{L}*|яйц\p{L}*"),
      ("albumin", r"(ov)?albumin"),
      ("lysozyme E1105", r"e-?llos"),
    ],
  ),
  (
    AllergenCategory::Fish,
    &[
      ("fish", r"fish|ziv[si]|zivju|žuv\p{L}*|рыб\p{L}*"),
      ("omega-3", r"omega[- ]?e"),
    ],
  ),
  (
    AllergenCategory::Crustaceans,
    &[
      (
        "crustaceans",
        r"crustace\p{L}*|vēžveid\p{L}*|vėžiagyv\p{L}*|ракообраз\p{L}*",
      ),
      ("shrimp/crab", r"shrimps?|krab\p{L}*|кревет\p{L}*|краб\p{L}*"),
    ],
  ),
  (
    AllergenCategory::Molluscs,
    &[
      (
        "molluscs",
        r"mollus[ck]\p{L}*|moliusk\p{L}*|моллюск\p{L}*|molu(sk|šķ)\p{L}*",
      ),
      ("mussel/squid", r"mussels?|clams?|squids?|octopus"),
    ],
  ),
  (
    AllergenCategory::Peanut,
    &[
      (
        "peanut",
        r"peanuts?|zemesriekst\p{L}*|žemės\s?riešut\p{L}*|арахис\p{L}*",
      ),
      ("peanut butter", r"peanut\s?butter|arahisa\s?sviests"),
    ],
  ),
  (
    AllergenCategory::TreeNuts,
    &[
      (
        "nuts",
        r"tree\s+nuts?|other\s+nuts?|riekst(i|u|us)?|riešut(ai|ų)?|орех(и|а|ов)?",
      ),
      ("almond", r"almonds?|mandeļ\p{L}*|mandel\p{L}*|migdol\p{L}*"),
      ("hazelnut", r"hazelnuts?|lazdu|lazdyn\p{L}*"),
      ("walnut", r"walnuts?|valriekst\p{L}*|graikinių"),
      ("cashew", r"cashews?|keš(u|j)\p{L}*|anakard\p{L}*"),
      ("pecan", r"pecans?"),
      ("pistachio", r"pistachios?|pistāc\p{L}*|pistacij\p{L}*"),
      ("macadamia", r"macadamia"),
      ("brazil nut", r"brazil\s+nuts?|brazīl\p{L}*"),
      ("nut paste", r"nut\s+paste|riekstu\s+pasta|riešutų\s+pasta"),
    ],
  ),
  (
    AllergenCategory::Soy,
    &[
      ("soy", r"soy(a|beans?)?|soy[- ]beans?|soj\p{L}*|со[йяи]\p{L}*|соев\p{L}*"),
      ("lecithin E322", r"lecithins?|lecit[iī]n\p{L}*|лецитин\p{L}*|e-?e22"),
    ],
  ),
  (
    AllergenCategory::Gluten,
    &[
      (
        "gluten",
        r"gluten|glutēn\p{L}*|глютен\p{L}*|glitim\p{L}*|bezglut\p{L}*|be\s?gli",
      ),
      ("barley", r"barley|miež\p{L}*|ячмен\p{L}*"),
      ("rye", r"rye|rud|rudz\p{L}*|рож\p{L}*|rugi\p{L}*"),
      ("oats", r"oats|auz\p{L}*|овс\p{L}*|aviž\p{L}*"),
      ("spelt", r"spelt(as)?|шпальт\p{L}*"),
      ("triticale", r"triticale|tritik\p{L}*"),
      ("durum", r"durum"),
      ("kamut", r"kamut"),
      ("malt", r"malt|iesal\p{L}*|солод\p{L}*|salykl\p{L}*"),
      ("semolina", r"semolina|mann[aā]?|манн\p{L}*"),
    ],
  ),
  (
    AllergenCategory::Wheat,
    &[("wheat", r"wheat|kvieš\p{L}*|kvieč\p{L}*|пшен\p{L}*")],
  ),
  (
    AllergenCategory::Sesame,
    &[
      ("sesame", r"sesame|sezam\p{L}*|кунжут\p{L}*"),
      ("tahini", r"tahini?"),
    ],
  ),
  (
    AllergenCategory::Celery,
    &[("celery", r"celery|seler\p{L}*|salier\p{L}*|сельдере\p{L}*")],
  ),
  (
    AllergenCategory::Mustard,
    &[("mustard", r"mustard|sinep\p{L}*|garstyč\p{L}*|горчиц\p{L}*")],
  ),
  (
    AllergenCategory::Lupin,
    &[("lupin", r"lupins?|lupīn\p{L}*|lubin\p{L}*|люпин\p{L}*")],
  ),
  (
    AllergenCategory::Sulphites,
    &[
      (
        "sulphites",
        r"sulphit\p{L}*|sulfit\p{L}*|sulfīt\p{L}*|сульфит\p{L}*",
      ),
      // E220-E228
      ("E220-E228", r"e-?22[ol2eas67b]"),
    ],
  ),
];

const CONTAINS_MARKER: &str = r"contains|satur|содержит|sudėtyje\s+yra|sadrži|zawiera";
const MAY_CONTAIN_MARKER: &str = r"may\s+contain|var\s+saturēt|может\s+содержать|gali\s+būti|može\s+sadržavati|może\s+zawierać";
const TRACE_MARKER: &str = r"traces?|pēdas|следы|pėdsak(ai|ų)|sl(ij)ed|ślady";

static BUILTIN: Lazy<Lexicon> = Lazy::new(|| {
  let lexicon = LexiconBuilder::with_builtin()
    .expect("built-in allergen patterns are valid")
    .build();
  info!(
    "内置过敏原词库加载完成: {} 个类别, {} 个模式",
    lexicon.categories.len(),
    lexicon.pattern_count()
  );
  lexicon
});

#[derive(Error, Debug)]
pub enum LexiconError {
  #[error("模式无效 ({alias}): {source}")]
  InvalidPattern {
    alias: String,
    #[source]
    source: regex::Error,
  },
  #[error("未知的过敏原类别: {0}")]
  UnknownCategory(String),
  #[error("词库扩展 JSON 格式错误: {0}")]
  Json(#[from] serde_json::Error),
}

/// 判断一行文字声明强度的三组短语
#[derive(Debug, Clone)]
pub struct SeverityMarkers {
  contains: DetectionPattern,
  may_contain: DetectionPattern,
  trace: DetectionPattern,
}

impl SeverityMarkers {
  fn builtin() -> Result<Self, LexiconError> {
    Ok(Self {
      contains: compile("contains", CONTAINS_MARKER)?,
      may_contain: compile("may contain", MAY_CONTAIN_MARKER)?,
      trace: compile("trace", TRACE_MARKER)?,
    })
  }

  /// 按固定优先级判断：含有 > 可能含有 > 微量 > 仅提及
  pub fn classify(&self, normalized_line: &str) -> Severity {
    if self.contains.is_match(normalized_line) {
      Severity::Contains
    } else if self.may_contain.is_match(normalized_line) {
      Severity::MayContain
    } else if self.trace.is_match(normalized_line) {
      Severity::Trace
    } else {
      Severity::Mentioned
    }
  }
}

fn compile(alias: &str, pattern: &str) -> Result<DetectionPattern, LexiconError> {
  DetectionPattern::new(alias, pattern).map_err(|source| LexiconError::InvalidPattern {
    alias: alias.to_string(),
    source,
  })
}

/// 类别 -> 有序模式列表，以及声明强度短语
#[derive(Debug, Clone)]
pub struct Lexicon {
  categories: Vec<(AllergenCategory, Vec<DetectionPattern>)>,
  markers: SeverityMarkers,
}

impl Lexicon {
  /// 进程内共享的只读内置词库
  pub fn builtin() -> &'static Lexicon {
    &BUILTIN
  }

  pub fn iter(&self) -> impl Iterator<Item = (AllergenCategory, &[DetectionPattern])> {
    self
      .categories
      .iter()
      .map(|(category, patterns)| (*category, patterns.as_slice()))
  }

  pub fn patterns(&self, category: AllergenCategory) -> &[DetectionPattern] {
    self
      .categories
      .iter()
      .find(|(c, _)| *c == category)
      .map(|(_, patterns)| patterns.as_slice())
      .unwrap_or(&[])
  }

  pub fn markers(&self) -> &SeverityMarkers {
    &self.markers
  }

  pub fn pattern_count(&self) -> usize {
    self.categories.iter().map(|(_, p)| p.len()).sum()
  }
}

#[derive(Deserialize)]
struct PatternEntry {
  alias: String,
  pattern: String,
}

pub struct LexiconBuilder {
  categories: Vec<(AllergenCategory, Vec<DetectionPattern>)>,
  markers: SeverityMarkers,
}

impl LexiconBuilder {
  /// 只有声明强度短语、没有任何类别模式的空词库
  pub fn new() -> Result<Self, LexiconError> {
    Ok(Self {
      categories: Vec::new(),
      markers: SeverityMarkers::builtin()?,
    })
  }

  pub fn with_builtin() -> Result<Self, LexiconError> {
    let mut builder = Self::new()?;
    for (category, patterns) in BUILTIN_PATTERNS {
      for (alias, pattern) in patterns.iter() {
        builder = builder.pattern(*category, alias, pattern)?;
      }
    }
    Ok(builder)
  }

  /// 在类别末尾追加一个模式，类别不存在时新建
  pub fn pattern(
    mut self,
    category: AllergenCategory,
    alias: &str,
    pattern: &str,
  ) -> Result<Self, LexiconError> {
    let compiled = compile(alias, pattern)?;
    match self.categories.iter_mut().find(|(c, _)| *c == category) {
      Some((_, patterns)) => patterns.push(compiled),
      None => self.categories.push((category, vec![compiled])),
    }
    Ok(self)
  }

  /// 追加 JSON 描述的模式：`{"milk": [{"alias": "...", "pattern": "..."}]}`
  pub fn extend_from_json(mut self, json: &str) -> Result<Self, LexiconError> {
    let entries: BTreeMap<String, Vec<PatternEntry>> = serde_json::from_str(json)?;
    for (name, patterns) in entries {
      let category =
        AllergenCategory::from_name(&name).ok_or_else(|| LexiconError::UnknownCategory(name))?;
      for entry in patterns {
        debug!("扩展词库: {} <- {}", category, entry.alias);
        self = self.pattern(category, &entry.alias, &entry.pattern)?;
      }
    }
    Ok(self)
  }

  pub fn build(self) -> Lexicon {
    Lexicon {
      categories: self.categories,
      markers: self.markers,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::text::normalize;

  fn hits_category(category: AllergenCategory, raw: &str) -> bool {
    let line = normalize(raw);
    Lexicon::builtin()
      .patterns(category)
      .iter()
      .any(|p| p.is_match(&line))
  }

  #[test]
  fn test_builtin_covers_all_categories() {
    let lexicon = Lexicon::builtin();
    for category in AllergenCategory::ALL {
      assert!(
        !lexicon.patterns(category).is_empty(),
        "{} has no patterns",
        category
      );
    }
    assert_eq!(lexicon.iter().count(), AllergenCategory::ALL.len());
  }

  #[test]
  fn test_multilingual_terms() {
    assert!(hits_category(AllergenCategory::Milk, "Piens 3,2%"));
    assert!(hits_category(AllergenCategory::Milk, "МОЛОКО цельное"));
    assert!(hits_category(AllergenCategory::Milk, "sūris"));
    assert!(hits_category(AllergenCategory::Egg, "kiaušiniai"));
    assert!(hits_category(AllergenCategory::Peanut, "žemės riešutai"));
    assert!(hits_category(AllergenCategory::TreeNuts, "lazdyno riešutai"));
    assert!(hits_category(AllergenCategory::TreeNuts, "Орехи"));
    assert!(hits_category(AllergenCategory::Wheat, "kviešu milti"));
    assert!(hits_category(AllergenCategory::Sesame, "sezama sēklas, sezam"));
    assert!(!hits_category(AllergenCategory::Milk, "buttermilk"));
    assert!(!hits_category(AllergenCategory::TreeNuts, "riekstiņi"));
  }

  #[test]
  fn test_e_numbers_survive_normalization() {
    assert!(hits_category(AllergenCategory::Egg, "lysozyme (E1105)"));
    assert!(hits_category(AllergenCategory::Soy, "emulsifier E322"));
    assert!(hits_category(AllergenCategory::Sulphites, "preservative: E-224"));
    assert!(hits_category(AllergenCategory::Sulphites, "E220"));
    assert!(!hits_category(AllergenCategory::Sulphites, "E229"));
  }

  #[test]
  fn test_ocr_noise_is_tolerated() {
    assert!(hits_category(AllergenCategory::Milk, "MI1K"));
    assert!(hits_category(AllergenCategory::Soy, "5OYA"));
    assert!(hits_category(AllergenCategory::Egg, "€GGS"));
  }

  #[test]
  fn test_markers_priority() {
    let markers = Lexicon::builtin().markers();
    assert_eq!(markers.classify("contains milk"), Severity::Contains);
    assert_eq!(
      markers.classify("may contain traces of nuts"),
      Severity::MayContain
    );
    assert_eq!(markers.classify("traces of nuts"), Severity::Trace);
    assert_eq!(markers.classify("var saturēt riekstus"), Severity::MayContain);
    assert_eq!(markers.classify("satur pienu"), Severity::Contains);
    assert_eq!(markers.classify("может содержать следы"), Severity::MayContain);
    assert_eq!(markers.classify("milk chocolate"), Severity::Mentioned);
    assert_eq!(
      markers.classify("contains: milk. may contain nuts"),
      Severity::Contains
    );
  }

  #[test]
  fn test_extend_from_json() {
    let lexicon = LexiconBuilder::with_builtin()
      .unwrap()
      .extend_from_json(r#"{"milk": [{"alias": "german milk", "pattern": "milch"}]}"#)
      .unwrap()
      .build();
    let patterns = lexicon.patterns(AllergenCategory::Milk);
    assert_eq!(patterns.last().unwrap().alias(), "german milk");
    assert!(patterns.iter().any(|p| p.is_match("vollmilch milch")));
    assert_eq!(lexicon.iter().count(), AllergenCategory::ALL.len());
  }

  #[test]
  fn test_extend_rejects_bad_input() {
    let err = LexiconBuilder::new()
      .unwrap()
      .extend_from_json(r#"{"chocolate": [{"alias": "x", "pattern": "x"}]}"#);
    assert!(matches!(err, Err(LexiconError::UnknownCategory(_))));

    let err = LexiconBuilder::new()
      .unwrap()
      .extend_from_json(r#"{"milk": [{"alias": "broken", "pattern": "(milk"}]}"#);
    assert!(matches!(err, Err(LexiconError::InvalidPattern { .. })));

    let err = LexiconBuilder::new().unwrap().extend_from_json("[1, 2]");
    assert!(matches!(err, Err(LexiconError::Json(_))));
  }
}
