// 该文件是 Shijian （食鉴） 项目的一部分。
// src/bin/scan.rs - 配料表扫描命令行
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

use std::{
  io::Read,
  ops::Range,
  path::{Path, PathBuf},
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

use shijian::{
  FromUrl,
  allergen::{Lexicon, LexiconBuilder, analyze},
  geometry::{Detection, Letterbox},
  model::{
    DetectorConfig, RawOutput, YOLO8_ANCHORS, YOLO8_CHANNELS, YOLO8_CONFIDENCE_THRESH,
    YOLO8_INPUT_SIZE, YOLO8_IOU_THRESH, decode_with, suppress,
  },
  report::{DetectionStatus, ReportBuilder, ScanReport},
  store::StoreWrapper,
  task::persist_in_background,
};

/// Shijian 配料表扫描参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 识别出的配料表文字文件，`-` 表示标准输入
  #[arg(value_name = "TEXT", required = true)]
  pub text: Vec<PathBuf>,
  /// 模型原始输出（小端 f32，形状 [1, 5, N]）
  #[arg(long, value_name = "TENSOR")]
  pub tensor: Option<PathBuf>,
  /// 原图宽度，与 --source-height 一起给出时检测框换算回原图坐标
  #[arg(long, value_name = "WIDTH", requires = "source_height")]
  pub source_width: Option<u32>,
  /// 原图高度
  #[arg(long, value_name = "HEIGHT", requires = "source_width")]
  pub source_height: Option<u32>,
  #[arg(long, default_value_t = YOLO8_CONFIDENCE_THRESH)]
  pub confidence: f32,
  #[arg(long, default_value_t = YOLO8_IOU_THRESH)]
  pub iou: f32,
  #[arg(long, default_value_t = YOLO8_INPUT_SIZE)]
  pub input_size: u32,
  #[arg(long, default_value_t = YOLO8_ANCHORS)]
  pub anchors: usize,
  /// 词库扩展 JSON 文件
  #[arg(long, value_name = "JSON")]
  pub lexicon: Option<PathBuf>,
  /// 扫描记录存储，例如 folder:///var/lib/shijian
  #[arg(long, value_name = "STORE")]
  pub store: Option<Url>,
  /// 记录中保存的图像引用
  #[arg(long, value_name = "IMAGE")]
  pub image_ref: Option<String>,
  /// 以 JSON 输出
  #[arg(long)]
  pub json: bool,
}

#[derive(Serialize)]
struct JsonOutput<'a> {
  source: String,
  report: &'a ScanReport,
  /// UTF-8 字节区间
  highlights: Vec<Range<usize>>,
  /// 字符区间
  char_highlights: Vec<Range<usize>>,
}

fn read_text(path: &Path) -> Result<String> {
  if path.as_os_str() == "-" {
    let mut text = String::new();
    std::io::stdin().read_to_string(&mut text)?;
    return Ok(text);
  }
  std::fs::read_to_string(path).with_context(|| format!("无法读取文字文件 {}", path.display()))
}

fn build_lexicon(path: Option<&Path>) -> Result<Lexicon> {
  let builder = LexiconBuilder::with_builtin()?;
  let builder = match path {
    Some(path) => {
      info!("加载词库扩展: {}", path.display());
      let json = std::fs::read_to_string(path)?;
      builder.extend_from_json(&json)?
    }
    None => builder,
  };
  let lexicon = builder.build();
  info!("词库共 {} 个模式", lexicon.pattern_count());
  Ok(lexicon)
}

fn detect(path: &Path, config: &DetectorConfig) -> Result<Vec<Detection>> {
  let bytes = std::fs::read(path)?;
  let data: Vec<f32> = bytes
    .chunks_exact(4)
    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    .collect();
  let anchors = data.len() / YOLO8_CHANNELS;
  let output = RawOutput::new([1, YOLO8_CHANNELS, anchors], data)?;
  let candidates = decode_with(&output, config)?;
  Ok(suppress(&candidates, config.iou_threshold))
}

fn print_report(source: &str, report: &ScanReport, lexicon: &Lexicon, json: bool) -> Result<()> {
  if json {
    let output = JsonOutput {
      source: source.to_string(),
      report,
      highlights: report.highlights(lexicon),
      char_highlights: report.char_highlights(lexicon),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    return Ok(());
  }

  println!("== {} ==", source);
  match &report.detection_status {
    DetectionStatus::Found => {
      println!("Regions: {}", report.detections.len());
      for det in &report.detections {
        println!(
          "  ({:.1}, {:.1}) - ({:.1}, {:.1})  {:.2}",
          det.x1(),
          det.y1(),
          det.x2(),
          det.y2(),
          det.score()
        );
      }
    }
    DetectionStatus::NoRegions => println!("Regions: none found"),
    DetectionStatus::Failed(reason) => println!("Regions: detection failed ({})", reason),
    DetectionStatus::Skipped => {}
  }
  println!("{}\n", report.render_text());
  Ok(())
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  let config = DetectorConfig::default()
    .with_input_size(args.input_size)
    .with_anchors(args.anchors)
    .with_confidence_threshold(args.confidence)
    .with_iou_threshold(args.iou);
  config.validate()?;
  info!("检测参数: {:?}", config);

  let lexicon = build_lexicon(args.lexicon.as_deref())?;
  let store = match &args.store {
    Some(url) => {
      info!("扫描记录存储: {}", url);
      Some(Arc::new(StoreWrapper::from_url(url)?))
    }
    None => None,
  };

  let cancel = Arc::new(AtomicBool::new(false));
  {
    let cancel = cancel.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，处理完当前文件后退出...");
      cancel.store(true, Ordering::SeqCst);
    })?;
  }

  let (detections, status) = match &args.tensor {
    Some(path) => match detect(path, &config) {
      Ok(detections) if detections.is_empty() => (detections, DetectionStatus::NoRegions),
      Ok(detections) => (detections, DetectionStatus::Found),
      Err(e) => {
        warn!("检测失败: {:#}", e);
        (Vec::new(), DetectionStatus::Failed(format!("{:#}", e)))
      }
    },
    None => (Vec::new(), DetectionStatus::Skipped),
  };
  let detections = match (args.source_width, args.source_height) {
    (Some(w), Some(h)) => {
      let letterbox = Letterbox::fit(w, h, config.input_size);
      detections.iter().map(|d| letterbox.to_source(d)).collect()
    }
    _ => detections,
  };

  let mut persisted = Vec::new();
  for path in &args.text {
    if cancel.load(Ordering::SeqCst) {
      warn!("中断信号接收，停止扫描");
      break;
    }

    let source = path.display().to_string();
    let text = read_text(path)?;
    let hits = analyze(&text, &lexicon);
    let report = ReportBuilder::new()
      .with_detection_status(status.clone())
      .build(text, hits, detections.clone());
    info!("{}: {} 个过敏原", source, report.hits.len());
    print_report(&source, &report, &lexicon, args.json)?;

    if let Some(store) = &store {
      let record = report.record(
        args.image_ref.clone().or_else(|| Some(source.clone())),
        chrono::Utc::now(),
      );
      persisted.push(persist_in_background(store.clone(), record));
    }
  }

  for handle in persisted {
    match handle.join() {
      Ok(Ok(_)) => {}
      Ok(Err(e)) => warn!("保存扫描记录失败: {}", e),
      Err(_) => warn!("保存线程异常退出"),
    }
  }

  Ok(())
}
