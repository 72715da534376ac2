// 该文件是 Shijian （食鉴） 项目的一部分。
// src/task.rs - 扫描任务
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
  fmt::Display,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread::{self, JoinHandle},
  time::Instant,
};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  allergen::{Lexicon, analyze},
  frame::{RgbNhwcFrame, RgbRegion},
  geometry::{CropRect, Detection},
  model::{ConfigError, DecodeError, DetectorConfig, Model, decode_with, suppress},
  report::{DetectionStatus, ReportBuilder, ScanRecord, ScanReport},
  store::{ScanStore, StoreError},
  text::ingredients::merge_ocr_texts,
};

/// 文字识别引擎
pub trait TextExtractor: Send + Sync {
  type Error: Display;

  fn extract(&self, region: &RgbRegion) -> Result<String, Self::Error>;
}

#[derive(Error, Debug)]
pub enum ScanError {
  #[error("扫描已取消")]
  Cancelled,
  #[error("检测参数错误: {0}")]
  Config(#[from] ConfigError),
  #[error("模型输出解码失败: {0}")]
  Decode(#[from] DecodeError),
  #[error("模型推理失败: {0}")]
  Inference(String),
}

/// 一次扫描：检测 -> 各区域文字识别 -> 合并 -> 过敏原分析 -> 报告
pub struct ScanTask<M, X> {
  model: M,
  extractor: X,
  config: DetectorConfig,
  lexicon: Option<Arc<Lexicon>>,
  cancel: Arc<AtomicBool>,
}

impl<M, X> ScanTask<M, X> {
  pub fn new(model: M, extractor: X) -> Self {
    Self {
      model,
      extractor,
      config: DetectorConfig::default(),
      lexicon: None,
      cancel: Arc::new(AtomicBool::new(false)),
    }
  }

  pub fn with_config(mut self, config: DetectorConfig) -> Self {
    self.config = config;
    self
  }

  pub fn with_lexicon(mut self, lexicon: Arc<Lexicon>) -> Self {
    self.lexicon = Some(lexicon);
    self
  }

  pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
    self.cancel = cancel;
    self
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  /// 未指定词库时使用内置词库
  pub fn lexicon(&self) -> &Lexicon {
    match &self.lexicon {
      Some(lexicon) => lexicon.as_ref(),
      None => Lexicon::builtin(),
    }
  }

  /// 置位后，扫描会在下一次调用外部引擎之前停止
  pub fn cancel_flag(&self) -> Arc<AtomicBool> {
    self.cancel.clone()
  }

  fn check_cancelled(&self) -> Result<(), ScanError> {
    if self.cancel.load(Ordering::SeqCst) {
      warn!("扫描被取消");
      return Err(ScanError::Cancelled);
    }
    Ok(())
  }

  /// 只分析已经识别出的文字，不执行检测
  pub fn analyze_text(&self, text: &str) -> ScanReport {
    let hits = analyze(text, self.lexicon());
    ReportBuilder::new()
      .with_detection_status(DetectionStatus::Skipped)
      .build(text, hits, Vec::new())
  }

  /// 在后台线程写入记录，调用方可以不等待返回的句柄
  pub fn persist<S>(
    &self,
    store: Arc<S>,
    report: &ScanReport,
    image_ref: Option<String>,
  ) -> JoinHandle<Result<u64, StoreError>>
  where
    S: ScanStore + ?Sized + 'static,
  {
    persist_in_background(store, report.record(image_ref, Utc::now()))
  }
}

/// 启动一个线程写入记录并立即返回
pub fn persist_in_background<S>(store: Arc<S>, record: ScanRecord) -> JoinHandle<Result<u64, StoreError>>
where
  S: ScanStore + ?Sized + 'static,
{
  thread::spawn(move || {
    let id = store.insert(&record)?;
    info!("扫描记录已保存, 编号 {}", id);
    Ok(id)
  })
}

fn extract_or_empty<X: TextExtractor>(
  extractor: &X,
  cancel: &AtomicBool,
  index: usize,
  region: &RgbRegion,
) -> String {
  if cancel.load(Ordering::SeqCst) {
    return String::new();
  }
  match extractor.extract(region) {
    Ok(text) => text,
    Err(e) => {
      warn!("区域 {} 文字识别失败, 按空文本处理: {}", index, e);
      String::new()
    }
  }
}

impl<M, X, const W: u32, const H: u32> ScanTask<M, X>
where
  M: Model<Input = RgbNhwcFrame<W, H>>,
  M::Error: Display,
  X: TextExtractor,
{
  /// 推理、解码并做非极大值抑制
  pub fn detect(&self, frame: &RgbNhwcFrame<W, H>) -> Result<Vec<Detection>, ScanError> {
    self.config.validate_for_frame(W, H)?;
    self.check_cancelled()?;

    let now = Instant::now();
    let output = self
      .model
      .infer(frame)
      .map_err(|e| ScanError::Inference(e.to_string()))?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());

    let candidates = decode_with(&output, &self.config)?;
    let detections = suppress(&candidates, self.config.iou_threshold);
    info!(
      "检测到 {} 个区域 (抑制前 {} 个)",
      detections.len(),
      candidates.len()
    );
    Ok(detections)
  }

  pub fn run(&self, frame: &RgbNhwcFrame<W, H>) -> Result<ScanReport, ScanError> {
    info!("开始扫描...");
    let started = Instant::now();

    let (detections, status) = match self.detect(frame) {
      Ok(detections) if detections.is_empty() => (detections, DetectionStatus::NoRegions),
      Ok(detections) => (detections, DetectionStatus::Found),
      Err(e @ (ScanError::Cancelled | ScanError::Config(_))) => return Err(e),
      Err(e) => {
        warn!("检测失败, 仅识别整张图像: {}", e);
        (Vec::new(), DetectionStatus::Failed(e.to_string()))
      }
    };
    self.check_cancelled()?;

    let regions: Vec<RgbRegion> = detections
      .iter()
      .map(|det| frame.crop(&det.crop_rect(W, H)))
      .collect();
    let whole = frame
      .crop(&CropRect {
        x: 0,
        y: 0,
        width: W,
        height: H,
      })
      .enhanced();

    let now = Instant::now();
    let (extractor, cancel) = (&self.extractor, self.cancel.as_ref());
    let (crop_texts, full_text) = thread::scope(|s| {
      let handles: Vec<_> = regions
        .iter()
        .enumerate()
        .map(|(i, region)| {
          s.spawn(move || extract_or_empty(extractor, cancel, i, &region.enhanced()))
        })
        .collect();
      let full_text = extract_or_empty(extractor, cancel, regions.len(), &whole);
      let crop_texts: Vec<String> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap_or_default())
        .collect();
      (crop_texts, full_text)
    });
    info!(
      "文字识别完成 ({} 个区域)，耗时: {:.2?}",
      crop_texts.len(),
      now.elapsed()
    );
    self.check_cancelled()?;

    let merged = merge_ocr_texts(&crop_texts, &full_text);
    debug!("合并后的文本长度: {}", merged.len());
    let hits = analyze(&merged, self.lexicon());
    let report = ReportBuilder::new()
      .with_detection_status(status)
      .build(merged, hits, detections);

    info!(
      "扫描完成, {} 个过敏原, 总耗时: {:.2?}",
      report.hits.len(),
      started.elapsed()
    );
    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;
  use crate::{
    allergen::{AllergenCategory, LexiconBuilder},
    frame::OCR_UPSCALE,
    model::RawOutput,
    store::MemoryStore,
  };

  fn small_config() -> DetectorConfig {
    DetectorConfig::default().with_input_size(8)
  }

  struct NoModel;

  impl Model for NoModel {
    type Input = RgbNhwcFrame<8, 8>;
    type Error = String;

    fn infer(&self, _input: &Self::Input) -> Result<RawOutput, Self::Error> {
      Err("engine unavailable".to_string())
    }
  }

  /// 一个锚点 `[cx, cy, w, h, score]`
  struct OneBox([f32; 5]);

  impl Model for OneBox {
    type Input = RgbNhwcFrame<64, 64>;
    type Error = String;

    fn infer(&self, _input: &Self::Input) -> Result<RawOutput, Self::Error> {
      RawOutput::new([1, 5, 1], self.0.to_vec()).map_err(|e| e.to_string())
    }
  }

  struct FixedText(&'static str);

  impl TextExtractor for FixedText {
    type Error = String;

    fn extract(&self, _region: &RgbRegion) -> Result<String, Self::Error> {
      Ok(self.0.to_string())
    }
  }

  #[test]
  fn test_inference_failure_still_reads_full_image() {
    let task = ScanTask::new(NoModel, FixedText("Contains milk")).with_config(small_config());
    let report = task.run(&RgbNhwcFrame::default()).unwrap();
    assert!(matches!(report.detection_status, DetectionStatus::Failed(_)));
    assert!(report.detections.is_empty());
    assert_eq!(report.hits.len(), 1);
    assert_eq!(report.hits[0].category, AllergenCategory::Milk);
  }

  #[test]
  fn test_invalid_config_is_an_error() {
    let task = ScanTask::new(NoModel, FixedText(""))
      .with_config(small_config().with_confidence_threshold(2.0));
    assert!(matches!(
      task.run(&RgbNhwcFrame::default()),
      Err(ScanError::Config(_))
    ));
  }

  #[test]
  fn test_cancelled_before_start() {
    let task = ScanTask::new(NoModel, FixedText("milk")).with_config(small_config());
    task.cancel_flag().store(true, Ordering::SeqCst);
    assert!(matches!(
      task.run(&RgbNhwcFrame::default()),
      Err(ScanError::Cancelled)
    ));
  }

  #[test]
  fn test_analyze_text_and_persist() {
    let task = ScanTask::new(NoModel, FixedText(""));
    let report = task.analyze_text("may contain peanuts");
    assert_eq!(report.detection_status, DetectionStatus::Skipped);

    let store = Arc::new(MemoryStore::new());
    let id = task
      .persist(store.clone(), &report, Some("shelf.jpg".to_string()))
      .join()
      .unwrap()
      .unwrap();
    assert_eq!(id, 1);
    let rows = store.latest(1).unwrap();
    assert_eq!(rows[0].record.detected, vec!["peanut"]);
    assert_eq!(rows[0].record.image_ref.as_deref(), Some("shelf.jpg"));
  }

  #[test]
  fn test_input_size_must_match_frame() {
    let model = OneBox([0.75, 0.75, 0.5, 0.5, 0.9]);
    let task = ScanTask::new(model, FixedText("milk"));
    assert!(matches!(
      task.run(&RgbNhwcFrame::default()),
      Err(ScanError::Config(ConfigError::FrameSizeMismatch {
        input_size: 640,
        width: 64,
        height: 64
      }))
    ));

    let model = OneBox([0.75, 0.75, 0.5, 0.5, 0.9]);
    let task = ScanTask::new(model, FixedText("milk"))
      .with_config(DetectorConfig::default().with_input_size(64));
    let dets = task.detect(&RgbNhwcFrame::default()).unwrap();
    assert_eq!(dets.len(), 1);
    assert!((dets[0].x1() - 32.0).abs() < 1e-4);
    assert!((dets[0].x2() - 64.0).abs() < 1e-4);
  }

  /// 记录交给识别引擎的每个区域
  struct Recording(Mutex<Vec<RgbRegion>>);

  impl TextExtractor for Recording {
    type Error = String;

    fn extract(&self, region: &RgbRegion) -> Result<String, Self::Error> {
      self
        .0
        .lock()
        .map_err(|e| e.to_string())?
        .push(region.clone());
      Ok(String::new())
    }
  }

  #[test]
  fn test_regions_are_enhanced_before_ocr() {
    let model = OneBox([0.5, 0.5, 0.5, 0.25, 0.9]);
    let task = ScanTask::new(model, Recording(Mutex::new(Vec::new())))
      .with_config(DetectorConfig::default().with_input_size(64));
    let frame = RgbNhwcFrame::<64, 64>::try_from(vec![100u8; 64 * 64 * 3]).unwrap();
    let report = task.run(&frame).unwrap();
    assert_eq!(report.detection_status, DetectionStatus::Found);

    let mut seen = task.extractor.0.lock().unwrap().clone();
    seen.sort_by_key(|r| r.width * r.height);
    let sizes: Vec<(u32, u32)> = seen.iter().map(|r| (r.width, r.height)).collect();
    assert_eq!(
      sizes,
      vec![
        (32 * OCR_UPSCALE, 16 * OCR_UPSCALE),
        (64 * OCR_UPSCALE, 64 * OCR_UPSCALE)
      ]
    );
    // 灰度 100 经对比度与亮度调整后为 200
    assert!(seen.iter().all(|r| r.data.iter().all(|&v| v == 200)));
  }

  #[test]
  fn test_default_task_shares_builtin_lexicon() {
    let task = ScanTask::new(NoModel, FixedText(""));
    assert!(std::ptr::eq(task.lexicon(), Lexicon::builtin()));

    let custom = LexiconBuilder::new()
      .unwrap()
      .pattern(AllergenCategory::Celery, "latvian", "selerij\\p{L}*")
      .unwrap()
      .build();
    let task = task.with_lexicon(Arc::new(custom));
    assert!(!std::ptr::eq(task.lexicon(), Lexicon::builtin()));
    let report = task.analyze_text("selerijas sakne, milk");
    assert_eq!(report.hits.len(), 1);
    assert_eq!(report.hits[0].category, AllergenCategory::Celery);
  }
}
