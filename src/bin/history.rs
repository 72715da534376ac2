// 该文件是 Shijian （食鉴） 项目的一部分。
// src/bin/history.rs - 扫描历史查询
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

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use shijian::{
  FromUrl,
  store::{ScanStore, StoreWrapper},
};

const SNIPPET_CHARS: usize = 80;

/// Shijian 扫描历史参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 扫描记录存储，例如 folder:///var/lib/shijian
  #[arg(long, value_name = "STORE")]
  pub store: Url,
  /// 显示最近的记录条数
  #[arg(long, default_value_t = 50)]
  pub limit: usize,
  /// 以 JSON 输出
  #[arg(long)]
  pub json: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  info!("扫描记录存储: {}", args.store);

  let store = StoreWrapper::from_url(&args.store)?;
  let rows = store.latest(args.limit)?;
  info!("读取到 {} 条记录", rows.len());

  if args.json {
    println!("{}", serde_json::to_string_pretty(&rows)?);
    return Ok(());
  }

  for row in &rows {
    let record = &row.record;
    let snippet: String = record
      .ocr_text
      .split_whitespace()
      .collect::<Vec<_>>()
      .join(" ")
      .chars()
      .take(SNIPPET_CHARS)
      .collect();
    println!(
      "#{:<5} {}  {}",
      row.id,
      record.timestamp.format("%Y-%m-%d %H:%M"),
      record.detected_line()
    );
    if let Some(image) = &record.image_ref {
      println!("       {}", image);
    }
    if !snippet.is_empty() {
      println!("       {}", snippet);
    }
  }

  Ok(())
}
