// 该文件是 Shijian （食鉴） 项目的一部分。
// src/store.rs - 扫描记录存储
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

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, report::ScanRecord};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::FolderStore;

/// 持久化扫描记录。实现需要能在后台线程中使用。
pub trait ScanStore: Send + Sync {
  /// 写入一条记录，返回记录编号
  fn insert(&self, record: &ScanRecord) -> Result<u64, StoreError>;

  /// 最近的若干条记录，按时间倒序（时间相同按编号倒序）
  fn latest(&self, limit: usize) -> Result<Vec<StoredScan>, StoreError>;
}

#[derive(Error, Debug)]
pub enum StoreError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("存储路径无效: {0}")]
  InvalidPath(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("记录格式错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("存储锁已失效")]
  Poisoned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredScan {
  pub id: u64,
  #[serde(flatten)]
  pub record: ScanRecord,
}

pub(crate) fn newest_first(rows: &mut [StoredScan]) {
  rows.sort_by(|a, b| {
    b.record
      .timestamp
      .cmp(&a.record.timestamp)
      .then_with(|| b.id.cmp(&a.id))
  });
}

/// 进程内存储，`memory://`
#[derive(Debug, Default)]
pub struct MemoryStore {
  rows: Mutex<Vec<StoredScan>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl FromUrlWithScheme for MemoryStore {
  const SCHEME: &'static str = "memory";
}

impl FromUrl for MemoryStore {
  type Error = StoreError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(StoreError::SchemeMismatch);
    }
    Ok(Self::new())
  }
}

impl ScanStore for MemoryStore {
  fn insert(&self, record: &ScanRecord) -> Result<u64, StoreError> {
    let mut rows = self.rows.lock().map_err(|_| StoreError::Poisoned)?;
    let id = rows.len() as u64 + 1;
    rows.push(StoredScan {
      id,
      record: record.clone(),
    });
    debug!("内存存储写入记录 {}", id);
    Ok(id)
  }

  fn latest(&self, limit: usize) -> Result<Vec<StoredScan>, StoreError> {
    let mut rows = self.rows.lock().map_err(|_| StoreError::Poisoned)?.clone();
    newest_first(&mut rows);
    rows.truncate(limit);
    Ok(rows)
  }
}

/// 根据 URL 方案选择存储
pub enum StoreWrapper {
  MemoryStore(MemoryStore),
  #[cfg(feature = "directory_record")]
  FolderStore(FolderStore),
}

impl FromUrl for StoreWrapper {
  type Error = StoreError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      MemoryStore::SCHEME => Ok(StoreWrapper::MemoryStore(MemoryStore::from_url(url)?)),
      #[cfg(feature = "directory_record")]
      FolderStore::SCHEME => Ok(StoreWrapper::FolderStore(FolderStore::from_url(url)?)),
      _ => Err(StoreError::SchemeMismatch),
    }
  }
}

impl ScanStore for StoreWrapper {
  fn insert(&self, record: &ScanRecord) -> Result<u64, StoreError> {
    match self {
      StoreWrapper::MemoryStore(store) => store.insert(record),
      #[cfg(feature = "directory_record")]
      StoreWrapper::FolderStore(store) => store.insert(record),
    }
  }

  fn latest(&self, limit: usize) -> Result<Vec<StoredScan>, StoreError> {
    match self {
      StoreWrapper::MemoryStore(store) => store.latest(limit),
      #[cfg(feature = "directory_record")]
      StoreWrapper::FolderStore(store) => store.latest(limit),
    }
  }
}
