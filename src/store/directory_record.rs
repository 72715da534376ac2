// 该文件是 Shijian （食鉴） 项目的一部分。
// src/store/directory_record.rs - 目录记录存储
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
  fs::{self, OpenOptions},
  io::{ErrorKind, Write},
  path::{Path, PathBuf},
  sync::Mutex,
};

use tracing::{debug, info, warn};

use crate::{
  FromUrl, FromUrlWithScheme,
  report::ScanRecord,
  store::{ScanStore, StoreError, StoredScan, newest_first},
};

const DEFAULT_FILE: &str = "scans.jsonl";

/// 以 JSON Lines 文件保存记录：`folder:///var/lib/shijian?file=scans.jsonl`
#[derive(Debug)]
pub struct FolderStore {
  file: PathBuf,
  lock: Mutex<()>,
}

impl FromUrlWithScheme for FolderStore {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for FolderStore {
  type Error = StoreError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(StoreError::SchemeMismatch);
    }

    let directory = urlencoding::decode(uri.path())
      .map_err(|e| StoreError::InvalidPath(e.to_string()))?;
    if directory.is_empty() {
      return Err(StoreError::InvalidPath(uri.to_string()));
    }

    let file = uri
      .query_pairs()
      .find(|(k, _)| k == "file")
      .map(|(_, v)| v.into_owned())
      .unwrap_or_else(|| DEFAULT_FILE.to_string());
    if file.is_empty() || file.contains('/') {
      return Err(StoreError::InvalidPath(file));
    }

    Ok(Self::new(Path::new(directory.as_ref()).join(file)))
  }
}

impl FolderStore {
  pub fn new(file: impl Into<PathBuf>) -> Self {
    Self {
      file: file.into(),
      lock: Mutex::new(()),
    }
  }

  pub fn file(&self) -> &Path {
    &self.file
  }

  fn read_all(&self) -> Result<Vec<StoredScan>, StoreError> {
    let content = match fs::read_to_string(&self.file) {
      Ok(content) => content,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(e.into()),
    };

    let mut rows = Vec::new();
    for (number, line) in content.lines().enumerate() {
      if line.trim().is_empty() {
        continue;
      }
      match serde_json::from_str::<StoredScan>(line) {
        Ok(row) => rows.push(row),
        Err(e) => warn!("跳过无法解析的记录 {}:{}: {}", self.file.display(), number + 1, e),
      }
    }
    Ok(rows)
  }
}

impl ScanStore for FolderStore {
  fn insert(&self, record: &ScanRecord) -> Result<u64, StoreError> {
    let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;

    if let Some(parent) = self.file.parent()
      && !parent.as_os_str().is_empty()
      && !parent.exists()
    {
      info!("创建记录目录: {}", parent.display());
      fs::create_dir_all(parent)?;
    }

    let id = self.read_all()?.iter().map(|row| row.id).max().unwrap_or(0) + 1;
    let line = serde_json::to_string(&StoredScan {
      id,
      record: record.clone(),
    })?;

    let mut file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(&self.file)?;
    writeln!(file, "{}", line)?;
    debug!("写入记录 {} 到 {}", id, self.file.display());
    Ok(id)
  }

  fn latest(&self, limit: usize) -> Result<Vec<StoredScan>, StoreError> {
    let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
    let mut rows = self.read_all()?;
    newest_first(&mut rows);
    rows.truncate(limit);
    Ok(rows)
  }
}

#[cfg(test)]
mod tests {
  use url::Url;

  use super::*;
  use crate::store::tests::record_at;

  #[test]
  fn test_from_url() {
    let url = Url::parse("folder:///var/lib/shijian?file=history.jsonl").unwrap();
    let store = FolderStore::from_url(&url).unwrap();
    assert_eq!(store.file(), Path::new("/var/lib/shijian/history.jsonl"));

    let url = Url::parse("folder:///tmp/label%20scans").unwrap();
    let store = FolderStore::from_url(&url).unwrap();
    assert_eq!(store.file(), Path::new("/tmp/label scans/scans.jsonl"));

    let url = Url::parse("memory://").unwrap();
    assert!(matches!(
      FolderStore::from_url(&url),
      Err(StoreError::SchemeMismatch)
    ));

    let url = Url::parse("folder:///tmp?file=../escape").unwrap();
    assert!(matches!(
      FolderStore::from_url(&url),
      Err(StoreError::InvalidPath(_))
    ));
  }

  #[test]
  fn test_insert_and_latest() {
    let dir = tempfile::tempdir().unwrap();
    let store = FolderStore::new(dir.path().join("nested").join("scans.jsonl"));
    assert!(store.latest(5).unwrap().is_empty());

    assert_eq!(store.insert(&record_at(10, &["milk"])).unwrap(), 1);
    assert_eq!(store.insert(&record_at(30, &["egg", "soy"])).unwrap(), 2);
    assert_eq!(store.insert(&record_at(20, &[])).unwrap(), 3);

    let rows = store.latest(2).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, 2);
    assert_eq!(rows[0].record.detected, vec!["egg", "soy"]);
    assert_eq!(rows[1].id, 3);
  }

  #[test]
  fn test_survives_reopen_and_bad_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scans.jsonl");
    FolderStore::new(&path)
      .insert(&record_at(10, &["milk"]))
      .unwrap();

    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    writeln!(file, "not json").unwrap();

    let store = FolderStore::new(&path);
    assert_eq!(store.insert(&record_at(5, &["fish"])).unwrap(), 2);
    let ids: Vec<u64> = store.latest(10).unwrap().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2]);
  }
}
