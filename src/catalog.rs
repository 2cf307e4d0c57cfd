//! 游戏库登记。
//!
//! 下载（和可选的解压）完成后，最终路径交给游戏库协作方建档。
//! 登记失败只记日志，不影响下载任务的 Completed 状态。

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::{DownloadError, DownloadResult};

/// 一条游戏库记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub id: Uuid,
    pub name: String,
    pub platform: Option<String>,
    /// 解压后的目录，或保持原样的归档文件
    pub file_path: PathBuf,
    pub source_download_dir: PathBuf,
    pub metadata: Option<serde_json::Value>,
    pub added_at: DateTime<Utc>,
}

/// 待登记的新条目
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub name: String,
    pub platform: Option<String>,
    pub file_path: PathBuf,
    pub source_download_dir: PathBuf,
    pub metadata: Option<serde_json::Value>,
}

/// 游戏库协作方接口
#[async_trait]
pub trait LibraryCatalog: Send + Sync {
    async fn register_entry(&self, entry: NewEntry) -> DownloadResult<LibraryEntry>;
}

/// 文件型游戏库：一个 JSON 数组，每次登记后整体重写
pub struct JsonCatalog {
    path: PathBuf,
    entries: Mutex<Vec<LibraryEntry>>,
}

impl JsonCatalog {
    pub fn open(path: impl Into<PathBuf>) -> DownloadResult<Self> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| DownloadError::CatalogFailed(format!("清单解析失败: {}", e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, entries: Mutex::new(entries) })
    }

    pub fn entries(&self) -> Vec<LibraryEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn persist(&self, entries: &[LibraryEntry]) -> DownloadResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| DownloadError::CatalogFailed(format!("清单序列化失败: {}", e)))?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

#[async_trait]
impl LibraryCatalog for JsonCatalog {
    async fn register_entry(&self, entry: NewEntry) -> DownloadResult<LibraryEntry> {
        let record = LibraryEntry {
            id: Uuid::new_v4(),
            name: entry.name,
            platform: entry.platform,
            file_path: entry.file_path,
            source_download_dir: entry.source_download_dir,
            metadata: entry.metadata,
            added_at: Utc::now(),
        };

        let mut entries = self
            .entries
            .lock()
            .map_err(|_| DownloadError::CatalogFailed("清单锁中毒".to_string()))?;
        entries.push(record.clone());
        self.persist(&entries)?;
        Ok(record)
    }
}

impl NewEntry {
    pub fn for_download(
        name: &str,
        platform: Option<String>,
        final_path: &Path,
        download_dir: &Path,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            name: name.to_string(),
            platform,
            file_path: final_path.to_path_buf(),
            source_download_dir: download_dir.to_path_buf(),
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry(name: &str) -> NewEntry {
        NewEntry {
            name: name.to_string(),
            platform: Some("SNES".to_string()),
            file_path: PathBuf::from("/roms/ct"),
            source_download_dir: PathBuf::from("/roms"),
            metadata: Some(serde_json::json!({"region": "USA"})),
        }
    }

    #[actix_rt::test]
    async fn test_register_and_reload() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let path = dir.path().join("library.json");

        let catalog = JsonCatalog::open(&path).expect("打开清单失败");
        let entry = catalog
            .register_entry(sample_entry("Chrono Trigger (USA)"))
            .await
            .expect("登记失败");
        assert_eq!(entry.name, "Chrono Trigger (USA)");
        assert_eq!(entry.platform.as_deref(), Some("SNES"));

        // 重新打开读到同一条记录
        let reopened = JsonCatalog::open(&path).expect("重新打开清单失败");
        let entries = reopened.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Chrono Trigger (USA)");
        assert_eq!(entries[0].metadata, Some(serde_json::json!({"region": "USA"})));
    }

    #[actix_rt::test]
    async fn test_missing_file_starts_empty() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let catalog = JsonCatalog::open(dir.path().join("none.json")).expect("打开清单失败");
        assert!(catalog.entries().is_empty());
    }

    #[actix_rt::test]
    async fn test_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let path = dir.path().join("deep").join("library.json");
        let catalog = JsonCatalog::open(&path).expect("打开清单失败");
        catalog.register_entry(sample_entry("A")).await.expect("登记失败");
        assert!(path.exists());
    }
}
