//! 归档分类与解压接口。
//!
//! 分类按扩展名：常见压缩包进允许名单，光盘镜像和裸 ROM 格式进保持原样
//! 名单——那些文件本身就是要进模拟器的，拆开反而毁了。
//! 解压器是个外部协作方：内置实现只认 zip，其余格式返回错误，
//! 引擎据此保留原始文件并照常登记。

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::core::error::{DownloadError, DownloadResult};

/// 下载完成后应当解压的归档格式
pub const ARCHIVE_EXTENSIONS: &[&str] =
    &["zip", "7z", "rar", "tar", "gz", "tgz", "bz2", "xz", "zst"];

/// 必须保持原样的格式：光盘镜像和各平台裸 ROM
pub const KEEP_INTACT_EXTENSIONS: &[&str] = &[
    "iso", "bin", "cue", "img", "mdf", "nrg", "chd", "gcm", "wbfs", "cso", "pbp", "rvz", "wua",
    "nds", "3ds", "cia", "xci", "nsp", "gba", "gb", "gbc", "nes", "sfc", "smc", "n64", "z64",
    "v64", "gen", "md",
];

/// 按扩展名判断文件是否应当解压
pub fn is_extractable_archive(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    if KEEP_INTACT_EXTENSIONS.contains(&ext.as_str()) {
        return false;
    }
    ARCHIVE_EXTENSIONS.contains(&ext.as_str())
}

/// 解压协作方接口。
/// `extract` 失败不是致命错误：引擎记一条日志，保留原始文件并照常登记。
#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    fn should_extract(&self, path: &Path) -> bool {
        is_extractable_archive(path)
    }

    /// 解压到目标目录，返回最终登记用的路径
    async fn extract(&self, archive: &Path, dest_dir: &Path) -> DownloadResult<PathBuf>;
}

/// 内置 zip 解压器
pub struct ZipExtractor;

#[async_trait]
impl ArchiveExtractor for ZipExtractor {
    async fn extract(&self, archive: &Path, dest_dir: &Path) -> DownloadResult<PathBuf> {
        let ext = archive
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if ext != "zip" {
            return Err(DownloadError::ExtractionFailed(format!(
                "内置解压器不支持 .{} 格式",
                ext
            )));
        }

        let archive = archive.to_path_buf();
        let dest = dest_dir.to_path_buf();
        tokio::task::spawn_blocking(move || -> DownloadResult<PathBuf> {
            std::fs::create_dir_all(&dest)?;
            let file = std::fs::File::open(&archive)?;
            let mut zip = zip::ZipArchive::new(file)
                .map_err(|e| DownloadError::ExtractionFailed(e.to_string()))?;
            zip.extract(&dest)
                .map_err(|e| DownloadError::ExtractionFailed(e.to_string()))?;
            Ok(dest)
        })
        .await
        .map_err(|e| DownloadError::ExtractionFailed(format!("解压线程异常: {}", e)))?
    }
}
