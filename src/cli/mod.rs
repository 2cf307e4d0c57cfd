//! CLI: 命令行接口和参数解析
//!
//! - 基本下载：`romdown <url>`
//! - 批量下载：`romdown -f urls.txt`
//! - 命名与平台标签：`romdown -n "Chrono Trigger (USA)" -p SNES <url>`
//! - 编辑配置：`romdown -e`
//!
//! 配置文件路径：
//! - Windows: `%APPDATA%/romdown/romdown.conf`
//! - macOS: `~/Library/Application Support/romdown/romdown.conf`
//! - Linux: `~/.config/romdown/romdown.conf`

use std::env;
use std::fs;
use std::path::Path;

use clap::Parser;

use crate::config::Settings;
use crate::core::error::DownloadError;
use crate::core::task::state::{RomMeta, StrategyHint};
use crate::utils::validator;

/// 获取平台默认配置文件路径
pub fn default_config_path() -> String {
    #[cfg(target_os = "windows")]
    {
        let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        format!("{}/romdown/romdown.conf", appdata)
    }
    #[cfg(target_os = "macos")]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/Library/Application Support/romdown/romdown.conf", home)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/.config/romdown/romdown.conf", home)
    }
}

/// 用系统编辑器打开配置文件
pub fn open_config_in_editor(config_path: &str) {
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("notepad").arg(config_path).status().ok();
    }
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg("-e").arg(config_path).status().ok();
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        if std::process::Command::new("xdg-open").arg(config_path).status().is_err() {
            let _ = std::process::Command::new("nano").arg(config_path).status();
        }
    }
}

/// romdown 命令行参数
///
/// 示例：
///   romdown https://example.com/game.zip
///   romdown -n "Chrono Trigger (USA)" -p SNES https://example.com/ct.zip
///   romdown -f urls.txt -t 8
#[derive(Parser, Debug, Clone)]
#[command(
    name = "romdown",
    version = env!("CARGO_PKG_VERSION"),
    about = "一个用 Rust 编写的游戏 ROM 归档下载与整理工具",
    long_about = "支持分块并发下载、断点续传、自动解压归档和游戏库登记。\n\n示例：\n  romdown https://example.com/game.zip\n  romdown -n \"Chrono Trigger (USA)\" -p SNES https://example.com/ct.zip\n  romdown -f urls.txt -t 8\n"
)]
pub struct Args {
    /// 要下载的URL列表（可同时指定多个）
    #[arg(required = false, help = "要下载的URL列表，可以同时指定多个URL。")]
    pub urls: Vec<String>,

    /// 包含URL列表的文件路径，每行一个URL
    #[arg(short, long, help = "包含URL列表的文件路径，每行一个URL，# 开头的行是注释。")]
    pub file: Option<String>,

    /// 配置文件路径
    #[arg(short = 'c', long, default_value_t = default_config_path(), help = "配置文件路径，默认为平台推荐路径。")]
    pub config: String,

    /// 编辑配置文件并退出
    #[arg(short = 'e', long = "edit", help = "用系统默认编辑器打开配置文件并退出。")]
    pub edit_config: bool,

    /// 下载目录（覆盖配置文件）
    #[arg(short = 'd', long, default_value_t = String::new(), help = "指定下载目录，覆盖配置文件中的设置。")]
    pub download_dir: String,

    /// 展示名（只对单个URL生效），决定输出文件名和解压目录名
    #[arg(short = 'n', long, help = "展示名，决定输出文件名和解压目录名，只对单个URL生效。")]
    pub name: Option<String>,

    /// 平台标签，登记进游戏库
    #[arg(short = 'p', long, help = "平台标签（如 SNES、PSX），登记游戏库时使用。")]
    pub platform: Option<String>,

    /// 分块线程数（覆盖配置文件）
    #[arg(short = 't', long, help = "分块线程数，覆盖配置文件中的设置。")]
    pub thread_count: Option<usize>,

    /// 强制单流下载
    #[arg(long, help = "强制单流下载，即便服务器支持 Range。")]
    pub single_stream: bool,

    /// 本次运行跳过解压
    #[arg(long, help = "下载完成后不解压归档。")]
    pub no_extract: bool,
}

impl Args {
    /// 解析命令行并加载配置；命令行参数覆盖配置文件
    pub fn parse_args() -> Result<(Self, Settings), DownloadError> {
        let args = Args::parse();

        if args.edit_config {
            open_config_in_editor(&args.config);
            std::process::exit(0);
        }

        let mut settings = Settings::load(&args.config)?;
        settings.merge_from_args(&args);
        if let Some(threads) = args.thread_count {
            validator::validate_thread_count(threads)
                .map_err(|e| DownloadError::ConfigError(e.to_string()))?;
        }
        settings.validate()?;

        Ok((args, settings))
    }

    /// 汇总命令行和文件里的URL，忽略空行和注释
    pub fn get_urls(&self) -> Result<Vec<String>, DownloadError> {
        let mut urls = Vec::new();
        urls.extend_from_slice(&self.urls);

        if let Some(file_path) = &self.file {
            if !Path::new(file_path).exists() {
                return Err(DownloadError::InvalidUrl(format!("URL文件不存在: {}", file_path)));
            }
            let content = fs::read_to_string(file_path)?;
            for line in content.lines() {
                let line = line.trim();
                if !line.is_empty() && !line.starts_with('#') {
                    urls.push(line.to_string());
                }
            }
        }

        for url in &urls {
            if !validator::is_valid_url(url) {
                return Err(DownloadError::InvalidUrl(url.clone()));
            }
        }
        if urls.is_empty() {
            return Err(DownloadError::InvalidUrl(
                "未提供任何URL。请通过命令行参数或文件提供至少一个URL。".to_string(),
            ));
        }
        Ok(urls)
    }

    pub fn strategy_hint(&self) -> StrategyHint {
        if self.single_stream {
            StrategyHint::SingleStream
        } else {
            StrategyHint::Auto
        }
    }

    /// 任务元数据；-n 只在单任务时生效，否则各任务按URL推断名字
    pub fn meta_for(&self, url: &str, batch: bool) -> RomMeta {
        let name = match (&self.name, batch) {
            (Some(name), false) => name.clone(),
            _ => validator::file_name_from_url(url).unwrap_or_default(),
        };
        RomMeta {
            name,
            platform: self.platform.clone(),
            extra: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = Args::try_parse_from(["romdown", "https://example.com/game.zip"]);
        assert!(args.is_ok());
        let args = args.expect("解析失败");
        assert_eq!(args.urls.len(), 1);
        assert!(!args.single_stream);
    }

    #[test]
    fn test_url_file_parsing() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let url_file = dir.path().join("urls.txt");
        fs::write(
            &url_file,
            "# 注释行\nhttps://example.com/a.zip\n\nhttps://example.com/b.zip\n",
        )
        .expect("写入URL文件失败");

        let args = Args::try_parse_from([
            "romdown",
            "-f",
            url_file.to_str().expect("路径编码失败"),
        ])
        .expect("解析失败");
        let urls = args.get_urls().expect("读取URL失败");
        assert_eq!(urls, vec![
            "https://example.com/a.zip".to_string(),
            "https://example.com/b.zip".to_string(),
        ]);
    }

    #[test]
    fn test_invalid_url_rejected() {
        let args = Args::try_parse_from(["romdown", "magnet:?xt=abc"]).expect("解析失败");
        assert!(args.get_urls().is_err());
    }

    #[test]
    fn test_no_urls_rejected() {
        let args = Args::try_parse_from(["romdown"]).expect("解析失败");
        assert!(args.get_urls().is_err());
    }

    #[test]
    fn test_strategy_hint() {
        let args = Args::try_parse_from(["romdown", "--single-stream", "https://a.com/x.zip"])
            .expect("解析失败");
        assert_eq!(args.strategy_hint(), StrategyHint::SingleStream);
    }

    #[test]
    fn test_meta_name_only_for_single_task() {
        let args = Args::try_parse_from([
            "romdown",
            "-n",
            "Chrono Trigger (USA)",
            "-p",
            "SNES",
            "https://example.com/ct.zip",
        ])
        .expect("解析失败");

        let single = args.meta_for("https://example.com/ct.zip", false);
        assert_eq!(single.name, "Chrono Trigger (USA)");
        assert_eq!(single.platform.as_deref(), Some("SNES"));

        // 批量下载时 -n 不生效，按 URL 推断
        let batched = args.meta_for("https://example.com/ct.zip", true);
        assert_eq!(batched.name, "ct.zip");
    }
}
