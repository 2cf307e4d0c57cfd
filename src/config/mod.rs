use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::DownloadError;
use crate::core::task::retry::RetryPolicy;

/// 配置结构体。
/// 引擎只在任务启动时读一次 `download_dir` 和 `thread_count`，运行中不回写。
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Settings {
    /// 默认下载目录
    pub download_dir: String,
    /// 每个任务的分块线程数
    pub thread_count: usize,
    /// 能力探测超时（秒）；正式传输不设总时限
    pub probe_timeout_secs: u64,
    /// User-Agent
    pub user_agent: String,
    /// 下载完成后是否尝试解压归档
    pub extract_archives: bool,
    /// 游戏库清单文件（相对 download_dir，或绝对路径）
    pub library_file: String,
    /// 单次传输内的重试次数
    pub retry_count: usize,
    /// 首次重试延迟（秒）
    pub retry_delay_secs: u64,
    /// 重试延迟上限（秒）
    pub retry_max_delay_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_dir: "./downloads".to_string(),
            thread_count: 8,
            probe_timeout_secs: 30,
            user_agent: "romdown/0.1".to_string(),
            extract_archives: true,
            library_file: "library.json".to_string(),
            retry_count: 3,
            retry_delay_secs: 1,
            retry_max_delay_secs: 60,
        }
    }
}

impl Settings {
    /// 加载配置文件；不存在或格式错误时落回默认值并重写文件
    pub fn load(path: &str) -> Result<Self, DownloadError> {
        if Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            match toml::from_str(&content) {
                Ok(settings) => Ok(settings),
                Err(e) => {
                    log::warn!("配置文件格式错误: {}，将使用默认配置", e);
                    let settings = Settings::default();
                    settings.save_with_tutorial(path)?;
                    Ok(settings)
                }
            }
        } else {
            let settings = Settings::default();
            settings.save_with_tutorial(path)?;
            Ok(settings)
        }
    }

    /// 保存带教程注释的配置文件
    pub fn save_with_tutorial(&self, path: &str) -> Result<(), DownloadError> {
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent)?;
        }
        let body = toml::to_string_pretty(self)
            .map_err(|e| DownloadError::ConfigError(format!("无法序列化配置: {}", e)))?;
        let content = format!("{}\n{}", Self::tutorial_header(), body);
        fs::write(path, content)?;
        Ok(())
    }

    fn tutorial_header() -> &'static str {
        r#"# romdown 配置文件
# ====================
#
# TOML 格式。命令行参数会覆盖这里的设置，优先级：命令行 > 配置文件 > 默认值。
#
# 配置项说明：
#
#   download_dir         默认下载目录，支持相对和绝对路径
#   thread_count         每个任务的分块线程数（服务器支持 Range 时生效），建议 2-16
#   probe_timeout_secs   启动前探测 Range 支持的超时秒数；传输本身不限时
#   user_agent           部分 ROM 站点要求特定 User-Agent
#   extract_archives     下载完成后自动解压归档（光盘镜像等格式始终保持原样）
#   library_file         游戏库清单文件，相对 download_dir 或绝对路径
#   retry_count          网络错误时单次传输内的重试次数
#   retry_delay_secs     首次重试延迟（秒），之后指数退避
#   retry_max_delay_secs 重试延迟上限（秒）
#
# 使用示例：
#   romdown https://example.com/game.zip
#   romdown -t 8 -d ~/roms https://example.com/game.zip
#   romdown -n "Chrono Trigger (USA)" -p SNES https://example.com/ct.zip
"#
    }

    /// 校验配置合法性
    pub fn validate(&self) -> Result<(), DownloadError> {
        if self.thread_count == 0 || self.thread_count > 64 {
            return Err(DownloadError::ConfigError("线程数必须在 1-64 之间".to_string()));
        }
        if self.download_dir.is_empty() {
            return Err(DownloadError::ConfigError("下载目录不能为空".to_string()));
        }
        if self.probe_timeout_secs == 0 {
            return Err(DownloadError::ConfigError("探测超时必须大于0".to_string()));
        }
        if self.user_agent.is_empty() {
            return Err(DownloadError::ConfigError("User-Agent 不能为空".to_string()));
        }
        if self.library_file.is_empty() {
            return Err(DownloadError::ConfigError("游戏库清单文件不能为空".to_string()));
        }
        Ok(())
    }

    /// 合并命令行参数（命令行优先）
    pub fn merge_from_args(&mut self, args: &crate::cli::Args) {
        if !args.download_dir.is_empty() {
            self.download_dir = args.download_dir.clone();
        }
        if let Some(thread_count) = args.thread_count {
            self.thread_count = thread_count;
        }
        if args.no_extract {
            self.extract_archives = false;
        }
    }

    /// 游戏库清单的完整路径
    pub fn library_path(&self) -> PathBuf {
        let file = Path::new(&self.library_file);
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            Path::new(&self.download_dir).join(file)
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry_count,
            base_delay: Duration::from_secs(self.retry_delay_secs),
            max_delay: Duration::from_secs(self.retry_max_delay_secs),
            ..RetryPolicy::default()
        }
    }

    /// 配置摘要信息
    pub fn summary(&self) -> String {
        format!(
            "配置摘要:\n\
            - 下载目录: {}\n\
            - 分块线程数: {}\n\
            - 探测超时: {} 秒\n\
            - 重试次数: {}\n\
            - 自动解压: {}\n\
            - 游戏库清单: {}",
            self.download_dir,
            self.thread_count,
            self.probe_timeout_secs,
            self.retry_count,
            if self.extract_archives { "启用" } else { "禁用" },
            self.library_path().display(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert_eq!(settings.thread_count, 8);
        assert_eq!(settings.probe_timeout_secs, 30);
        assert_eq!(settings.retry_count, 3);
        assert!(settings.extract_archives);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();
        settings.thread_count = 0;
        assert!(settings.validate().is_err());

        settings = Settings::default();
        settings.thread_count = 65;
        assert!(settings.validate().is_err());

        settings = Settings::default();
        settings.download_dir = String::new();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_settings_save_load_roundtrip() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let path = dir.path().join("romdown.conf");
        let path_str = path.to_string_lossy().to_string();

        let mut settings = Settings::default();
        settings.thread_count = 4;
        settings.download_dir = "/tmp/roms".to_string();
        settings.save_with_tutorial(&path_str).expect("保存配置失败");

        let loaded = Settings::load(&path_str).expect("加载配置失败");
        assert_eq!(loaded.thread_count, 4);
        assert_eq!(loaded.download_dir, "/tmp/roms");

        let content = fs::read_to_string(&path).expect("读取配置文件失败");
        assert!(content.contains("romdown 配置文件"));
    }

    #[test]
    fn test_load_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let path = dir.path().join("sub").join("romdown.conf");
        let settings = Settings::load(&path.to_string_lossy()).expect("加载配置失败");
        assert_eq!(settings.thread_count, 8);
        assert!(path.exists());
    }

    #[test]
    fn test_library_path_resolution() {
        let mut settings = Settings::default();
        settings.download_dir = "/data/roms".to_string();
        assert_eq!(settings.library_path(), PathBuf::from("/data/roms/library.json"));

        settings.library_file = "/var/lib/romdown/library.json".to_string();
        assert_eq!(settings.library_path(), PathBuf::from("/var/lib/romdown/library.json"));
    }

    #[test]
    fn test_retry_policy_from_settings() {
        let mut settings = Settings::default();
        settings.retry_count = 5;
        settings.retry_delay_secs = 2;
        let policy = settings.retry_policy();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.base_delay, Duration::from_secs(2));
    }
}
