use thiserror::Error;
use std::io;

/// 下载引擎统一错误类型
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("网络错误: {0}")]
    NetworkError(String),

    #[error("IO错误: {0}")]
    IoError(#[from] io::Error),

    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    #[error("文件已存在: {0}")]
    FileExists(String),

    #[error("请求超时")]
    Timeout,

    #[error("下载被取消")]
    Cancelled,

    #[error("下载暂停")]
    Paused,

    #[error("无法恢复下载: {0}")]
    ResumeNotSupported(String),

    #[error("服务器忽略了 Range 请求")]
    RangeIgnored,

    #[error("服务器错误: {0}")]
    ServerError(String),

    #[error("文件大小不匹配: 预期 {expected} 字节, 实际 {actual} 字节")]
    SizeMismatch {
        expected: u64,
        actual: u64,
    },

    #[error("解压失败: {0}")]
    ExtractionFailed(String),

    #[error("游戏库登记失败: {0}")]
    CatalogFailed(String),

    #[error("配置无效: {0}")]
    ConfigError(String),

    #[error("未知错误: {0}")]
    Unknown(String),
}

impl DownloadError {
    /// 是否值得在同一次任务内重试
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::NetworkError(_) | DownloadError::Timeout => true,
            DownloadError::ServerError(msg) => {
                // 5xx 一类的服务器错误通常是暂时的
                msg.contains("500") || msg.contains("502") || msg.contains("503")
                    || msg.contains("504") || msg.contains("507") || msg.contains("508")
            }
            _ => false,
        }
    }

    /// 重试也无济于事的错误
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DownloadError::InvalidUrl(_)
                | DownloadError::FileExists(_)
                | DownloadError::ResumeNotSupported(_)
                | DownloadError::ConfigError(_)
        )
    }

    /// 暂停/取消引发的流中断不是失败，调用方必须吞掉而不是上报
    pub fn is_cancellation(&self) -> bool {
        matches!(self, DownloadError::Cancelled | DownloadError::Paused)
    }
}

impl From<String> for DownloadError {
    fn from(error: String) -> Self {
        DownloadError::Unknown(error)
    }
}

impl From<&str> for DownloadError {
    fn from(error: &str) -> Self {
        DownloadError::Unknown(error.to_string())
    }
}

pub type DownloadResult<T> = Result<T, DownloadError>;
