use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::probe::RangeSupport;

/// 下载任务状态
///
/// 状态机：`Downloading -> {Paused, Completed, Failed}`，
/// `Paused -> {Downloading, Cancelled}`，任何非终态都可以进入 `Cancelled`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Downloading,
    Paused,
    Completed,
    Failed(String),
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed(_) | TaskStatus::Cancelled
        )
    }

    pub fn error_detail(&self) -> Option<String> {
        match self {
            TaskStatus::Failed(detail) => Some(detail.clone()),
            _ => None,
        }
    }
}

/// 传输策略：单流或 n 路分块
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStrategy {
    SingleStream,
    Chunked(usize),
}

/// 调用方对策略的期望；最终选择仍以探测结果为准
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyHint {
    Auto,
    SingleStream,
    Chunked(usize),
}

impl TransferStrategy {
    /// 只有 Range 支持被确认、文件大小已知且线程数大于 1 时才分块，
    /// 其余情况一律单流。
    pub fn select(probe: &RangeSupport, configured_threads: usize, hint: StrategyHint) -> Self {
        let threads = match hint {
            StrategyHint::Auto => configured_threads,
            StrategyHint::SingleStream => 1,
            StrategyHint::Chunked(n) => n,
        };
        if probe.supports_range && probe.content_length > 0 && threads > 1 {
            TransferStrategy::Chunked(threads)
        } else {
            TransferStrategy::SingleStream
        }
    }
}

/// 任务元数据：展示名决定输出文件名和解压目录名
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RomMeta {
    pub name: String,
    pub platform: Option<String>,
    pub extra: Option<serde_json::Value>,
}

impl RomMeta {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), platform: None, extra: None }
    }
}

/// 调用方可见的任务快照，由注册表缓存并按轮询返回
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: Uuid,
    pub url: String,
    pub file: PathBuf,
    pub name: String,
    pub platform: Option<String>,
    pub status: TaskStatus,
    pub strategy: TransferStrategy,
    /// 0 表示大小未知
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    /// None 表示进度不可知（单流下载且服务器未报大小）
    pub progress: Option<f32>,
    /// B/s
    pub speed: u64,
    pub eta_secs: Option<u64>,
    pub error_detail: Option<String>,
    /// 后处理（解压/登记）后的最终路径
    pub final_path: Option<PathBuf>,
}

/// 进度分数：完成恒为 1，大小未知时不可知
pub fn progress_fraction(status: &TaskStatus, total: u64, downloaded: u64) -> Option<f32> {
    if *status == TaskStatus::Completed {
        return Some(1.0);
    }
    if total == 0 {
        return None;
    }
    Some((downloaded as f32 / total as f32).min(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(supports_range: bool, content_length: u64) -> RangeSupport {
        RangeSupport { supports_range, content_length }
    }

    #[test]
    fn test_strategy_needs_range_and_length_and_threads() {
        assert_eq!(
            TransferStrategy::select(&probe(true, 800_000_000), 8, StrategyHint::Auto),
            TransferStrategy::Chunked(8)
        );
        assert_eq!(
            TransferStrategy::select(&probe(false, 800_000_000), 8, StrategyHint::Auto),
            TransferStrategy::SingleStream
        );
        assert_eq!(
            TransferStrategy::select(&probe(true, 0), 8, StrategyHint::Auto),
            TransferStrategy::SingleStream
        );
        assert_eq!(
            TransferStrategy::select(&probe(true, 1024), 1, StrategyHint::Auto),
            TransferStrategy::SingleStream
        );
    }

    #[test]
    fn test_strategy_hint_overrides_thread_count() {
        assert_eq!(
            TransferStrategy::select(&probe(true, 1024), 8, StrategyHint::SingleStream),
            TransferStrategy::SingleStream
        );
        assert_eq!(
            TransferStrategy::select(&probe(true, 1024), 2, StrategyHint::Chunked(4)),
            TransferStrategy::Chunked(4)
        );
        // 提示也压不过探测结果
        assert_eq!(
            TransferStrategy::select(&probe(false, 1024), 8, StrategyHint::Chunked(4)),
            TransferStrategy::SingleStream
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed("x".to_string()).is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Downloading.is_terminal());
        assert!(!TaskStatus::Paused.is_terminal());
    }

    #[test]
    fn test_progress_fraction() {
        assert_eq!(progress_fraction(&TaskStatus::Downloading, 100, 25), Some(0.25));
        // 大小未知时进度不可知
        assert_eq!(progress_fraction(&TaskStatus::Downloading, 0, 1024), None);
        // 完成时即便大小未知也报 1
        assert_eq!(progress_fraction(&TaskStatus::Completed, 0, 1024), Some(1.0));
        assert_eq!(progress_fraction(&TaskStatus::Completed, 100, 100), Some(1.0));
    }
}
