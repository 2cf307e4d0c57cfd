//! Core: 下载任务的 actor 管理、能力探测、分块调度与错误处理

pub mod error;
pub mod manager;
pub mod probe;
pub mod task;

pub use error::{DownloadError, DownloadResult};
pub use manager::{
    CancelDownload, DownloadManagerActor, GetAllTasks, GetProgress, PauseDownload, PruneDownload,
    ResumeDownload, StartDownload,
};
pub use task::state::{RomMeta, StrategyHint, TaskSnapshot, TaskStatus, TransferStrategy};
