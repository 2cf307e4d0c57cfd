use std::path::PathBuf;

use actix::{Addr, Message};

use crate::core::error::DownloadError;
use crate::core::manager::DownloadManagerActor;
use crate::core::probe::RangeSupport;

/// 启动传输（注册表创建任务 actor 后立即发送）
pub struct StartTransfer {
    pub manager: Addr<DownloadManagerActor>,
}
impl Message for StartTransfer { type Result = (); }

/// 能力探测完成，选定策略并铺开抓取协程
pub struct BeginTransfer {
    pub probe: RangeSupport,
}
impl Message for BeginTransfer { type Result = (); }

/// 暂停任务；仅在 Downloading 状态下有效
pub struct PauseTransfer;
impl Message for PauseTransfer { type Result = bool; }

/// 恢复任务；仅在 Paused 状态下有效，内部会重新探测 Range 支持
pub struct ResumeTransfer;
impl Message for ResumeTransfer { type Result = bool; }

/// 取消任务；任何非终态下有效，会删除未完成的文件
pub struct CancelTransfer;
impl Message for CancelTransfer { type Result = bool; }

/// 终态任务被清理出注册表后，关停 actor
pub struct ShutdownTask;
impl Message for ShutdownTask { type Result = (); }

/// 某个分块抓取结束
pub struct ChunkOutcome {
    pub index: usize,
    pub result: Result<(), DownloadError>,
}
impl Message for ChunkOutcome { type Result = (); }

/// 单流抓取结束，Ok 带最终文件大小
pub struct StreamOutcome {
    pub result: Result<u64, DownloadError>,
}
impl Message for StreamOutcome { type Result = (); }

/// 解压与登记完成，带最终登记路径
pub struct PostProcessed {
    pub final_path: PathBuf,
}
impl Message for PostProcessed { type Result = (); }
