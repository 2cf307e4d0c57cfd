use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use actix::prelude::*;
use futures::FutureExt;
use uuid::Uuid;

use crate::catalog::LibraryCatalog;
use crate::config::Settings;
use crate::core::error::DownloadError;
use crate::core::task::messages::{
    CancelTransfer, PauseTransfer, ResumeTransfer, ShutdownTask, StartTransfer,
};
use crate::core::task::state::{RomMeta, StrategyHint, TaskSnapshot};
use crate::core::task::DownloadTaskActor;
use crate::extract::ArchiveExtractor;
use crate::utils::validator;

/// ================== 边界消息 ==================

/// 创建并启动一个下载任务，立即返回任务 id
pub struct StartDownload {
    pub url: String,
    pub hint: StrategyHint,
    pub meta: RomMeta,
}
impl Message for StartDownload { type Result = Result<Uuid, DownloadError>; }

/// 暂停；任务不在 Downloading 时返回 false
pub struct PauseDownload(pub Uuid);
impl Message for PauseDownload { type Result = bool; }

/// 恢复；任务不在 Paused 或服务器不支持续传时返回 false
pub struct ResumeDownload(pub Uuid);
impl Message for ResumeDownload { type Result = bool; }

/// 取消并从注册表移除；对已移除的 id 再次取消返回 false
pub struct CancelDownload(pub Uuid);
impl Message for CancelDownload { type Result = bool; }

/// 轮询单个任务的快照
pub struct GetProgress(pub Uuid);
impl Message for GetProgress { type Result = Option<TaskSnapshot>; }

/// 轮询全部任务的快照
pub struct GetAllTasks;
impl Message for GetAllTasks { type Result = Vec<TaskSnapshot>; }

/// 把已到终态的任务清理出注册表（Completed/Failed 默认保留到被显式清理）
pub struct PruneDownload(pub Uuid);
impl Message for PruneDownload { type Result = bool; }

/// 任务 actor 推送的最新快照（内部消息）
pub struct TaskSnapshotUpdate(pub TaskSnapshot);
impl Message for TaskSnapshotUpdate { type Result = (); }

/// ================== 注册表 actor ==================

/// 任务注册表兼边界入口。
/// id -> 任务 actor 地址、id -> 最新快照这两张表只在本 actor 的
/// 邮箱线程里读写，轮询方永远拿到一致的（最终一致的）快照。
pub struct DownloadManagerActor {
    settings: Settings,
    extractor: Arc<dyn ArchiveExtractor>,
    catalog: Arc<dyn LibraryCatalog>,
    tasks: HashMap<Uuid, Addr<DownloadTaskActor>>,
    snapshots: HashMap<Uuid, TaskSnapshot>,
}

impl Actor for DownloadManagerActor {
    type Context = Context<Self>;
}

impl DownloadManagerActor {
    pub fn new(
        settings: Settings,
        extractor: Arc<dyn ArchiveExtractor>,
        catalog: Arc<dyn LibraryCatalog>,
    ) -> Self {
        Self {
            settings,
            extractor,
            catalog,
            tasks: HashMap::new(),
            snapshots: HashMap::new(),
        }
    }
}

impl Handler<StartDownload> for DownloadManagerActor {
    type Result = Result<Uuid, DownloadError>;

    fn handle(&mut self, msg: StartDownload, ctx: &mut Self::Context) -> Self::Result {
        // 配置只在任务启动时读一次：目录和线程数
        std::fs::create_dir_all(&self.settings.download_dir)?;
        let file_name = validator::compose_output_name(&msg.meta.name, &msg.url);
        let dest = Path::new(&self.settings.download_dir).join(&file_name);

        let id = Uuid::new_v4();
        let task = DownloadTaskActor::new(
            id,
            self.settings.clone(),
            self.extractor.clone(),
            self.catalog.clone(),
            msg.url.clone(),
            dest,
            msg.meta,
            msg.hint,
        );
        let snapshot = task.snapshot();
        let addr = task.start();
        addr.do_send(StartTransfer { manager: ctx.address() });

        self.tasks.insert(id, addr);
        self.snapshots.insert(id, snapshot);
        log::info!("创建下载任务 {}: {}", id, msg.url);
        Ok(id)
    }
}

impl Handler<PauseDownload> for DownloadManagerActor {
    type Result = ResponseFuture<bool>;

    fn handle(&mut self, msg: PauseDownload, _ctx: &mut Self::Context) -> Self::Result {
        match self.tasks.get(&msg.0).cloned() {
            Some(addr) => Box::pin(addr.send(PauseTransfer).map(|res| res.unwrap_or(false))),
            None => Box::pin(futures::future::ready(false)),
        }
    }
}

impl Handler<ResumeDownload> for DownloadManagerActor {
    type Result = ResponseFuture<bool>;

    fn handle(&mut self, msg: ResumeDownload, _ctx: &mut Self::Context) -> Self::Result {
        match self.tasks.get(&msg.0).cloned() {
            Some(addr) => Box::pin(addr.send(ResumeTransfer).map(|res| res.unwrap_or(false))),
            None => Box::pin(futures::future::ready(false)),
        }
    }
}

impl Handler<CancelDownload> for DownloadManagerActor {
    type Result = ResponseActFuture<Self, bool>;

    fn handle(&mut self, msg: CancelDownload, _ctx: &mut Self::Context) -> Self::Result {
        let id = msg.0;
        let Some(addr) = self.tasks.get(&id).cloned() else {
            return Box::pin(actix::fut::ready(false));
        };
        Box::pin(addr.send(CancelTransfer).into_actor(self).map(
            move |res, act, _ctx| {
                let cancelled = res.unwrap_or(false);
                if cancelled {
                    // 取消即刻出表；之后对该 id 的轮询一律返回 None
                    if let Some(addr) = act.tasks.remove(&id) {
                        addr.do_send(ShutdownTask);
                    }
                    act.snapshots.remove(&id);
                }
                cancelled
            },
        ))
    }
}

impl Handler<GetProgress> for DownloadManagerActor {
    type Result = Option<TaskSnapshot>;

    fn handle(&mut self, msg: GetProgress, _ctx: &mut Self::Context) -> Self::Result {
        self.snapshots.get(&msg.0).cloned()
    }
}

impl Handler<GetAllTasks> for DownloadManagerActor {
    type Result = MessageResult<GetAllTasks>;

    fn handle(&mut self, _msg: GetAllTasks, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.snapshots.values().cloned().collect())
    }
}

impl Handler<PruneDownload> for DownloadManagerActor {
    type Result = bool;

    fn handle(&mut self, msg: PruneDownload, _ctx: &mut Self::Context) -> Self::Result {
        match self.snapshots.get(&msg.0) {
            Some(snapshot) if snapshot.status.is_terminal() => {
                self.snapshots.remove(&msg.0);
                if let Some(addr) = self.tasks.remove(&msg.0) {
                    addr.do_send(ShutdownTask);
                }
                true
            }
            _ => false,
        }
    }
}

impl Handler<TaskSnapshotUpdate> for DownloadManagerActor {
    type Result = ();

    fn handle(&mut self, msg: TaskSnapshotUpdate, _ctx: &mut Self::Context) {
        // 已被取消移除的任务可能还有迟到的推送，直接丢弃
        if self.tasks.contains_key(&msg.0.id) {
            self.snapshots.insert(msg.0.id, msg.0);
        }
    }
}
