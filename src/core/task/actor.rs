use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use actix::prelude::*;
use uuid::Uuid;

use crate::catalog::{LibraryCatalog, NewEntry};
use crate::config::Settings;
use crate::core::error::DownloadError;
use crate::core::manager::{DownloadManagerActor, TaskSnapshotUpdate};
use crate::extract::ArchiveExtractor;
use crate::utils::validator;

use super::chunks::ChunkSet;
use super::fetch::{fetch_chunk, fetch_single, TransferFlags};
use super::messages::{ChunkOutcome, PostProcessed, StreamOutcome};
use super::progress::{estimate_eta, SpeedEstimator};
use super::retry::RetryContext;
use super::state::{
    progress_fraction, RomMeta, StrategyHint, TaskSnapshot, TaskStatus, TransferStrategy,
};

/// 进度采样间隔：亚秒级，足够平滑又不至于在高吞吐下拖后腿
const SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// 单任务传输控制器。
/// 一个任务对应一个 actor，状态字段只在自己的邮箱线程里变更；
/// 抓取协程通过消息汇报结果，通过原子标志接收暂停/取消指令。
pub struct DownloadTaskActor {
    pub id: Uuid,
    pub url: String,
    pub dest: PathBuf,
    pub meta: RomMeta,
    pub hint: StrategyHint,
    pub settings: Settings,

    pub status: TaskStatus,
    pub strategy: TransferStrategy,
    pub range_supported: bool,
    pub total_size: u64,
    pub downloaded: u64,
    pub speed: u64,
    pub eta_secs: Option<u64>,
    pub final_path: Option<PathBuf>,

    pub flags: TransferFlags,
    pub chunks: Option<ChunkSet>,
    pub active_fetchers: usize,
    pub pending_fallback: bool,
    pub estimator: SpeedEstimator,
    pub sampler: Option<SpawnHandle>,

    pub extractor: Arc<dyn ArchiveExtractor>,
    pub catalog: Arc<dyn LibraryCatalog>,
    pub manager: Option<Addr<DownloadManagerActor>>,
}

impl Actor for DownloadTaskActor {
    type Context = Context<Self>;
}

impl DownloadTaskActor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: Uuid,
        settings: Settings,
        extractor: Arc<dyn ArchiveExtractor>,
        catalog: Arc<dyn LibraryCatalog>,
        url: String,
        dest: PathBuf,
        meta: RomMeta,
        hint: StrategyHint,
    ) -> Self {
        Self {
            id,
            url,
            dest,
            meta,
            hint,
            settings,
            // 任务一创建就处于 Downloading，start 立即返回，传输在后台推进
            status: TaskStatus::Downloading,
            strategy: TransferStrategy::SingleStream,
            range_supported: false,
            total_size: 0,
            downloaded: 0,
            speed: 0,
            eta_secs: None,
            final_path: None,
            flags: TransferFlags::new(),
            chunks: None,
            active_fetchers: 0,
            pending_fallback: false,
            estimator: SpeedEstimator::new(),
            sampler: None,
            extractor,
            catalog,
            manager: None,
        }
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            url: self.url.clone(),
            file: self.dest.clone(),
            name: self.meta.name.clone(),
            platform: self.meta.platform.clone(),
            status: self.status.clone(),
            strategy: self.strategy,
            total_bytes: self.total_size,
            downloaded_bytes: self.downloaded,
            progress: progress_fraction(&self.status, self.total_size, self.downloaded),
            speed: self.speed,
            eta_secs: self.eta_secs,
            error_detail: self.status.error_detail(),
            final_path: self.final_path.clone(),
        }
    }

    /// 把最新快照推给注册表；注册表是边界轮询的唯一数据源
    pub fn push_snapshot(&self) {
        if let Some(manager) = &self.manager {
            manager.do_send(TaskSnapshotUpdate(self.snapshot()));
        }
    }

    pub fn start_sampler(&mut self, ctx: &mut Context<Self>) {
        if self.sampler.is_some() {
            return;
        }
        let handle = ctx.run_interval(SAMPLE_INTERVAL, |act, _ctx| {
            if act.status != TaskStatus::Downloading {
                return;
            }
            act.sample_progress();
            act.push_snapshot();
        });
        self.sampler = Some(handle);
    }

    /// 任务一离开 Downloading 就停掉采样定时器
    pub fn stop_sampler(&mut self, ctx: &mut Context<Self>) {
        if let Some(handle) = self.sampler.take() {
            ctx.cancel_future(handle);
        }
    }

    /// 采一次进度：分块模式累加各块计数器，单流模式看文件大小
    pub fn sample_progress(&mut self) {
        let downloaded = match &self.chunks {
            Some(set) => set.total_downloaded(),
            None => std::fs::metadata(&self.dest)
                .map(|m| m.len())
                .unwrap_or(self.downloaded),
        };
        self.downloaded = downloaded;
        self.speed = self.estimator.sample_at(Instant::now(), downloaded);
        self.eta_secs = estimate_eta(self.total_size, downloaded, self.speed);
    }

    /// 为给定分块铺开抓取协程，每个协程带自己的重试预算
    pub fn launch_chunk_fetchers(&mut self, ctx: &mut Context<Self>, indices: &[usize]) {
        let Some(set) = &self.chunks else { return };
        let addr = ctx.address();
        for &index in indices {
            let chunk = set.chunks()[index].clone();
            let settings = self.settings.clone();
            let url = self.url.clone();
            let dest = self.dest.clone();
            let flags = self.flags.clone();
            let addr = addr.clone();
            self.active_fetchers += 1;
            actix::spawn(async move {
                let mut retry = RetryContext::new(settings.retry_policy());
                let result = loop {
                    match fetch_chunk(&settings, &url, &dest, &chunk, &flags).await {
                        Ok(()) => break Ok(()),
                        Err(e) if retry.should_retry(&e) => {
                            let delay = retry.record_attempt();
                            log::warn!(
                                "分块 {} 下载失败，{:.1} 秒后重试: {}",
                                index,
                                delay.as_secs_f64(),
                                e
                            );
                            tokio::time::sleep(delay).await;
                        }
                        Err(e) => break Err(e),
                    }
                };
                addr.do_send(ChunkOutcome { index, result });
            });
        }
    }

    /// 启动单流抓取；`resume_from` 大于 0 时发开区间 Range 续传
    pub fn launch_single_fetcher(&mut self, ctx: &mut Context<Self>, resume_from: u64) {
        let addr = ctx.address();
        let settings = self.settings.clone();
        let url = self.url.clone();
        let dest = self.dest.clone();
        let flags = self.flags.clone();
        let range_supported = self.range_supported;
        let expected_total = self.total_size;
        self.active_fetchers += 1;
        actix::spawn(async move {
            let mut retry = RetryContext::new(settings.retry_policy());
            let mut resume_from = resume_from;
            let result = loop {
                match fetch_single(&settings, &url, &dest, resume_from, expected_total, &flags).await
                {
                    Ok(size) => break Ok(size),
                    Err(e) if retry.should_retry(&e) => {
                        let delay = retry.record_attempt();
                        log::warn!("下载失败，{:.1} 秒后重试: {}", delay.as_secs_f64(), e);
                        tokio::time::sleep(delay).await;
                        // 支持 Range 就接着当前文件大小续传，否则只能从头再来
                        resume_from = if range_supported {
                            std::fs::metadata(&dest).map(|m| m.len()).unwrap_or(0)
                        } else {
                            0
                        };
                    }
                    Err(e) => break Err(e),
                }
            };
            addr.do_send(StreamOutcome { result });
        });
    }

    /// 全部分块（或单流）完成：收尾并移交后处理
    pub fn finish_transfer(&mut self, ctx: &mut Context<Self>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = TaskStatus::Completed;
        if self.total_size == 0 {
            self.total_size = self.downloaded;
        } else {
            self.downloaded = self.total_size;
        }
        self.speed = 0;
        self.eta_secs = None;
        self.stop_sampler(ctx);
        log::info!(
            "下载完成: {} ({} 字节)",
            self.dest.display(),
            self.total_size
        );
        self.push_snapshot();
        self.spawn_post_process(ctx);
    }

    /// 非取消原因的失败：记录错误并掐断其余在途分块
    pub fn fail_transfer(&mut self, ctx: &mut Context<Self>, error: DownloadError) {
        if self.status.is_terminal() || error.is_cancellation() {
            return;
        }
        log::error!("下载失败: {} - {}", self.url, error);
        self.status = TaskStatus::Failed(error.to_string());
        if let Some(set) = &self.chunks {
            set.abort_all();
        }
        self.speed = 0;
        self.eta_secs = None;
        self.stop_sampler(ctx);
        self.push_snapshot();
    }

    /// 服务器对 Range 请求回了 200：等在途分块全部退场后，
    /// 把整个任务回退成从零开始的单流下载
    pub fn run_fallback_if_drained(&mut self, ctx: &mut Context<Self>) {
        if !self.pending_fallback
            || self.active_fetchers > 0
            || self.status != TaskStatus::Downloading
        {
            return;
        }
        self.pending_fallback = false;
        log::warn!("服务器忽略 Range 请求，回退为单流下载: {}", self.url);
        self.chunks = None;
        self.strategy = TransferStrategy::SingleStream;
        self.range_supported = false;
        self.downloaded = 0;
        self.estimator.reset();
        self.launch_single_fetcher(ctx, 0);
        self.push_snapshot();
    }

    /// 下载完成后的移交：按扩展名分类，可解压的交给解压器，
    /// 最终路径登记进游戏库。两步失败都只记日志。
    pub fn spawn_post_process(&mut self, ctx: &mut Context<Self>) {
        let addr = ctx.address();
        let extractor = self.extractor.clone();
        let catalog = self.catalog.clone();
        let dest = self.dest.clone();
        let meta = self.meta.clone();
        let extract_enabled = self.settings.extract_archives;
        let download_dir = PathBuf::from(&self.settings.download_dir);
        actix::spawn(async move {
            let mut final_path = dest.clone();
            if extract_enabled && extractor.should_extract(&dest) {
                let out_dir = download_dir.join(validator::sanitize_name(&meta.name));
                match extractor.extract(&dest, &out_dir).await {
                    Ok(resolved) => {
                        log::info!("解压完成: {} -> {}", dest.display(), resolved.display());
                        final_path = resolved;
                    }
                    Err(e) => {
                        log::warn!("解压失败，保留原始文件 {}: {}", dest.display(), e);
                    }
                }
            }

            let entry = NewEntry::for_download(
                &meta.name,
                meta.platform.clone(),
                &final_path,
                &download_dir,
                meta.extra.clone(),
            );
            match catalog.register_entry(entry).await {
                Ok(record) => log::info!("已登记到游戏库: {}", record.name),
                Err(e) => log::warn!("游戏库登记失败（下载仍视为成功）: {}", e),
            }

            addr.do_send(PostProcessed { final_path });
        });
    }

    /// 取消收尾：删除未完成的文件。
    /// 在途协程看到标志后会自行退场；unix 上 unlink 立刻生效，
    /// 迟到的定位写只会落进已摘链的 inode。
    pub fn remove_partial_file(&self) {
        match std::fs::remove_file(&self.dest) {
            Ok(()) => log::info!("已删除未完成的文件: {}", self.dest.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("删除未完成文件失败 {}: {}", self.dest.display(), e),
        }
    }

    /// 暂停期间数据不再流动，速度清零
    pub fn mark_paused_telemetry(&mut self) {
        self.speed = 0;
        self.eta_secs = None;
    }

    /// 任务级取消标志（供处理器设置）
    pub fn set_cancelled_flag(&self) {
        self.flags.cancelled.store(true, Ordering::Release);
    }
}
