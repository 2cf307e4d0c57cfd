use std::sync::atomic::Ordering;

use actix::prelude::*;

use crate::core::error::DownloadError;
use crate::core::probe::probe_capabilities;
use crate::utils::validator;

use super::actor::DownloadTaskActor;
use super::chunks::ChunkSet;
use super::messages::*;
use super::state::{TaskStatus, TransferStrategy};
use super::util::preallocate;

impl Handler<StartTransfer> for DownloadTaskActor {
    type Result = ();

    fn handle(&mut self, msg: StartTransfer, ctx: &mut Self::Context) {
        self.manager = Some(msg.manager);

        if !validator::is_valid_url(&self.url) {
            self.fail_transfer(ctx, DownloadError::InvalidUrl(self.url.clone()));
            return;
        }
        if self.dest.exists() {
            self.fail_transfer(
                ctx,
                DownloadError::FileExists(self.dest.display().to_string()),
            );
            return;
        }

        // 探测在后台进行，start 调用方此刻已经拿到任务 id
        let settings = self.settings.clone();
        let url = self.url.clone();
        let addr = ctx.address();
        actix::spawn(async move {
            let probe = probe_capabilities(&settings, &url).await;
            addr.do_send(BeginTransfer { probe });
        });
        self.push_snapshot();
    }
}

impl Handler<BeginTransfer> for DownloadTaskActor {
    type Result = ();

    fn handle(&mut self, msg: BeginTransfer, ctx: &mut Self::Context) {
        // 探测期间任务可能已被暂停或取消
        if self.status != TaskStatus::Downloading {
            return;
        }

        self.range_supported = msg.probe.supports_range;
        self.total_size = msg.probe.content_length;
        self.strategy =
            TransferStrategy::select(&msg.probe, self.settings.thread_count, self.hint);
        log::info!(
            "开始下载: {} -> {} ({:?}, {} 字节)",
            self.url,
            self.dest.display(),
            self.strategy,
            self.total_size
        );

        match self.strategy {
            TransferStrategy::Chunked(threads) => {
                // 预分配后各分块只做区间内定位写，互不相扰
                if let Err(e) = preallocate(&self.dest, self.total_size) {
                    self.fail_transfer(ctx, e);
                    return;
                }
                let set = ChunkSet::plan(self.total_size, threads);
                let indices: Vec<usize> = (0..set.chunks().len()).collect();
                self.chunks = Some(set);
                self.launch_chunk_fetchers(ctx, &indices);
            }
            TransferStrategy::SingleStream => {
                self.launch_single_fetcher(ctx, 0);
            }
        }
        self.start_sampler(ctx);
        self.push_snapshot();
    }
}

impl Handler<PauseTransfer> for DownloadTaskActor {
    type Result = bool;

    fn handle(&mut self, _msg: PauseTransfer, ctx: &mut Self::Context) -> bool {
        if self.status != TaskStatus::Downloading {
            return false;
        }
        self.status = TaskStatus::Paused;
        // 抓取协程在下一个挂起点看到标志，刷盘、关流、退场
        self.flags.paused.store(true, Ordering::Release);
        self.stop_sampler(ctx);
        self.mark_paused_telemetry();
        log::info!("已暂停下载: {}", self.url);
        self.push_snapshot();
        true
    }
}

impl Handler<ResumeTransfer> for DownloadTaskActor {
    type Result = ResponseActFuture<Self, bool>;

    fn handle(&mut self, _msg: ResumeTransfer, _ctx: &mut Self::Context) -> Self::Result {
        if self.status != TaskStatus::Paused {
            return Box::pin(actix::fut::ready(false));
        }

        // 恢复前重新探测：服务器这会儿不认 Range 的话续传无从谈起
        let settings = self.settings.clone();
        let url = self.url.clone();
        Box::pin(
            async move { probe_capabilities(&settings, &url).await }
                .into_actor(self)
                .map(|probe, act, ctx| {
                    if act.status != TaskStatus::Paused {
                        return false;
                    }
                    if !probe.supports_range {
                        act.fail_transfer(
                            ctx,
                            DownloadError::ResumeNotSupported(
                                "服务器不支持断点续传，请重新开始下载".to_string(),
                            ),
                        );
                        return false;
                    }

                    act.range_supported = true;
                    if act.total_size == 0 {
                        act.total_size = probe.content_length;
                    }
                    act.status = TaskStatus::Downloading;
                    act.flags.paused.store(false, Ordering::Release);
                    act.estimator.reset();

                    match &act.chunks {
                        Some(set) => {
                            // 只重抓真正缺失的子区间；完成的分块一个字节都不再碰
                            set.clear_aborts();
                            let remaining = set.remaining();
                            if remaining.is_empty() {
                                act.sample_progress();
                                act.finish_transfer(ctx);
                                return true;
                            }
                            log::info!(
                                "恢复下载: {}（剩余 {} 个分块）",
                                act.url,
                                remaining.len()
                            );
                            let indices: Vec<usize> =
                                remaining.iter().map(|(i, _, _)| *i).collect();
                            act.launch_chunk_fetchers(ctx, &indices);
                        }
                        None => {
                            // 单流：从当前文件大小续传
                            let resume_from = std::fs::metadata(&act.dest)
                                .map(|m| m.len())
                                .unwrap_or(0);
                            log::info!("恢复下载: {}（已有 {} 字节）", act.url, resume_from);
                            act.launch_single_fetcher(ctx, resume_from);
                        }
                    }
                    act.start_sampler(ctx);
                    act.push_snapshot();
                    true
                }),
        )
    }
}

impl Handler<CancelTransfer> for DownloadTaskActor {
    type Result = bool;

    fn handle(&mut self, _msg: CancelTransfer, ctx: &mut Self::Context) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TaskStatus::Cancelled;
        self.set_cancelled_flag();
        if let Some(set) = &self.chunks {
            set.abort_all();
        }
        self.stop_sampler(ctx);
        self.remove_partial_file();
        log::info!("已取消下载: {}", self.url);
        // 注册表拿到 true 后会把本任务移出映射，这里不再推快照
        true
    }
}

impl Handler<ShutdownTask> for DownloadTaskActor {
    type Result = ();

    fn handle(&mut self, _msg: ShutdownTask, ctx: &mut Self::Context) {
        ctx.stop();
    }
}

impl Handler<ChunkOutcome> for DownloadTaskActor {
    type Result = ();

    fn handle(&mut self, msg: ChunkOutcome, ctx: &mut Self::Context) {
        self.active_fetchers = self.active_fetchers.saturating_sub(1);

        match msg.result {
            Ok(()) => {
                if self.status == TaskStatus::Downloading && !self.pending_fallback {
                    if let Some(set) = &self.chunks {
                        if set.is_complete() {
                            self.sample_progress();
                            self.finish_transfer(ctx);
                        }
                    }
                }
            }
            // 暂停/取消引发的中断不是错误，状态已在对应处理器里设好
            Err(e) if e.is_cancellation() => {}
            Err(DownloadError::RangeIgnored) => {
                if self.status == TaskStatus::Downloading {
                    self.pending_fallback = true;
                    if let Some(set) = &self.chunks {
                        set.abort_all();
                    }
                }
            }
            Err(e) => {
                log::error!("分块 {} 最终失败: {}", msg.index, e);
                self.fail_transfer(ctx, e);
            }
        }

        self.run_fallback_if_drained(ctx);
    }
}

impl Handler<StreamOutcome> for DownloadTaskActor {
    type Result = ();

    fn handle(&mut self, msg: StreamOutcome, ctx: &mut Self::Context) {
        self.active_fetchers = self.active_fetchers.saturating_sub(1);

        match msg.result {
            Ok(final_size) => {
                if self.status == TaskStatus::Downloading {
                    self.downloaded = final_size;
                    if self.total_size == 0 {
                        self.total_size = final_size;
                    }
                    self.finish_transfer(ctx);
                }
            }
            Err(e) if e.is_cancellation() => {}
            Err(e) => self.fail_transfer(ctx, e),
        }
    }
}

impl Handler<PostProcessed> for DownloadTaskActor {
    type Result = ();

    fn handle(&mut self, msg: PostProcessed, _ctx: &mut Self::Context) {
        self.final_path = Some(msg.final_path);
        self.push_snapshot();
    }
}
