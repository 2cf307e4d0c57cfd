use std::sync::Arc;
use std::time::Duration;

use actix::prelude::*;
use crossterm::{
    cursor,
    event::{self, Event, KeyCode},
    execute, terminal,
};
use log::LevelFilter;
use uuid::Uuid;

use romdown::catalog::JsonCatalog;
use romdown::cli;
use romdown::core::manager::{
    CancelDownload, DownloadManagerActor, GetAllTasks, PauseDownload, ResumeDownload,
    StartDownload,
};
use romdown::core::task::state::TaskStatus;
use romdown::extract::ZipExtractor;
use romdown::ui::ProgressBoard;
use romdown::utils::logger::{init_stderr_logging, SessionLogActor, SessionLogExt};

const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(250);
const KEYBOARD_POLL_INTERVAL: Duration = Duration::from_millis(50);
const SESSION_LOG_MAX_SIZE: u64 = 10 * 1024 * 1024;

#[actix::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_stderr_logging();
    let session_log =
        SessionLogActor::open("logs/romdown.log", LevelFilter::Info, SESSION_LOG_MAX_SIZE)?.start();
    session_log.info(&format!(
        "romdown 启动 (构建于 {})",
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown")
    ));

    let (args, settings) = match cli::Args::parse_args() {
        Ok(parsed) => parsed,
        Err(e) => {
            session_log.error(&format!("参数解析失败: {}", e));
            eprintln!("参数解析失败: {}", e);
            std::process::exit(1);
        }
    };

    let urls = match args.get_urls() {
        Ok(urls) => urls,
        Err(e) => {
            session_log.error(&format!("获取URL列表失败: {}", e));
            eprintln!("获取URL列表失败: {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", settings.summary());
    session_log.info(&settings.summary());

    let catalog = Arc::new(JsonCatalog::open(settings.library_path())?);
    let manager =
        DownloadManagerActor::new(settings.clone(), Arc::new(ZipExtractor), catalog).start();
    session_log.info("下载管理器已启动");

    // 创建并启动全部任务
    let batch = urls.len() > 1;
    let mut task_ids = Vec::new();
    for url in &urls {
        let meta = args.meta_for(url, batch);
        match manager
            .send(StartDownload {
                url: url.clone(),
                hint: args.strategy_hint(),
                meta,
            })
            .await?
        {
            Ok(id) => {
                session_log.info(&format!("创建下载任务: {} ({})", url, id));
                println!("✓ 创建下载任务: {}", url);
                task_ids.push(id);
            }
            Err(e) => {
                session_log.error(&format!("创建下载任务失败: {} - {}", url, e));
                eprintln!("✗ 创建下载任务失败: {} - {}", url, e);
            }
        }
    }

    if task_ids.is_empty() {
        eprintln!("没有可下载的任务");
        return Ok(());
    }

    println!("\n开始下载... (p 暂停全部, r 恢复全部, c 取消全部, q 退出)");
    run_download_loop(&manager, &task_ids, &session_log).await?;
    Ok(())
}

/// 主循环：轮询快照刷新进度条，处理键盘控制
async fn run_download_loop(
    manager: &Addr<DownloadManagerActor>,
    task_ids: &[Uuid],
    session_log: &Addr<SessionLogActor>,
) -> Result<(), Box<dyn std::error::Error>> {
    // 非交互环境（重定向、CI）下跳过键盘控制，只刷进度
    let interactive = terminal::enable_raw_mode().is_ok();
    if interactive {
        execute!(std::io::stdout(), cursor::Hide)?;
    }

    let mut board = ProgressBoard::new();
    let mut last_poll = std::time::Instant::now() - PROGRESS_POLL_INTERVAL;

    loop {
        if interactive {
            if let Ok(true) = event::poll(KEYBOARD_POLL_INTERVAL) {
                if let Ok(Event::Key(key_event)) = event::read() {
                    match key_event.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') => {
                            session_log.info("用户退出，下载在后台不再继续");
                            break;
                        }
                        KeyCode::Char('p') | KeyCode::Char('P') => {
                            for id in task_ids {
                                manager.send(PauseDownload(*id)).await?;
                            }
                            session_log.info("用户暂停全部任务");
                        }
                        KeyCode::Char('r') | KeyCode::Char('R') => {
                            for id in task_ids {
                                manager.send(ResumeDownload(*id)).await?;
                            }
                            session_log.info("用户恢复全部任务");
                        }
                        KeyCode::Char('c') | KeyCode::Char('C') => {
                            for id in task_ids {
                                manager.send(CancelDownload(*id)).await?;
                            }
                            session_log.info("用户取消全部任务");
                        }
                        _ => {}
                    }
                }
            }
        }

        if last_poll.elapsed() >= PROGRESS_POLL_INTERVAL {
            let snapshots = manager.send(GetAllTasks).await?;
            let alive: Vec<Uuid> = snapshots.iter().map(|s| s.id).collect();
            board.retain(&alive);
            for snapshot in &snapshots {
                board.update(snapshot);
            }

            // 被取消的任务已从注册表消失，也算收尾
            let all_settled = task_ids.iter().all(|id| {
                snapshots
                    .iter()
                    .find(|s| s.id == *id)
                    .map(|s| s.status.is_terminal())
                    .unwrap_or(true)
            });
            let any_paused = snapshots.iter().any(|s| s.status == TaskStatus::Paused);
            if all_settled && !any_paused {
                break;
            }
            last_poll = std::time::Instant::now();
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    if interactive {
        execute!(std::io::stdout(), cursor::Show)?;
        terminal::disable_raw_mode()?;
    }

    // 最终统计
    let snapshots = manager.send(GetAllTasks).await?;
    let completed = snapshots
        .iter()
        .filter(|s| s.status == TaskStatus::Completed)
        .count();
    let failed = snapshots
        .iter()
        .filter(|s| matches!(s.status, TaskStatus::Failed(_)))
        .count();
    let cancelled = task_ids
        .iter()
        .filter(|id| !snapshots.iter().any(|s| s.id == **id))
        .count();

    println!("\n下载统计:");
    println!("  总任务数: {}", task_ids.len());
    println!("  成功完成: {}", completed);
    println!("  失败: {}", failed);
    println!("  取消: {}", cancelled);
    for snapshot in &snapshots {
        if let Some(detail) = &snapshot.error_detail {
            println!("  ✗ {}: {}", snapshot.name, detail);
        }
    }

    session_log.info(&format!(
        "下载结束 - 成功: {}, 失败: {}, 取消: {}",
        completed, failed, cancelled
    ));
    Ok(())
}
