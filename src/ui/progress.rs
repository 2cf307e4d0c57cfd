use std::collections::HashMap;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use uuid::Uuid;

use crate::core::task::state::{TaskSnapshot, TaskStatus};

/// 多任务进度面板：每个任务一条进度条，按轮询到的快照刷新。
/// 大小未知的任务用转圈代替进度条（进度不可知，只能等它下完）。
pub struct ProgressBoard {
    multi: MultiProgress,
    bars: HashMap<Uuid, ProgressBar>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: HashMap::new(),
        }
    }

    pub fn update(&mut self, snapshot: &TaskSnapshot) {
        let bar = self.bars.entry(snapshot.id).or_insert_with(|| {
            let bar = if snapshot.total_bytes > 0 {
                let bar = ProgressBar::new(snapshot.total_bytes);
                bar.set_style(
                    ProgressStyle::with_template(
                        "{prefix:.bold} [{bar:36}] {bytes}/{total_bytes} {msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
                );
                bar
            } else {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::with_template("{prefix:.bold} {spinner} {bytes} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar
            };
            bar.set_prefix(snapshot.name.clone());
            self.multi.add(bar)
        });

        // 大小在传输中途才探明时，把转圈升级成真进度条
        if snapshot.total_bytes > 0 && bar.length().unwrap_or(0) != snapshot.total_bytes {
            bar.set_length(snapshot.total_bytes);
        }
        bar.set_position(snapshot.downloaded_bytes);
        bar.set_message(format_status_line(snapshot));

        if snapshot.status.is_terminal() {
            bar.finish_with_message(format_status_line(snapshot));
        } else {
            bar.tick();
        }
    }

    /// 已从注册表消失的任务（被取消）对应的进度条也要收掉
    pub fn retain(&mut self, alive: &[Uuid]) {
        let gone: Vec<Uuid> = self
            .bars
            .keys()
            .filter(|id| !alive.contains(id))
            .copied()
            .collect();
        for id in gone {
            if let Some(bar) = self.bars.remove(&id) {
                bar.finish_with_message("已取消".to_string());
            }
        }
    }
}

impl Default for ProgressBoard {
    fn default() -> Self {
        Self::new()
    }
}

fn format_status_line(snapshot: &TaskSnapshot) -> String {
    match &snapshot.status {
        TaskStatus::Downloading => format!(
            "{} | ETA:{}",
            format_speed(snapshot.speed),
            format_eta(snapshot.eta_secs)
        ),
        TaskStatus::Paused => "已暂停".to_string(),
        TaskStatus::Completed => "已完成".to_string(),
        TaskStatus::Failed(detail) => format!("失败: {}", detail),
        TaskStatus::Cancelled => "已取消".to_string(),
    }
}

pub fn format_speed(speed: u64) -> String {
    if speed >= 1024 * 1024 {
        format!("{:.2} MB/s", speed as f64 / (1024.0 * 1024.0))
    } else if speed >= 1024 {
        format!("{:.2} KB/s", speed as f64 / 1024.0)
    } else {
        format!("{} B/s", speed)
    }
}

pub fn format_eta(eta_secs: Option<u64>) -> String {
    let Some(seconds) = eta_secs else {
        return "未知".to_string();
    };
    if seconds >= 3600 {
        format!("{}h{}m", seconds / 3600, (seconds % 3600) / 60)
    } else if seconds >= 60 {
        format!("{}m{}s", seconds / 60, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}
