use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use actix::prelude::*;
use chrono::Local;
use log::LevelFilter;

/// stderr 日志走 env_logger，RUST_LOG 可调级别；文件日志由 SessionLogActor 负责
pub fn init_stderr_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// 一条会话日志
pub struct LogLine {
    pub level: LevelFilter,
    pub message: String,
}
impl Message for LogLine { type Result = (); }

/// 会话日志 actor：追加写入单个日志文件，超过大小上限时轮转一份 .old
pub struct SessionLogActor {
    writer: BufWriter<File>,
    level: LevelFilter,
    path: PathBuf,
    max_size: u64,
    written: u64,
}

impl SessionLogActor {
    pub fn open(path: impl Into<PathBuf>, level: LevelFilter, max_size: u64) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            writer: BufWriter::new(file),
            level,
            path,
            max_size,
            written,
        })
    }

    fn rotate_if_needed(&mut self) -> std::io::Result<()> {
        if self.written <= self.max_size {
            return Ok(());
        }
        self.writer.flush()?;
        let backup = self.path.with_extension("log.old");
        if backup.exists() {
            std::fs::remove_file(&backup)?;
        }
        std::fs::rename(&self.path, &backup)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.written = 0;
        Ok(())
    }

    fn append(&mut self, level: LevelFilter, message: &str) -> std::io::Result<()> {
        if level > self.level {
            return Ok(());
        }
        self.rotate_if_needed()?;
        let line = format!(
            "{} [{}] {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            level,
            message
        );
        self.writer.write_all(line.as_bytes())?;
        self.written += line.len() as u64;
        self.writer.flush()?;
        Ok(())
    }
}

impl Actor for SessionLogActor {
    type Context = Context<Self>;
}

impl Handler<LogLine> for SessionLogActor {
    type Result = ();
    fn handle(&mut self, msg: LogLine, _ctx: &mut Self::Context) {
        if let Err(e) = self.append(msg.level, &msg.message) {
            eprintln!("会话日志写入失败: {}", e);
        }
    }
}

/// 为 Addr<SessionLogActor> 提供便捷方法
pub trait SessionLogExt {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

impl SessionLogExt for Addr<SessionLogActor> {
    fn info(&self, message: &str) {
        self.do_send(LogLine { level: LevelFilter::Info, message: message.to_string() });
    }

    fn warn(&self, message: &str) {
        self.do_send(LogLine { level: LevelFilter::Warn, message: message.to_string() });
    }

    fn error(&self, message: &str) {
        self.do_send(LogLine { level: LevelFilter::Error, message: message.to_string() });
    }
}
