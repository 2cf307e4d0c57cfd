//! romdown: 游戏 ROM 归档下载与整理工具
//!
//! 核心是一个可断点续传的多分块下载引擎（`core` 模块），
//! 下载完成后按扩展名分类归档文件，交给解压器和游戏库登记。

pub mod catalog;
pub mod cli;
pub mod config;
pub mod core;
pub mod extract;
pub mod ui;
pub mod utils;
