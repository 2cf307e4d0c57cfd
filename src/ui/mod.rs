//! UI: 基于 indicatif 的多任务进度显示

pub mod progress;

pub use progress::ProgressBoard;
