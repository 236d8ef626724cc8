//! # 批量处理模块
//!
//! `collect` 命令的两步：按标记文件（默认 `calcinfo.json`）找出计算目录，
//! 再在线程池中逐个解析，结果保持目录顺序。
//!
//! ## 依赖关系
//! - 被 `commands/collect.rs` 使用
//! - 使用 `walkdir`/`glob` 查找目录，`rayon` 并行，`utils/progress.rs` 显示进度

pub mod collector;
pub mod runner;

pub use collector::FileCollector;
pub use runner::{BatchResult, BatchRunner, ProcessResult};
