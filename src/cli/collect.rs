//! # collect 子命令 CLI 定义
//!
//! 并行解析多个计算目录并汇总
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/collect.rs`

use clap::Args;
use std::path::PathBuf;

/// collect 子命令参数
#[derive(Args, Debug)]
pub struct CollectArgs {
    /// Root directory containing calculation folders
    pub root: PathBuf,

    /// Marker file that identifies a calculation folder (comma-separated globs)
    #[arg(long, default_value = "calcinfo.json")]
    pub pattern: String,

    /// Search sub-directories recursively
    #[arg(short, long, default_value_t = false)]
    pub recursive: bool,

    /// Summary CSV file
    #[arg(short, long, default_value = "summary.csv")]
    pub output: PathBuf,

    /// Also write results.json into every folder
    #[arg(long, default_value_t = false)]
    pub write_results: bool,

    /// Number of parallel jobs (0 = all CPUs)
    #[arg(short, long, default_value_t = 0)]
    pub jobs: usize,

    /// Show at most this many rows in the terminal table
    #[arg(long, default_value_t = 20)]
    pub top_n: usize,
}
