//! # scan-errors 子命令 CLI 定义
//!
//! 扫描 VASP 标准输出中的已知错误
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/scan_errors.rs`

use clap::Args;
use std::path::PathBuf;

/// scan-errors 子命令参数
#[derive(Args, Debug)]
pub struct ScanErrorsArgs {
    /// VASP standard output file
    pub file: PathBuf,

    /// Additional error definitions (YAML)
    #[arg(long)]
    pub definitions: Option<PathBuf>,

    /// Print the records as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
