//! # run 子命令 CLI 定义
//!
//! 带错误处理与自动续算地在本机运行 VASP
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/run.rs`

use super::prepare::CalcInputArgs;
use clap::Args;
use std::path::PathBuf;

/// run 子命令参数
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Root folder; iterations run in iteration_01, iteration_02, ...
    pub workdir: PathBuf,

    #[command(flatten)]
    pub inputs: CalcInputArgs,

    /// Command that runs VASP
    #[arg(long, default_value = "mpirun vasp_std", env = "VASPFLOW_VASP_CMD")]
    pub vasp_cmd: String,

    /// Maximum number of calculations
    #[arg(long, default_value_t = crate::workchains::DEFAULT_MAX_ITERATIONS)]
    pub max_iterations: usize,

    /// Delete non-retrieved files from all iterations after success
    #[arg(long, default_value_t = false)]
    pub clean_workdir: bool,
}
