//! # vaspflow - VASP 计算的准备、解析与自动续算
//!
//! 把 VASP 计算的输入准备、输出解析与错误处理续算统一成单一可执行文件。
//!
//! ## 子命令
//! - `prepare` - 准备计算目录，可生成并提交 sbatch 脚本
//! - `parse` - 解析计算目录，生成 `results.json`
//! - `compose` - 组装单个输出节点
//! - `run` - 带错误处理与自动续算地运行 VASP
//! - `collect` - 并行解析多个计算目录并汇总
//! - `scan-errors` - 扫描标准输出中的已知错误
//!
//! ## 依赖关系
//! ```text
//! main.rs
//!   ├── cli/        (命令行参数定义)
//!   ├── commands/   (命令执行逻辑)
//!   │     ├── workchains/ (续算循环与错误处理器)
//!   │     ├── calcs/      (输入校验与计算目录准备)
//!   │     ├── parsers/    (文件解析与节点组装)
//!   │     ├── batch/      (并行批处理)
//!   │     └── models/     (数据模型)
//!   ├── config.rs   (作业设置)
//!   ├── utils/      (工具函数)
//!   └── error.rs    (错误处理)
//! ```

mod batch;
mod calcs;
mod cli;
mod commands;
mod config;
mod error;
mod models;
mod parsers;
mod utils;
mod workchains;

use clap::Parser;
use cli::Cli;

fn main() {
    // Initialize colored output for Windows compatibility
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();

    if let Err(e) = utils::logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.as_deref()) {
        utils::output::print_error(&format!("{}", e));
        std::process::exit(1);
    }

    if let Err(e) = commands::run(cli.command) {
        utils::output::print_error(&format!("{}", e));
        std::process::exit(1);
    }
}
