//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! - `prepare`: 准备 VASP 计算目录（可生成并提交 sbatch 脚本）
//! - `parse`: 解析一个作业目录，生成 `results.json`
//! - `compose`: 用指定物理量组装单个输出节点
//! - `run`: 带错误处理和自动续算地运行 VASP
//! - `collect`: 并行解析多个作业目录并汇总为 CSV
//! - `scan-errors`: 扫描 VASP 标准输出中的已知错误
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: prepare, parse, compose, run, collect, scan_errors

pub mod collect;
pub mod compose;
pub mod parse;
pub mod prepare;
pub mod run;
pub mod scan_errors;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// vaspflow - VASP 计算的准备、解析与自动续算
#[derive(Parser)]
#[command(name = "vaspflow")]
#[command(author = "Changjiang Wu")]
#[command(version)]
#[command(about = "Prepare, parse and restart VASP calculations", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Also write logs to this file
    #[arg(long, global = true, env = "VASPFLOW_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
pub enum Commands {
    /// Write INCAR, POSCAR, POTCAR, KPOINTS and calcinfo.json into a calculation folder
    Prepare(prepare::PrepareArgs),

    /// Parse a finished calculation folder into output nodes
    Parse(parse::ParseArgs),

    /// Compose a single output node from selected quantities
    Compose(compose::ComposeArgs),

    /// Run VASP with automatic error handling and restarts
    Run(run::RunArgs),

    /// Parse many calculation folders in parallel and summarize them
    Collect(collect::CollectArgs),

    /// Scan VASP standard output for known errors
    ScanErrors(scan_errors::ScanErrorsArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["vaspflow", "parse", "job", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Parse(_)));
    }
}
