//! # 命令执行模块
//!
//! 实现各子命令的业务逻辑。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `cli/`, `calcs/`, `parsers/`, `workchains/`, `batch/`, `utils/`
//! - 子模块: prepare, parse, compose, run, collect, scan_errors

pub mod collect;
pub mod compose;
pub mod parse;
pub mod prepare;
pub mod run;
pub mod scan_errors;

use crate::cli::Commands;
use crate::error::Result;

/// 执行命令
pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Prepare(args) => prepare::execute(args),
        Commands::Parse(args) => parse::execute(args),
        Commands::Compose(args) => compose::execute(args),
        Commands::Run(args) => run::execute(args),
        Commands::Collect(args) => collect::execute(args),
        Commands::ScanErrors(args) => scan_errors::execute(args),
    }
}
