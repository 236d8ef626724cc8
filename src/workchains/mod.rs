//! # 工作链模块
//!
//! 带错误处理与自动续算的 VASP 运行。
//!
//! ## 依赖关系
//! - 被 `commands/run.rs` 使用
//! - 使用 `calcs/`, `parsers/`
//! - 子模块: restart, vasp

pub mod restart;
pub mod vasp;

pub use restart::{CalcState, RestartExitCode};
pub use vasp::{Launcher, LocalLauncher, VaspWorkChain, WorkChainResult, DEFAULT_MAX_ITERATIONS};
