//! # parse 子命令 CLI 定义
//!
//! 解析一个计算目录
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/parse.rs`

use clap::Args;
use std::path::PathBuf;

/// parse 子命令参数
#[derive(Args, Debug)]
pub struct ParseArgs {
    /// Calculation folder with the retrieved files
    pub workdir: PathBuf,

    /// Job settings file, used when the folder has no calcinfo.json
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Enable additional output nodes, e.g. 'structure,bands'
    #[arg(long, value_delimiter = ',')]
    pub add: Vec<String>,

    /// Where to write the results (default: <workdir>/results.json)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
