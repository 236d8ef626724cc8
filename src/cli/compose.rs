//! # compose 子命令 CLI 定义
//!
//! 用指定物理量组装单个输出节点
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/compose.rs`

use clap::Args;
use std::path::PathBuf;

/// compose 子命令参数
#[derive(Args, Debug)]
pub struct ComposeArgs {
    /// Calculation folder with the retrieved files
    pub workdir: PathBuf,

    /// Node type: dict, structure, array, array.trajectory, array.kpoints,
    /// array.bands, vasp.chargedensity, vasp.wavefun
    #[arg(short = 't', long = "type")]
    pub node_type: String,

    /// Quantities to compose (default: the node type's standard quantities)
    #[arg(long, value_delimiter = ',')]
    pub quantities: Vec<String>,

    /// Compose from this single file only (e.g. CONTCAR) instead of
    /// parsing all retrieved files
    #[arg(long = "file", value_name = "NAME")]
    pub file: Option<String>,

    /// Parser for --file when its name is not in the file parser set
    /// (outcar, poscar, kpoints, eigenval, xdatcar, chgcar, wavecar, stdout)
    #[arg(long, requires = "file")]
    pub parser: Option<String>,

    /// Write the node as JSON to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
