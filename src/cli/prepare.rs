//! # prepare 子命令 CLI 定义
//!
//! 准备 VASP 计算目录，可选生成并提交 Slurm 脚本
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs`, `cli/run.rs` 使用
//! - 参数传递给 `commands/prepare.rs`

use clap::Args;
use std::path::PathBuf;

/// 计算输入（`prepare` 与 `run` 共用）
#[derive(Args, Debug, Clone)]
pub struct CalcInputArgs {
    /// INCAR file with the VASP parameters
    #[arg(long)]
    pub incar: PathBuf,

    /// POSCAR file with the input structure
    #[arg(long)]
    pub poscar: PathBuf,

    /// KPOINTS file (may be omitted when KSPACING and KGAMMA are set)
    #[arg(long)]
    pub kpoints: Option<PathBuf>,

    /// Potential family directory containing <name>/POTCAR
    #[arg(long, env = "VASPFLOW_POTCAR_DIR")]
    pub potcar_dir: PathBuf,

    /// Potential mapping, e.g. 'Fe=Fe_pv,O=O_s'
    #[arg(long, value_delimiter = ',')]
    pub potcar_map: Vec<String>,

    /// Job settings file (TOML)
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// CHGCAR to start from
    #[arg(long)]
    pub chgcar: Option<PathBuf>,

    /// WAVECAR to start from
    #[arg(long)]
    pub wavecar: Option<PathBuf>,

    /// Enable additional output nodes, e.g. 'structure,bands'
    #[arg(long, value_delimiter = ',')]
    pub add: Vec<String>,
}

/// prepare 子命令参数
#[derive(Args, Debug)]
pub struct PrepareArgs {
    /// Calculation folder to create
    pub workdir: PathBuf,

    #[command(flatten)]
    pub inputs: CalcInputArgs,

    /// Copy restart files from a previous calculation folder
    #[arg(long)]
    pub restart_from: Option<PathBuf>,

    // ─────────────────────────────────────────────────────────────
    // Slurm options
    // ─────────────────────────────────────────────────────────────
    /// Write a submit.sbatch script into the folder
    #[arg(long, default_value_t = false)]
    pub sbatch: bool,

    /// Submit the script with sbatch (implies --sbatch)
    #[arg(long, default_value_t = false)]
    pub submit: bool,

    /// Command that runs VASP inside the job
    #[arg(long, default_value = "srun vasp_std")]
    pub vasp_cmd: String,

    /// Slurm job name (defaults to the folder name)
    #[arg(long)]
    pub job_name: Option<String>,

    /// Slurm partition
    #[arg(long, default_value = "compute")]
    pub partition: String,

    /// Slurm constraint
    #[arg(long)]
    pub constraint: Option<String>,

    /// Slurm account
    #[arg(long)]
    pub account: Option<String>,

    /// Number of nodes
    #[arg(long, default_value_t = 1)]
    pub nodes: u32,

    /// Number of tasks
    #[arg(long, default_value_t = 32)]
    pub ntasks: u32,

    /// CPUs per task
    #[arg(long, default_value_t = 1)]
    pub cpus_per_task: u32,

    /// Memory per CPU
    #[arg(long, default_value = "2G")]
    pub mem_per_cpu: String,

    /// Time limit (e.g., '24:00:00')
    #[arg(long, default_value = "24:00:00")]
    pub time: String,

    /// Modules to load (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub modules: Vec<String>,
}
