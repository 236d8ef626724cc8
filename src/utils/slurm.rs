//! # Slurm 脚本生成与提交
//!
//! 为准备好的 VASP 计算目录生成 sbatch 脚本。调度器的标准输出直接写到
//! 解析器读取的 stdout 文件中，便于错误扫描。
//!
//! ## 依赖关系
//! - 被 `commands/prepare.rs` 使用
//! - 无外部模块依赖

use crate::error::{Result, VaspflowError};
use std::path::Path;
use std::process::Command;

/// 提交脚本文件名
pub const SUBMIT_SCRIPT: &str = "submit.sbatch";

/// Slurm 作业配置
#[derive(Debug, Clone)]
pub struct SlurmConfig {
    pub job_name: String,
    pub partition: String,
    pub constraint: Option<String>,
    pub account: Option<String>,
    pub nodes: u32,
    pub ntasks: u32,
    pub cpus_per_task: u32,
    pub mem_per_cpu: String,
    pub time_limit: String,
    pub modules: Vec<String>,
}

impl Default for SlurmConfig {
    fn default() -> Self {
        SlurmConfig {
            job_name: "vasp".to_string(),
            partition: "compute".to_string(),
            constraint: None,
            account: None,
            nodes: 1,
            ntasks: 32,
            cpus_per_task: 1,
            mem_per_cpu: "2G".to_string(),
            time_limit: "24:00:00".to_string(),
            modules: vec![],
        }
    }
}

/// 生成 sbatch 脚本内容
pub fn generate_sbatch_script(
    config: &SlurmConfig,
    workdir: &Path,
    exec_cmd: &str,
    stdout_name: &str,
) -> String {
    let mut header = vec![
        "#!/bin/bash".to_string(),
        format!("#SBATCH -J {}", config.job_name),
        format!("#SBATCH --partition {}", config.partition),
    ];
    if let Some(constraint) = &config.constraint {
        header.push(format!("#SBATCH --constraint \"{}\"", constraint));
    }
    if let Some(account) = &config.account {
        header.push(format!("#SBATCH --account {}", account));
    }
    header.extend([
        format!("#SBATCH --nodes={}", config.nodes),
        format!("#SBATCH -n {}", config.ntasks),
        format!("#SBATCH -c {}", config.cpus_per_task),
        format!("#SBATCH --mem-per-cpu {}", config.mem_per_cpu),
        format!("#SBATCH --time {}", config.time_limit),
        format!("#SBATCH -o {}", stdout_name),
        "#SBATCH -e _scheduler-stderr.txt".to_string(),
    ]);

    let module_loads = config
        .modules
        .iter()
        .map(|m| format!("module load {}", m))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"{}

set -euo pipefail

module purge 2>&1
{}

cd "{}"
echo "Running: {}"
{}
"#,
        header.join("\n"),
        module_loads,
        workdir.display(),
        exec_cmd,
        exec_cmd,
    )
}

/// 提交脚本，返回 sbatch 的输出（含作业号）
pub fn submit(script: &Path, workdir: &Path) -> Result<String> {
    let out = Command::new("sbatch")
        .arg(script)
        .current_dir(workdir)
        .output()
        .map_err(|_| VaspflowError::CommandNotFound {
            command: "sbatch".to_string(),
        })?;

    if out.status.success() {
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    } else {
        Err(VaspflowError::CommandFailed {
            command: format!("sbatch {}", script.display()),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
        })
    }
}
