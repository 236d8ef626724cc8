//! # prepare 命令实现
//!
//! 由 INCAR/POSCAR/KPOINTS 与赝势库准备一个 VASP 计算目录。
//!
//! ## 功能
//! - 读取输入文件并组装 `VaspInputs`
//! - 校验并写出计算目录（含 `calcinfo.json`）
//! - 可选生成 sbatch 脚本并提交
//!
//! ## 依赖关系
//! - 使用 `cli/prepare.rs` 定义的参数
//! - 使用 `calcs/vasp.rs`, `config.rs`, `parsers/{incar,poscar,kpoints}.rs`
//! - 使用 `utils/slurm.rs`, `utils/output.rs`

use crate::calcs::{potentials_from_family, VaspCalculation, VaspInputs};
use crate::cli::prepare::{CalcInputArgs, PrepareArgs};
use crate::config::JobSettings;
use crate::error::{Result, VaspflowError};
use crate::parsers::incar::parse_incar_file;
use crate::parsers::kpoints::{kpoints_from_record, parse_kpoints_file};
use crate::parsers::poscar::{parse_poscar_file, structure_from_record};
use crate::utils::output;
use crate::utils::slurm::{self, generate_sbatch_script, SlurmConfig, SUBMIT_SCRIPT};

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

/// 执行 prepare 命令
pub fn execute(args: PrepareArgs) -> Result<()> {
    output::print_header("Preparing VASP Calculation");

    let mut inputs = build_inputs(&args.inputs)?;
    if let Some(restart) = &args.restart_from {
        if !restart.is_dir() {
            return Err(VaspflowError::DirectoryNotFound {
                path: restart.display().to_string(),
            });
        }
        inputs.restart_folder = Some(restart.clone());
    }

    output::print_info(&format!(
        "Structure {} with {} sites, {} potentials",
        inputs.structure.formula(),
        inputs.structure.sites.len(),
        inputs.potentials.len()
    ));

    let calc = VaspCalculation::new(inputs);
    let calcinfo = calc.prepare_for_submission(&args.workdir)?;
    output::print_success(&format!("Calculation folder '{}' is ready", args.workdir.display()));
    info!(
        "Retrieve list: {}",
        calcinfo.retrieve_list.join(", ")
    );

    if !(args.sbatch || args.submit) {
        return Ok(());
    }

    let workdir = fs::canonicalize(&args.workdir).map_err(|e| VaspflowError::read(&args.workdir, e))?;
    let config = slurm_config(&args, &workdir);
    let script = generate_sbatch_script(&config, &workdir, &args.vasp_cmd, &calcinfo.stdout_name);
    let script_path = workdir.join(SUBMIT_SCRIPT);
    fs::write(&script_path, script).map_err(|e| VaspflowError::write(&script_path, e))?;
    output::print_info(&format!("Wrote {}", script_path.display()));

    if args.submit {
        let reply = slurm::submit(&script_path, &workdir)?;
        output::print_success(&format!("Submitted: {}", reply));
    }

    Ok(())
}

/// 由命令行参数读取全部计算输入（`prepare` 与 `run` 共用）
pub(crate) fn build_inputs(args: &CalcInputArgs) -> Result<VaspInputs> {
    let mut settings = JobSettings::load_or_default(args.settings.as_deref())?;
    settings.enable_nodes(&args.add)?;

    let parameters = parse_incar_file(&args.incar)?;
    let structure = structure_from_record(&parse_poscar_file(&args.poscar)?);
    let kpoints = match &args.kpoints {
        Some(path) => Some(kpoints_from_record(&parse_kpoints_file(path)?)),
        None => None,
    };

    if !args.potcar_dir.is_dir() {
        return Err(VaspflowError::DirectoryNotFound {
            path: args.potcar_dir.display().to_string(),
        });
    }
    let mapping = parse_mapping(&args.potcar_map)?;
    let potentials = potentials_from_family(&args.potcar_dir, &structure, &mapping)?;

    for path in args.chgcar.iter().chain(args.wavecar.iter()) {
        ensure_file(path)?;
    }

    Ok(VaspInputs {
        parameters,
        structure,
        kpoints,
        potentials,
        charge_density: args.chgcar.clone(),
        wavefunctions: args.wavecar.clone(),
        restart_folder: None,
        settings,
    })
}

/// 解析 `Kind=name` 形式的赝势映射
fn parse_mapping(entries: &[String]) -> Result<BTreeMap<String, String>> {
    let mut mapping = BTreeMap::new();
    for entry in entries.iter().filter(|e| !e.trim().is_empty()) {
        let (kind, name) = entry.split_once('=').ok_or_else(|| {
            VaspflowError::InvalidArgument(format!(
                "Potential mapping '{}' must look like 'Kind=name'",
                entry
            ))
        })?;
        let (kind, name) = (kind.trim(), name.trim());
        if kind.is_empty() || name.is_empty() {
            return Err(VaspflowError::InvalidArgument(format!(
                "Potential mapping '{}' has an empty side",
                entry
            )));
        }
        mapping.insert(kind.to_string(), name.to_string());
    }
    Ok(mapping)
}

fn ensure_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(VaspflowError::FileNotFound {
            path: path.display().to_string(),
        })
    }
}

fn slurm_config(args: &PrepareArgs, workdir: &Path) -> SlurmConfig {
    let job_name = args.job_name.clone().unwrap_or_else(|| {
        workdir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "vasp".to_string())
    });
    SlurmConfig {
        job_name,
        partition: args.partition.clone(),
        constraint: args.constraint.clone(),
        account: args.account.clone(),
        nodes: args.nodes,
        ntasks: args.ntasks,
        cpus_per_task: args.cpus_per_task,
        mem_per_cpu: args.mem_per_cpu.clone(),
        time_limit: args.time.clone(),
        modules: args.modules.clone(),
    }
}
