//! # VASP 工作链
//!
//! 在重启循环之上运行 VASP：每次迭代在 `iteration_NN/` 中准备输入、启动
//! VASP、解析输出；失败时由 VASP 专用的错误处理器修改 INCAR 后从上一次
//! 计算目录续算。
//!
//! ## 错误处理器（优先级从高到低）
//! - `nicht`: `LREAL = .FALSE.`
//! - `sgrcon`: `ISYM = 0`
//! - `rmm-diis` / `zpotrf`: `ALGO = Normal`
//! - 未完成的运行：直接续算
//!
//! ## 依赖关系
//! - 被 `commands/run.rs` 使用
//! - 使用 `workchains/restart.rs`, `calcs/vasp.rs`, `parsers/vasp.rs`

use super::restart::{
    run_restart_loop, CalcState, CalculationRecord, ErrorHandler, ErrorHandlerReport,
    RestartContext, RestartProcess,
};
use crate::calcs::{CalcInfo, VaspCalculation, VaspInputs, CALCINFO_FILE};
use crate::error::{Result, VaspflowError};
use crate::models::{IncarValue, OutputNode};
use crate::parsers::{VaspParser, RESULTS_FILE};

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, error, info, warn};

/// 默认最大迭代次数
pub const DEFAULT_MAX_ITERATIONS: usize = 5;

/// 调度器标准错误文件名
pub const SCHEDULER_STDERR: &str = "_scheduler-stderr.txt";

// ─────────────────────────────────────────────────────────────
// 启动器
// ─────────────────────────────────────────────────────────────

/// 在准备好的目录中运行 VASP
pub trait Launcher {
    fn launch(&self, workdir: &Path, stdout_name: &str) -> Result<CalcState>;
}

/// 在本机直接运行命令（如 `mpirun -np 16 vasp_std`）
pub struct LocalLauncher {
    program: String,
    args: Vec<String>,
}

impl LocalLauncher {
    pub fn new(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| VaspflowError::InvalidArgument("empty VASP command".to_string()))?;
        Ok(LocalLauncher {
            program,
            args: parts.collect(),
        })
    }
}

impl Launcher for LocalLauncher {
    fn launch(&self, workdir: &Path, stdout_name: &str) -> Result<CalcState> {
        let stdout_path = workdir.join(stdout_name);
        let stderr_path = workdir.join(SCHEDULER_STDERR);
        let stdout = File::create(&stdout_path).map_err(|e| VaspflowError::write(&stdout_path, e))?;
        let stderr = File::create(&stderr_path).map_err(|e| VaspflowError::write(&stderr_path, e))?;

        let status = match Command::new(&self.program)
            .args(&self.args)
            .current_dir(workdir)
            .stdout(stdout)
            .stderr(stderr)
            .status()
        {
            Ok(status) => status,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(VaspflowError::CommandNotFound {
                    command: self.program.clone(),
                })
            }
            Err(e) => {
                error!("Failed to launch {}: {}", self.program, e);
                return Ok(CalcState::Excepted);
            }
        };

        match status.code() {
            None => Ok(CalcState::Killed),
            Some(0) => Ok(CalcState::Finished),
            Some(code) => {
                warn!("{} exited with status {}", self.program, code);
                Ok(CalcState::Finished)
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────
// 结果
// ─────────────────────────────────────────────────────────────

/// 工作链的最终结果，写入根目录的 `results.json`
#[derive(Debug, Clone, Serialize)]
pub struct WorkChainResult {
    pub exit_status: u32,
    pub exit_message: String,
    pub iterations: usize,
    /// 最后一次成功计算的目录
    pub last_calculation: Option<PathBuf>,
    pub outputs: BTreeMap<String, OutputNode>,
}

impl WorkChainResult {
    fn from_context(ctx: &RestartContext) -> Self {
        WorkChainResult {
            exit_status: ctx.exit_code.status(),
            exit_message: ctx.exit_code.message().to_string(),
            iterations: ctx.iteration,
            last_calculation: ctx
                .results()
                .and(ctx.restart_calculation())
                .map(|c| c.workdir.clone()),
            outputs: ctx.results().map(|o| o.outputs.clone()).unwrap_or_default(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.exit_status == 0
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| VaspflowError::write(path, e))
    }
}

// ─────────────────────────────────────────────────────────────
// 工作链
// ─────────────────────────────────────────────────────────────

/// VASP 工作链
pub struct VaspWorkChain<L: Launcher> {
    root: PathBuf,
    inputs: VaspInputs,
    max_iterations: usize,
    clean_workdir: bool,
    launcher: L,
}

impl<L: Launcher> VaspWorkChain<L> {
    pub fn new(root: &Path, inputs: VaspInputs, launcher: L) -> Self {
        VaspWorkChain {
            root: root.to_path_buf(),
            inputs,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            clean_workdir: false,
            launcher,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_clean_workdir(mut self, clean_workdir: bool) -> Self {
        self.clean_workdir = clean_workdir;
        self
    }

    /// 下一次计算将使用的输入
    pub fn inputs(&self) -> &VaspInputs {
        &self.inputs
    }

    /// 运行到结束并写出 `results.json`
    pub fn run(&mut self) -> Result<WorkChainResult> {
        fs::create_dir_all(&self.root).map_err(|e| VaspflowError::write(&self.root, e))?;
        let ctx = run_restart_loop(self)?;
        let result = WorkChainResult::from_context(&ctx);
        result.write(&self.root.join(RESULTS_FILE))?;
        Ok(result)
    }

    fn calculation_dir(&self, iteration: usize) -> PathBuf {
        self.root.join(format!("iteration_{:02}", iteration))
    }

    /// 把 INCAR 标签设为新值，已是该值时返回 false
    fn update_parameter(&mut self, tag: &str, value: IncarValue) -> bool {
        if self.inputs.parameters.get(tag) == Some(&value) {
            return false;
        }
        info!("Setting {} = {}", tag, value.to_incar_string());
        self.inputs.parameters.set(tag, value);
        true
    }
}

impl<L: Launcher> RestartProcess for VaspWorkChain<L> {
    fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    fn error_handlers(&self) -> Vec<ErrorHandler<Self>> {
        vec![
            ErrorHandler {
                name: "handle_nicht",
                priority: 400,
                handler: handle_nicht,
            },
            ErrorHandler {
                name: "handle_sgrcon",
                priority: 350,
                handler: handle_sgrcon,
            },
            ErrorHandler {
                name: "handle_rmm_diis",
                priority: 300,
                handler: handle_rmm_diis,
            },
            ErrorHandler {
                name: "handle_unfinished",
                priority: 100,
                handler: handle_unfinished,
            },
        ]
    }

    fn init_calculation(&mut self, ctx: &RestartContext) -> Result<()> {
        let Some(previous) = ctx.restart_calculation() else {
            return Ok(());
        };
        debug!("Restarting from {}", previous.workdir.display());
        self.inputs.restart_folder = Some(previous.workdir.clone());
        // 续算目录中的 WAVECAR/CHGCAR 取代最初给定的文件
        if previous.workdir.join("WAVECAR").is_file() {
            self.inputs.wavefunctions = None;
        }
        if previous.workdir.join("CHGCAR").is_file() {
            self.inputs.charge_density = None;
        }
        if self.inputs.parameters.contains("ISTART") {
            self.inputs.parameters.set("ISTART", 1i64);
        }
        if self.inputs.parameters.contains("ICHARG") {
            self.inputs.parameters.set("ICHARG", 1i64);
        }
        Ok(())
    }

    fn run_calculation(&mut self, iteration: usize) -> Result<CalculationRecord> {
        let workdir = self.calculation_dir(iteration);
        let calcinfo = VaspCalculation::new(self.inputs.clone()).prepare_for_submission(&workdir)?;

        let state = self.launcher.launch(&workdir, &calcinfo.stdout_name)?;
        let mut record = CalculationRecord {
            iteration,
            workdir,
            state,
            outcome: None,
        };
        if state != CalcState::Finished {
            return Ok(record);
        }

        match VaspParser::new(&calcinfo.parser_settings, &calcinfo).parse(&record.workdir) {
            Ok(outcome) => {
                outcome.write(&record.workdir.join(RESULTS_FILE))?;
                record.outcome = Some(outcome);
            }
            Err(e) => {
                error!("Parsing {} failed: {}", record.workdir.display(), e);
                record.state = CalcState::Excepted;
            }
        }
        Ok(record)
    }

    fn on_terminated(&mut self, ctx: &RestartContext) -> Result<()> {
        if !self.clean_workdir || !ctx.is_finished || ctx.results().is_none() {
            debug!("Not cleaning the calculation folders");
            return Ok(());
        }
        for calculation in &ctx.calculations {
            clean_calculation_dir(&calculation.workdir)?;
        }
        info!("Cleaned {} calculation folders", ctx.calculations.len());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────
// 错误处理器
// ─────────────────────────────────────────────────────────────

fn has_notification(calculation: &CalculationRecord, names: &[&str]) -> bool {
    calculation
        .notifications()
        .iter()
        .any(|n| names.contains(&n.as_str()))
}

fn handle_nicht<L: Launcher>(
    wc: &mut VaspWorkChain<L>,
    calculation: &CalculationRecord,
) -> Option<ErrorHandlerReport> {
    if !has_notification(calculation, &["nicht"]) {
        return None;
    }
    Some(report(wc.update_parameter("LREAL", IncarValue::Bool(false))))
}

fn handle_sgrcon<L: Launcher>(
    wc: &mut VaspWorkChain<L>,
    calculation: &CalculationRecord,
) -> Option<ErrorHandlerReport> {
    if !has_notification(calculation, &["sgrcon"]) {
        return None;
    }
    Some(report(wc.update_parameter("ISYM", IncarValue::Int(0))))
}

fn handle_rmm_diis<L: Launcher>(
    wc: &mut VaspWorkChain<L>,
    calculation: &CalculationRecord,
) -> Option<ErrorHandlerReport> {
    if !has_notification(calculation, &["rmm-diis", "zpotrf"]) {
        return None;
    }
    let already_normal = matches!(
        wc.inputs.parameters.get("ALGO"),
        Some(IncarValue::Str(algo)) if algo.eq_ignore_ascii_case("normal")
    );
    if already_normal {
        return Some(ErrorHandlerReport::not_handled());
    }
    Some(report(wc.update_parameter("ALGO", IncarValue::Str("Normal".to_string()))))
}

/// VASP 未跑完且没有致命错误（如达到墙钟时间）时从该次计算续算
fn handle_unfinished<L: Launcher>(
    _wc: &mut VaspWorkChain<L>,
    calculation: &CalculationRecord,
) -> Option<ErrorHandlerReport> {
    let outcome = calculation.outcome.as_ref()?;
    if outcome.run_finished() != Some(false) || outcome.has_critical_notifications() {
        return None;
    }
    info!(
        "Calculation #{} did not finish, restarting from its folder",
        calculation.iteration
    );
    Some(ErrorHandlerReport::handled())
}

fn report(changed: bool) -> ErrorHandlerReport {
    if changed {
        ErrorHandlerReport::handled()
    } else {
        ErrorHandlerReport::not_handled()
    }
}

/// 只保留取回列表中的文件、`calcinfo.json` 和 `results.json`
fn clean_calculation_dir(dir: &Path) -> Result<()> {
    let calcinfo = CalcInfo::load(dir)?;
    let patterns: Vec<glob::Pattern> = calcinfo
        .retrieve_list
        .iter()
        .chain(calcinfo.retrieve_temporary_list.iter())
        .filter_map(|p| glob::Pattern::new(p).ok())
        .collect();

    let entries = fs::read_dir(dir).map_err(|e| VaspflowError::read(dir, e))?;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let keep = name == CALCINFO_FILE
            || name == RESULTS_FILE
            || patterns.iter().any(|p| p.matches(&name));
        if !keep {
            fs::remove_file(&path).map_err(|e| VaspflowError::write(&path, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Incar, KpointsData, Lattice, StructureData};
    use std::cell::Cell;

    const OUTCAR_DONE: &str = "   NELM   =     60;\n  free  energy   TOTEN  =       -3.50000000 eV\n  energy  without entropy=      -3.40000000  energy(sigma->0) =      -3.45000000\n General timing and accounting informations for this job:\n";
    const OUTCAR_CUT: &str = "   NELM   =     60;\n  free  energy   TOTEN  =       -3.50000000 eV\n";

    /// 按脚本写出 OUTCAR 与 stdout 的假 VASP
    struct MockLauncher {
        runs: Vec<(&'static str, &'static str)>,
        calls: Cell<usize>,
        state: CalcState,
    }

    impl MockLauncher {
        fn new(runs: Vec<(&'static str, &'static str)>) -> Self {
            MockLauncher {
                runs,
                calls: Cell::new(0),
                state: CalcState::Finished,
            }
        }
    }

    impl Launcher for MockLauncher {
        fn launch(&self, workdir: &Path, stdout_name: &str) -> Result<CalcState> {
            let i = self.calls.get().min(self.runs.len() - 1);
            self.calls.set(self.calls.get() + 1);
            let (outcar, stdout) = self.runs[i];
            fs::write(workdir.join("OUTCAR"), outcar).unwrap();
            fs::write(workdir.join(stdout_name), stdout).unwrap();
            fs::write(workdir.join("WAVECAR"), "wave").unwrap();
            fs::write(workdir.join("CHG"), "chg").unwrap();
            Ok(self.state)
        }
    }

    fn inputs(dir: &Path) -> VaspInputs {
        let potcar = dir.join("POTCAR.H");
        fs::write(&potcar, "PAW_PBE H 15Jun2001\n").unwrap();
        let mut structure = StructureData::new(Lattice::from_vectors([
            [3.0, 0.0, 0.0],
            [0.0, 3.0, 0.0],
            [0.0, 0.0, 3.0],
        ]));
        structure.append_atom([0.0, 0.0, 0.0], "H", None);
        let mut kpoints = KpointsData::default();
        kpoints.set_kpoints_mesh([1, 1, 1], [0.0; 3]);
        let mut parameters = Incar::new();
        parameters.set("ENCUT", 300i64);
        VaspInputs {
            parameters,
            structure,
            kpoints: Some(kpoints),
            potentials: BTreeMap::from([("H".to_string(), potcar)]),
            ..Default::default()
        }
    }

    #[test]
    fn test_success_on_first_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("wc");
        let launcher = MockLauncher::new(vec![(OUTCAR_DONE, "")]);
        let result = VaspWorkChain::new(&root, inputs(dir.path()), launcher).run().unwrap();

        assert!(result.is_ok());
        assert_eq!(result.iterations, 1);
        assert!(result.outputs.contains_key("misc"));
        assert_eq!(result.last_calculation, Some(root.join("iteration_01")));
        assert!(root.join(RESULTS_FILE).exists());
        assert!(root.join("iteration_01").join(RESULTS_FILE).exists());
    }

    #[test]
    fn test_nicht_sets_lreal_and_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("wc");
        let launcher = MockLauncher::new(vec![
            (OUTCAR_CUT, " SBESSELITER: nicht konvergent\n"),
            (OUTCAR_DONE, ""),
        ]);
        let mut wc = VaspWorkChain::new(&root, inputs(dir.path()), launcher);
        let result = wc.run().unwrap();

        assert!(result.is_ok());
        assert_eq!(result.iterations, 2);
        assert_eq!(wc.inputs().parameters.get("LREAL"), Some(&IncarValue::Bool(false)));
        let incar = fs::read_to_string(root.join("iteration_02").join("INCAR")).unwrap();
        assert!(incar.contains("LREAL = .FALSE."));
        // 第二次计算从第一次的目录续算
        assert_eq!(wc.inputs().restart_folder, Some(root.join("iteration_01")));
        assert!(root.join("iteration_02").join("WAVECAR").exists());
    }

    #[test]
    fn test_unfinished_restart_sets_istart_and_icharg() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("wc");
        let mut inputs = inputs(dir.path());
        inputs.parameters.set("ISTART", 0i64);
        inputs.parameters.set("ICHARG", 2i64);
        let launcher = MockLauncher::new(vec![(OUTCAR_CUT, ""), (OUTCAR_DONE, "")]);
        let mut wc = VaspWorkChain::new(&root, inputs, launcher);
        let result = wc.run().unwrap();

        assert!(result.is_ok());
        assert_eq!(result.iterations, 2);
        let incar = fs::read_to_string(root.join("iteration_02").join("INCAR")).unwrap();
        assert!(incar.contains("ISTART = 1"));
        assert!(incar.contains("ICHARG = 1"));
    }

    #[test]
    fn test_unhandled_critical_error_twice_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("wc");
        let launcher = MockLauncher::new(vec![(
            OUTCAR_DONE,
            " internal error in subroutine IBZKPT:\n",
        )]);
        let result = VaspWorkChain::new(&root, inputs(dir.path()), launcher).run().unwrap();

        assert_eq!(result.exit_status, 104);
        assert_eq!(result.iterations, 2);
        assert!(result.outputs.is_empty());
    }

    #[test]
    fn test_excepted_launch() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("wc");
        let mut launcher = MockLauncher::new(vec![(OUTCAR_DONE, "")]);
        launcher.state = CalcState::Excepted;
        let result = VaspWorkChain::new(&root, inputs(dir.path()), launcher).run().unwrap();
        assert_eq!(result.exit_status, 199);
    }

    #[test]
    fn test_clean_workdir_keeps_retrieved_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("wc");
        let launcher = MockLauncher::new(vec![(OUTCAR_DONE, "")]);
        let result = VaspWorkChain::new(&root, inputs(dir.path()), launcher)
            .with_clean_workdir(true)
            .run()
            .unwrap();
        assert!(result.is_ok());

        let calc = root.join("iteration_01");
        assert!(calc.join("OUTCAR").exists());
        assert!(calc.join(CALCINFO_FILE).exists());
        assert!(calc.join("_scheduler-stdout.txt").exists());
        assert!(!calc.join("WAVECAR").exists());
        assert!(!calc.join("CHG").exists());
    }

    #[test]
    fn test_local_launcher_rejects_empty_command() {
        assert!(matches!(
            LocalLauncher::new("   "),
            Err(VaspflowError::InvalidArgument(_))
        ));
    }
}
