//! # 可重启的计算循环
//!
//! 反复运行计算直到成功或达到最大迭代次数。每次失败后按优先级从高到低调用
//! 错误处理器，由处理器修改下一次计算的输入。
//!
//! ## 流程
//! ```text
//! while !is_finished && iteration < max_iterations:
//!     init_calculation -> run_calculation -> verify_calculation
//! results -> on_terminated
//! ```
//!
//! ## 依赖关系
//! - 被 `workchains/vasp.rs` 实现
//! - 使用 `parsers/vasp.rs` 的解析结果

use crate::error::Result;
use crate::parsers::ParseOutcome;

use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

// ─────────────────────────────────────────────────────────────
// 退出码
// ─────────────────────────────────────────────────────────────

/// 重启循环的退出码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RestartExitCode {
    NoError,
    IterationReturnedNoCalculation,
    MaximumIterationsExceeded,
    UnexpectedCalculationState,
    SecondConsecutiveUnhandledFailure,
    NoSolutionFromErrorHandlers,
    NoErrorHandlers,
    Unknown,
}

impl RestartExitCode {
    pub fn status(&self) -> u32 {
        match self {
            RestartExitCode::NoError => 0,
            RestartExitCode::IterationReturnedNoCalculation => 100,
            RestartExitCode::MaximumIterationsExceeded => 101,
            RestartExitCode::UnexpectedCalculationState => 102,
            RestartExitCode::SecondConsecutiveUnhandledFailure => 104,
            RestartExitCode::NoSolutionFromErrorHandlers => 197,
            RestartExitCode::NoErrorHandlers => 198,
            RestartExitCode::Unknown => 199,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            RestartExitCode::NoError => "the calculation finished successfully",
            RestartExitCode::IterationReturnedNoCalculation => {
                "the run_calculation step did not produce a calculation"
            }
            RestartExitCode::MaximumIterationsExceeded => {
                "the maximum number of iterations was exceeded"
            }
            RestartExitCode::UnexpectedCalculationState => {
                "the calculation finished with an unexpected calculation state"
            }
            RestartExitCode::SecondConsecutiveUnhandledFailure => {
                "the calculation failed for an unknown reason, twice in a row"
            }
            RestartExitCode::NoSolutionFromErrorHandlers => {
                "none of the error handlers could handle the failure"
            }
            RestartExitCode::NoErrorHandlers => "no error handlers are registered",
            RestartExitCode::Unknown => "unknown error detected in the restart loop",
        }
    }
}

// ─────────────────────────────────────────────────────────────
// 计算记录
// ─────────────────────────────────────────────────────────────

/// 计算进程的终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CalcState {
    /// 正常结束（不代表结果正确）
    Finished,
    /// 启动或解析时出现异常
    Excepted,
    /// 被信号终止
    Killed,
}

/// 一次已运行的计算
#[derive(Debug, Clone)]
pub struct CalculationRecord {
    pub iteration: usize,
    pub workdir: PathBuf,
    pub state: CalcState,
    /// 仅在 `Finished` 时存在
    pub outcome: Option<ParseOutcome>,
}

impl CalculationRecord {
    /// 正常结束、解析成功、VASP 运行完整且无致命错误
    pub fn is_finished_ok(&self) -> bool {
        self.state == CalcState::Finished
            && self.outcome.as_ref().is_some_and(|o| {
                o.is_ok() && o.run_finished().unwrap_or(true) && !o.has_critical_notifications()
            })
    }

    /// 解析出的错误简称
    pub fn notifications(&self) -> Vec<String> {
        self.outcome
            .as_ref()
            .map(|o| o.notifications())
            .unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────
// 错误处理器
// ─────────────────────────────────────────────────────────────

/// 错误处理器的结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorHandlerReport {
    /// 错误已被处理，可以重启
    pub is_handled: bool,
    /// 不再调用优先级更低的处理器
    pub do_break: bool,
}

impl ErrorHandlerReport {
    pub fn handled() -> Self {
        ErrorHandlerReport {
            is_handled: true,
            do_break: false,
        }
    }

    pub fn not_handled() -> Self {
        ErrorHandlerReport {
            is_handled: false,
            do_break: false,
        }
    }
}

/// 错误处理器：条件不满足时返回 None
pub struct ErrorHandler<P> {
    pub name: &'static str,
    /// 越大越先执行
    pub priority: i32,
    pub handler: fn(&mut P, &CalculationRecord) -> Option<ErrorHandlerReport>,
}

// ─────────────────────────────────────────────────────────────
// 上下文与循环
// ─────────────────────────────────────────────────────────────

/// 循环状态
#[derive(Debug, Clone)]
pub struct RestartContext {
    pub iteration: usize,
    pub is_finished: bool,
    pub unexpected_failure: bool,
    /// 作为下一次计算起点的计算（`calculations` 中的下标）
    pub restart_calc: Option<usize>,
    pub calculations: Vec<CalculationRecord>,
    pub exit_code: RestartExitCode,
}

impl Default for RestartContext {
    fn default() -> Self {
        RestartContext {
            iteration: 0,
            is_finished: false,
            unexpected_failure: false,
            restart_calc: None,
            calculations: Vec::new(),
            exit_code: RestartExitCode::NoError,
        }
    }
}

impl RestartContext {
    pub fn restart_calculation(&self) -> Option<&CalculationRecord> {
        self.restart_calc.and_then(|i| self.calculations.get(i))
    }

    /// 成功结束时最后一次计算的解析结果
    pub fn results(&self) -> Option<&ParseOutcome> {
        if !self.is_finished || self.exit_code != RestartExitCode::NoError {
            return None;
        }
        self.restart_calculation().and_then(|c| c.outcome.as_ref())
    }
}

/// 可重启的计算过程
pub trait RestartProcess: Sized {
    fn max_iterations(&self) -> usize;

    fn error_handlers(&self) -> Vec<ErrorHandler<Self>>;

    /// 每次运行前根据上下文（如 `restart_calc`）更新输入
    fn init_calculation(&mut self, ctx: &RestartContext) -> Result<()>;

    fn run_calculation(&mut self, iteration: usize) -> Result<CalculationRecord>;

    /// 对已结束计算的额外检查
    fn sanity_checks(&mut self, _calculation: &CalculationRecord) {}

    /// 循环结束后调用
    fn on_terminated(&mut self, _ctx: &RestartContext) -> Result<()> {
        Ok(())
    }
}

/// 运行重启循环
pub fn run_restart_loop<P: RestartProcess>(process: &mut P) -> Result<RestartContext> {
    let mut ctx = RestartContext::default();
    let max_iterations = process.max_iterations();
    let mut stopped = false;

    while !ctx.is_finished && ctx.iteration < max_iterations {
        process.init_calculation(&ctx)?;
        ctx.iteration += 1;
        info!("Launching calculation, iteration #{}", ctx.iteration);
        let calculation = process.run_calculation(ctx.iteration)?;
        ctx.calculations.push(calculation);

        stopped = verify_calculation(process, &mut ctx, max_iterations);
        if stopped || ctx.exit_code != RestartExitCode::NoError {
            break;
        }
    }

    if !ctx.is_finished
        && !stopped
        && ctx.exit_code == RestartExitCode::NoError
        && !ctx.calculations.is_empty()
    {
        warn!("Reached the maximum number of iterations {}", max_iterations);
        ctx.exit_code = RestartExitCode::MaximumIterationsExceeded;
    }

    if ctx.calculations.is_empty() {
        ctx.exit_code = RestartExitCode::IterationReturnedNoCalculation;
    }

    match ctx.exit_code {
        RestartExitCode::NoError if ctx.is_finished => {
            info!("Completed after {} iterations", ctx.iteration)
        }
        RestartExitCode::NoError => info!("Stopped after {} iterations", ctx.iteration),
        code => warn!("Restart loop ended with exit status {}: {}", code.status(), code.message()),
    }

    process.on_terminated(&ctx)?;
    Ok(ctx)
}

/// 分析最后一次计算，返回是否应静默停止
fn verify_calculation<P: RestartProcess>(
    process: &mut P,
    ctx: &mut RestartContext,
    max_iterations: usize,
) -> bool {
    let index = ctx.calculations.len() - 1;
    let calculation = ctx.calculations[index].clone();
    ctx.exit_code = RestartExitCode::Unknown;

    if calculation.is_finished_ok() {
        info!("Calculation #{} completed successfully", calculation.iteration);
        ctx.restart_calc = Some(index);
        ctx.is_finished = true;
        ctx.exit_code = RestartExitCode::NoError;
        return false;
    }

    if ctx.iteration > max_iterations {
        ctx.exit_code = RestartExitCode::MaximumIterationsExceeded;
        return false;
    }

    match calculation.state {
        CalcState::Killed => {
            warn!("Calculation #{} was killed", calculation.iteration);
            ctx.exit_code = RestartExitCode::NoError;
            true
        }
        CalcState::Excepted => {
            warn!("Calculation #{} excepted", calculation.iteration);
            true
        }
        CalcState::Finished if calculation.outcome.is_none() => {
            warn!("Calculation #{} finished without parse results", calculation.iteration);
            ctx.exit_code = RestartExitCode::UnexpectedCalculationState;
            false
        }
        CalcState::Finished => {
            process.sanity_checks(&calculation);
            handle_failure(process, ctx, index, &calculation);
            if ctx.exit_code != RestartExitCode::NoError {
                if ctx.unexpected_failure {
                    warn!(
                        "Failure of calculation #{} could not be handled for the second consecutive time",
                        calculation.iteration
                    );
                    ctx.exit_code = RestartExitCode::SecondConsecutiveUnhandledFailure;
                } else {
                    warn!(
                        "Failure of calculation #{} could not be handled, trying to restart",
                        calculation.iteration
                    );
                    ctx.exit_code = RestartExitCode::NoError;
                }
                ctx.unexpected_failure = true;
                ctx.restart_calc = Some(index);
            } else {
                ctx.unexpected_failure = false;
            }
            false
        }
    }
}

fn handle_failure<P: RestartProcess>(
    process: &mut P,
    ctx: &mut RestartContext,
    index: usize,
    calculation: &CalculationRecord,
) {
    let mut handlers = process.error_handlers();
    if handlers.is_empty() {
        ctx.exit_code = RestartExitCode::NoErrorHandlers;
        return;
    }
    handlers.sort_by(|a, b| b.priority.cmp(&a.priority));

    let mut is_handled = false;
    for handler in &handlers {
        let Some(report) = (handler.handler)(process, calculation) else {
            continue;
        };
        info!("({}) {}: handled = {}", handler.priority, handler.name, report.is_handled);
        if report.is_handled {
            ctx.exit_code = RestartExitCode::NoError;
            ctx.restart_calc = Some(index);
            is_handled = true;
        }
        if report.do_break {
            break;
        }
    }

    if !is_handled {
        ctx.exit_code = RestartExitCode::NoSolutionFromErrorHandlers;
    }
}
