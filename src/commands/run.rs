//! # run 命令实现
//!
//! 在本机运行带错误处理与自动续算的 VASP 工作链。
//!
//! ## 依赖关系
//! - 使用 `cli/run.rs` 定义的参数
//! - 使用 `commands/prepare.rs` (build_inputs), `workchains/vasp.rs`
//! - 使用 `utils/output.rs`, `utils/progress.rs`

use super::prepare::build_inputs;
use crate::cli::run::RunArgs;
use crate::error::{Result, VaspflowError};
use crate::parsers::RESULTS_FILE;
use crate::utils::{output, progress};
use crate::workchains::{LocalLauncher, VaspWorkChain};

/// 执行 run 命令
pub fn execute(args: RunArgs) -> Result<()> {
    output::print_header("Running VASP Workchain");

    if args.max_iterations == 0 {
        return Err(VaspflowError::InvalidArgument(
            "--max-iterations must be at least 1".to_string(),
        ));
    }

    let inputs = build_inputs(&args.inputs)?;
    let launcher = LocalLauncher::new(&args.vasp_cmd)?;
    output::print_info(&format!(
        "Running '{}' for {} (at most {} calculations)",
        args.vasp_cmd,
        inputs.structure.formula(),
        args.max_iterations
    ));

    let mut workchain = VaspWorkChain::new(&args.workdir, inputs, launcher)
        .with_max_iterations(args.max_iterations)
        .with_clean_workdir(args.clean_workdir);
    let spinner = progress::create_spinner("Running VASP workchain");
    let result = workchain.run();
    spinner.finish_and_clear();
    let result = result?;

    output::print_separator();
    for (link, node) in &result.outputs {
        output::print_node(link, node);
    }
    if let Some(last) = &result.last_calculation {
        output::print_info(&format!("Last calculation: {}", last.display()));
    }
    output::print_info(&format!(
        "{} calculation(s), results in '{}'",
        result.iterations,
        args.workdir.join(RESULTS_FILE).display()
    ));
    output::print_exit_status(result.exit_status, &result.exit_message);

    if result.is_ok() {
        Ok(())
    } else {
        Err(VaspflowError::Other(format!(
            "Workchain finished with exit status {}",
            result.exit_status
        )))
    }
}
