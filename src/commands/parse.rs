//! # parse 命令实现
//!
//! 解析一个已完成的计算目录，写出 `results.json`。
//!
//! ## 依赖关系
//! - 使用 `cli/parse.rs` 定义的参数
//! - 使用 `calcs/vasp.rs` (CalcInfo), `parsers/vasp.rs`, `config.rs`
//! - 使用 `utils/output.rs`, `utils/progress.rs`

use crate::calcs::{CalcInfo, CALCINFO_FILE};
use crate::cli::parse::ParseArgs;
use crate::config::{enable_nodes, JobSettings};
use crate::error::{Result, VaspflowError};
use crate::parsers::{QuantityDiagnostic, VaspParser, RESULTS_FILE};
use crate::utils::{output, progress};

use std::path::Path;
use tracing::debug;

/// 执行 parse 命令
pub fn execute(args: ParseArgs) -> Result<()> {
    output::print_header("Parsing VASP Calculation");

    if !args.workdir.is_dir() {
        return Err(VaspflowError::DirectoryNotFound {
            path: args.workdir.display().to_string(),
        });
    }

    let calcinfo = load_calcinfo(&args.workdir, args.settings.as_deref(), &args.add)?;

    let spinner = progress::create_spinner("Parsing output files");
    let outcome = VaspParser::new(&calcinfo.parser_settings, &calcinfo).parse(&args.workdir);
    spinner.finish_and_clear();
    let outcome = outcome?;

    for diagnostic in &outcome.diagnostics {
        output::print_warning(&describe_diagnostic(diagnostic));
    }
    for (link, node) in &outcome.outputs {
        output::print_node(link, node);
    }
    for notification in outcome.notifications() {
        output::print_warning(&format!("VASP: {}", notification));
    }

    let results_path = args
        .output
        .clone()
        .unwrap_or_else(|| args.workdir.join(RESULTS_FILE));
    outcome.write(&results_path)?;
    output::print_info(&format!("Results written to '{}'", results_path.display()));

    output::print_exit_status(outcome.exit_status, &outcome.exit_message);
    if outcome.is_ok() {
        Ok(())
    } else {
        Err(VaspflowError::Other(format!(
            "Parsing finished with exit status {}",
            outcome.exit_status
        )))
    }
}

/// 优先读取目录中的 `calcinfo.json`，否则由设置文件构造
pub(crate) fn load_calcinfo(
    workdir: &Path,
    settings: Option<&Path>,
    add: &[String],
) -> Result<CalcInfo> {
    let mut calcinfo = if workdir.join(CALCINFO_FILE).exists() && settings.is_none() {
        debug!("Using {} in {}", CALCINFO_FILE, workdir.display());
        CalcInfo::load(workdir)?
    } else {
        CalcInfo::from_settings(&JobSettings::load_or_default(settings)?)
    };
    enable_nodes(&mut calcinfo.parser_settings, add)?;
    Ok(calcinfo)
}

pub(crate) fn describe_diagnostic(diagnostic: &QuantityDiagnostic) -> String {
    match diagnostic {
        QuantityDiagnostic::Unknown { quantity } => {
            format!("Quantity '{}' is not known to any file parser", quantity)
        }
        QuantityDiagnostic::MissingFiles {
            quantity,
            missing,
            not_retrieved,
        } => {
            let mut msg = format!(
                "Quantity '{}' skipped, missing files: {}",
                quantity,
                missing.join(", ")
            );
            if !not_retrieved.is_empty() {
                msg.push_str(&format!(" (not in retrieve list: {})", not_retrieved.join(", ")));
            }
            msg
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_calcinfo_prefers_saved_file() {
        let dir = TempDir::new().unwrap();
        let mut saved = CalcInfo::default();
        saved.stdout_name = "vasp.out".to_string();
        saved.save(dir.path()).unwrap();

        let calcinfo = load_calcinfo(dir.path(), None, &[]).unwrap();
        assert_eq!(calcinfo.stdout_name, "vasp.out");
    }

    #[test]
    fn test_load_calcinfo_from_defaults() {
        let dir = TempDir::new().unwrap();
        let calcinfo = load_calcinfo(dir.path(), None, &["structure".to_string()]).unwrap();
        assert!(calcinfo.retrieve_list.contains(&"OUTCAR".to_string()));
        assert!(calcinfo
            .parser_settings
            .output_nodes()
            .iter()
            .any(|n| n.name == "structure"));
    }

    #[test]
    fn test_missing_outcar_fails() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("CONTCAR"), "").unwrap();
        let args = ParseArgs {
            workdir: dir.path().to_path_buf(),
            settings: None,
            add: vec![],
            output: None,
        };
        assert!(execute(args).is_err());
        let results = fs::read_to_string(dir.path().join(RESULTS_FILE)).unwrap();
        assert!(results.contains("OUTCAR"));
    }

    #[test]
    fn test_describe_diagnostic() {
        let msg = describe_diagnostic(&QuantityDiagnostic::MissingFiles {
            quantity: "structure".into(),
            missing: vec!["CONTCAR".into()],
            not_retrieved: vec!["CONTCAR".into()],
        });
        assert!(msg.contains("structure"));
        assert!(msg.contains("not in retrieve list"));
    }
}
