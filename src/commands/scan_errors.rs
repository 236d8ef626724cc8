//! # scan-errors 命令实现
//!
//! 用内置（及可选的自定义）错误定义扫描 VASP 标准输出。
//!
//! ## 依赖关系
//! - 使用 `cli/scan_errors.rs` 定义的参数
//! - 使用 `parsers/error_handling.rs`
//! - 使用 `utils/output.rs`

use crate::cli::scan_errors::ScanErrorsArgs;
use crate::error::{Result, VaspflowError};
use crate::parsers::error_handling::{load_error_definitions, ErrorRecord, ErrorScanner};
use crate::utils::output;

use colored::Colorize;
use tabled::{Table, Tabled};

/// 错误表格行
#[derive(Debug, Clone, Tabled)]
struct ErrorRow {
    #[tabled(rename = "Error")]
    shortname: String,
    #[tabled(rename = "Critical")]
    critical: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Suggestion")]
    suggestion: String,
}

impl From<&ErrorRecord> for ErrorRow {
    fn from(record: &ErrorRecord) -> Self {
        ErrorRow {
            shortname: record.shortname.clone(),
            critical: if record.critical { "yes" } else { "no" }.to_string(),
            message: record.message.clone(),
            suggestion: record.suggestion.clone().unwrap_or_default(),
        }
    }
}

/// 执行 scan-errors 命令
pub fn execute(args: ScanErrorsArgs) -> Result<()> {
    let records = scan(&args)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    output::print_header(&format!("Errors in {}", args.file.display()));
    if records.is_empty() {
        output::print_success("No known errors found");
        return Ok(());
    }

    let rows: Vec<ErrorRow> = records.iter().map(ErrorRow::from).collect();
    println!("{}", Table::new(&rows));

    let critical = records.iter().filter(|r| r.critical).count();
    if critical > 0 {
        println!(
            "{}",
            format!("{} critical error(s) found", critical).red().bold()
        );
    } else {
        output::print_warning(&format!("{} non-critical error(s) found", records.len()));
    }
    Ok(())
}

fn scan(args: &ScanErrorsArgs) -> Result<Vec<ErrorRecord>> {
    if !args.file.is_file() {
        return Err(VaspflowError::FileNotFound {
            path: args.file.display().to_string(),
        });
    }
    let mut scanner = ErrorScanner::for_stdout();
    if let Some(path) = &args.definitions {
        scanner.add_errors(load_error_definitions(path)?);
    }
    scanner.scan_file(&args.file)?;
    Ok(scanner.errors().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_finds_builtin_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vasp.out");
        fs::write(
            &path,
            " running on 4 total cores\n SBESSELITER: nicht konvergent\n",
        )
        .unwrap();

        let args = ScanErrorsArgs {
            file: path,
            definitions: None,
            json: true,
        };
        let records = scan(&args).unwrap();
        assert!(records.iter().any(|r| r.shortname == "nicht" && r.critical));
    }

    #[test]
    fn test_scan_missing_file() {
        let args = ScanErrorsArgs {
            file: "does/not/exist".into(),
            definitions: None,
            json: false,
        };
        assert!(matches!(scan(&args), Err(VaspflowError::FileNotFound { .. })));
    }
}
