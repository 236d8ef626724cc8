//! # collect 命令实现
//!
//! 并行解析多个计算目录，汇总能量、最大力与错误信息。
//!
//! ## 功能
//! - 按标记文件查找计算目录
//! - 用 rayon 线程池并行解析
//! - 生成终端表格和 CSV 输出
//! - 可选在每个目录写出 `results.json`
//!
//! ## 依赖关系
//! - 使用 `cli/collect.rs` 定义的参数
//! - 使用 `batch/`, `commands/parse.rs`, `parsers/vasp.rs`
//! - 使用 `utils/output.rs`

use super::parse::load_calcinfo;
use crate::batch::{BatchRunner, FileCollector, ProcessResult};
use crate::cli::collect::CollectArgs;
use crate::error::{Result, VaspflowError};
use crate::parsers::{ParseOutcome, VaspParser, RESULTS_FILE};
use crate::utils::output;

use serde::Serialize;
use std::path::Path;
use tabled::{Table, Tabled};
use tracing::debug;

/// 一个计算目录的汇总
#[derive(Debug, Clone, Serialize)]
struct SummaryRow {
    folder: String,
    exit_status: u32,
    finished: Option<bool>,
    energy_extrapolated: Option<f64>,
    maximum_force: Option<f64>,
    notifications: String,
}

impl SummaryRow {
    fn from_outcome(folder: &Path, outcome: &ParseOutcome) -> Self {
        let misc = outcome.outputs.get("misc").and_then(|n| n.as_dict());
        let energy_extrapolated = misc
            .and_then(|d| d.get("total_energies"))
            .and_then(|e| e.get("energy_extrapolated"))
            .and_then(|v| v.as_f64());
        let maximum_force = misc
            .and_then(|d| d.get("maximum_force"))
            .and_then(|v| v.as_f64());
        SummaryRow {
            folder: folder.display().to_string(),
            exit_status: outcome.exit_status,
            finished: outcome.run_finished(),
            energy_extrapolated,
            maximum_force,
            notifications: outcome.notifications().join(";"),
        }
    }
}

/// 表格行
#[derive(Debug, Clone, Tabled)]
struct TableRow {
    #[tabled(rename = "Folder")]
    folder: String,
    #[tabled(rename = "Exit")]
    exit_status: u32,
    #[tabled(rename = "Finished")]
    finished: String,
    #[tabled(rename = "Energy (eV)")]
    energy: String,
    #[tabled(rename = "Max force (eV/Å)")]
    force: String,
    #[tabled(rename = "Notifications")]
    notifications: String,
}

impl From<&SummaryRow> for TableRow {
    fn from(row: &SummaryRow) -> Self {
        TableRow {
            folder: row.folder.clone(),
            exit_status: row.exit_status,
            finished: match row.finished {
                Some(true) => "yes".to_string(),
                Some(false) => "no".to_string(),
                None => "-".to_string(),
            },
            energy: row
                .energy_extrapolated
                .map(|e| format!("{:.6}", e))
                .unwrap_or_else(|| "-".to_string()),
            force: row
                .maximum_force
                .map(|f| format!("{:.4}", f))
                .unwrap_or_else(|| "-".to_string()),
            notifications: row.notifications.clone(),
        }
    }
}

/// 执行 collect 命令
pub fn execute(args: CollectArgs) -> Result<()> {
    output::print_header("Collecting VASP Results");

    if !args.root.is_dir() {
        return Err(VaspflowError::DirectoryNotFound {
            path: args.root.display().to_string(),
        });
    }

    let dirs = FileCollector::new(args.root.clone())
        .with_pattern(&args.pattern)?
        .recursive(args.recursive)
        .collect_dirs();
    if dirs.is_empty() {
        return Err(VaspflowError::NoFilesFound {
            pattern: args.pattern.clone(),
        });
    }
    output::print_info(&format!("Found {} calculation folders", dirs.len()));

    let write_results = args.write_results;
    let result = BatchRunner::new(args.jobs).run(dirs, |dir| summarize(dir, write_results))?;

    for (path, err) in &result.failures {
        output::print_warning(&format!("{}: {}", path, err));
    }
    output::print_info(&format!(
        "Parsed {} / {} folders ({} skipped, {} failed)",
        result.success(),
        result.total(),
        result.skipped,
        result.failed()
    ));

    if result.items.is_empty() {
        output::print_warning("No folder could be parsed.");
        return Ok(());
    }

    let table_rows: Vec<TableRow> = result.items.iter().take(args.top_n).map(TableRow::from).collect();
    println!("{}", Table::new(&table_rows));
    if result.items.len() > args.top_n {
        output::print_info(&format!("... {} more rows in the CSV", result.items.len() - args.top_n));
    }

    save_summary_csv(&result.items, &args.output)?;
    output::print_done(&format!("Summary saved to '{}'", args.output.display()));

    Ok(())
}

/// 解析单个目录
fn summarize(dir: &Path, write_results: bool) -> ProcessResult<SummaryRow> {
    let folder = dir.display().to_string();
    let calcinfo = match load_calcinfo(dir, None, &[]) {
        Ok(c) => c,
        Err(e) => return ProcessResult::Failed(folder, e.to_string()),
    };

    let outcome = match VaspParser::new(&calcinfo.parser_settings, &calcinfo).parse(dir) {
        Ok(o) => o,
        Err(e) => return ProcessResult::Failed(folder, e.to_string()),
    };
    debug!("{}: exit status {}", folder, outcome.exit_status);

    if write_results {
        if let Err(e) = outcome.write(&dir.join(RESULTS_FILE)) {
            return ProcessResult::Failed(folder, e.to_string());
        }
    }

    ProcessResult::Success(SummaryRow::from_outcome(dir, &outcome))
}

/// 保存汇总到 CSV
fn save_summary_csv(rows: &[SummaryRow], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush().map_err(|e| VaspflowError::write(output_path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calcs::CalcInfo;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_collect_writes_summary() {
        let dir = TempDir::new().unwrap();
        for name in ["a", "b"] {
            let calc = dir.path().join(name);
            fs::create_dir_all(&calc).unwrap();
            CalcInfo::default().save(&calc).unwrap();
        }
        fs::create_dir_all(dir.path().join("not_a_calc")).unwrap();

        let output = dir.path().join("summary.csv");
        let args = CollectArgs {
            root: dir.path().to_path_buf(),
            pattern: "calcinfo.json".to_string(),
            recursive: false,
            output: output.clone(),
            write_results: true,
            jobs: 2,
            top_n: 20,
        };
        execute(args).unwrap();

        let csv = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("folder,exit_status"));
        // 没有 OUTCAR：关键文件缺失
        assert!(lines[1].contains(",200,"));
        assert!(dir.path().join("a").join(RESULTS_FILE).exists());
    }

    #[test]
    fn test_collect_no_folders() {
        let dir = TempDir::new().unwrap();
        let args = CollectArgs {
            root: dir.path().to_path_buf(),
            pattern: "calcinfo.json".to_string(),
            recursive: true,
            output: dir.path().join("summary.csv"),
            write_results: false,
            jobs: 1,
            top_n: 5,
        };
        assert!(matches!(
            execute(args),
            Err(VaspflowError::NoFilesFound { .. })
        ));
    }
}
