//! # VASP 错误扫描
//!
//! 用正则逐行扫描 VASP 标准输出（或 OUTCAR），收集已知错误。
//!
//! ## 功能
//! - 内置常见错误（ZPOTRF, RMM-DIIS, SBESSELITER, SGRCON, IBZKPT）
//! - 通用错误：匹配 `FAIL…`, `WARN…`, `BAD…`，非致命，消息取匹配文本
//! - 可从 YAML 文件追加错误定义
//!
//! ## 依赖关系
//! - 被 `parsers/file_parsers/stdout.rs`, `commands/scan_errors.rs` 使用
//! - 使用 `regex`, `serde_yaml`

use crate::error::{Result, VaspflowError};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::BufRead;
use std::path::Path;

/// 错误出现的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorLocation {
    Stdout,
    Outcar,
}

/// 一次错误命中
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ErrorRecord {
    pub shortname: String,
    pub message: String,
    pub critical: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// VASP 错误定义
#[derive(Debug, Clone)]
pub struct VaspError {
    regex: Regex,
    pub shortname: String,
    /// None 表示以匹配文本作为消息（通用错误）
    pub message: Option<String>,
    pub location: ErrorLocation,
    pub critical: bool,
    pub suggestion: Option<String>,
}

impl VaspError {
    pub fn new(
        pattern: &str,
        shortname: &str,
        message: &str,
        location: ErrorLocation,
        critical: bool,
        suggestion: Option<&str>,
    ) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| VaspflowError::InvalidArgument(format!("Invalid error regex '{}': {}", pattern, e)))?;
        Ok(VaspError {
            regex,
            shortname: shortname.to_string(),
            message: Some(message.to_string()),
            location,
            critical,
            suggestion: suggestion.map(str::to_string),
        })
    }

    /// 通用错误：大小写不敏感，非致命
    pub fn general() -> Self {
        VaspError {
            regex: GENERAL_REGEX.clone(),
            shortname: "general".to_string(),
            message: None,
            location: ErrorLocation::Stdout,
            critical: false,
            suggestion: None,
        }
    }

    /// 检查单行，命中时返回错误记录
    pub fn check_line(&self, line: &str) -> Option<ErrorRecord> {
        let mch = self.regex.find(line)?;
        let message = match &self.message {
            Some(m) => m.clone(),
            None => mch.as_str().trim_end().to_string(),
        };
        Some(ErrorRecord {
            shortname: self.shortname.clone(),
            message,
            critical: self.critical,
            suggestion: self.suggestion.clone(),
        })
    }
}

static GENERAL_REGEX: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"(FAIL.*$)|(WARN.*$)|(BAD.*)")
        .case_insensitive(true)
        .build()
        .expect("general error regex is valid")
});

/// 内置错误列表
pub fn builtin_errors() -> Vec<VaspError> {
    let defs: [(&str, &str, &str, Option<&str>); 5] = [
        ("LAPACK: Routine ZPOTRF", "zpotrf", "Error in Lapack ZPOTRF", Some("ALGO = Normal")),
        ("WARNING in EDDRMM", "rmm-diis", "RMM-DIIS error", Some("ALGO = Normal")),
        ("SBESSELITER: nicht", "nicht", "Error, try set LREAL = False", Some("LREAL = .FALSE.")),
        (
            "internal error in subroutine SGRCON:",
            "sgrcon",
            "Symmetry related Error",
            Some("ISYM = 0"),
        ),
        (
            "internal error in subroutine IBZKPT",
            "ibzkpt",
            "Error in k-point generation",
            None,
        ),
    ];

    let mut errors: Vec<VaspError> = defs
        .iter()
        .filter_map(|(pattern, shortname, message, suggestion)| {
            VaspError::new(pattern, shortname, message, ErrorLocation::Stdout, true, *suggestion).ok()
        })
        .collect();
    errors.push(VaspError::general());
    errors
}

/// YAML 中的错误定义
#[derive(Debug, Deserialize)]
struct ErrorDefinition {
    regex: String,
    shortname: String,
    message: String,
    #[serde(default = "default_location")]
    location: ErrorLocation,
    #[serde(default = "default_critical")]
    critical: bool,
    #[serde(default)]
    suggestion: Option<String>,
}

fn default_location() -> ErrorLocation {
    ErrorLocation::Stdout
}

fn default_critical() -> bool {
    true
}

/// 从 YAML 文件读取额外的错误定义
pub fn load_error_definitions(path: &Path) -> Result<Vec<VaspError>> {
    let content = fs::read_to_string(path).map_err(|e| VaspflowError::read(path, e))?;
    let defs: Vec<ErrorDefinition> =
        serde_yaml::from_str(&content).map_err(|e| VaspflowError::ConfigError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    defs.into_iter()
        .map(|d| {
            VaspError::new(
                &d.regex,
                &d.shortname,
                &d.message,
                d.location,
                d.critical,
                d.suggestion.as_deref(),
            )
        })
        .collect()
}

/// 错误扫描器
#[derive(Debug)]
pub struct ErrorScanner {
    errors: Vec<VaspError>,
    location: ErrorLocation,
    found: Vec<ErrorRecord>,
}

impl ErrorScanner {
    pub fn new(errors: Vec<VaspError>, location: ErrorLocation) -> Self {
        ErrorScanner {
            errors,
            location,
            found: Vec::new(),
        }
    }

    /// 使用内置错误扫描标准输出
    pub fn for_stdout() -> Self {
        ErrorScanner::new(builtin_errors(), ErrorLocation::Stdout)
    }

    pub fn add_errors(&mut self, extra: Vec<VaspError>) {
        self.errors.extend(extra);
    }

    /// 扫描所有行，同一记录只保留一次
    pub fn scan<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            let line = line.as_ref();
            for error in self.errors.iter().filter(|e| e.location == self.location) {
                if let Some(record) = error.check_line(line) {
                    if !self.found.contains(&record) {
                        self.found.push(record);
                    }
                }
            }
        }
    }

    /// 扫描文件
    pub fn scan_file(&mut self, path: &Path) -> Result<()> {
        let file = fs::File::open(path).map_err(|e| VaspflowError::read(path, e))?;
        let reader = std::io::BufReader::new(file);
        self.scan(reader.lines().map_while(|l| l.ok()));
        Ok(())
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.found
    }

    pub fn has_critical(&self) -> bool {
        self.found.iter().any(|e| e.critical)
    }

    pub fn has_error(&self) -> bool {
        !self.found.is_empty()
    }

    pub fn n_errors(&self) -> usize {
        self.found.len()
    }
}
