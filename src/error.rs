//! # 统一错误处理模块
//!
//! 定义 vaspflow 的所有错误类型，使用 `thiserror` 派生。
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 无外部模块依赖

use thiserror::Error;

/// vaspflow 统一错误类型
#[derive(Error, Debug)]
pub enum VaspflowError {
    // ─────────────────────────────────────────────────────────────
    // I/O 错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ─────────────────────────────────────────────────────────────
    // 解析错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to parse {format} file: {path}\nReason: {reason}")]
    ParseError {
        format: String,
        path: String,
        reason: String,
    },

    // ─────────────────────────────────────────────────────────────
    // 物理量与节点组装错误
    // ─────────────────────────────────────────────────────────────
    #[error("Unknown node type: '{0}'")]
    UnknownNodeType(String),

    #[error(
        "The quantity '{quantity}' defined in '{file_name}' has already been defined by another file parser. \
         Quantity names must be unique; declare one as an alternative of the other if they are equivalent."
    )]
    DuplicateQuantity { quantity: String, file_name: String },

    #[error("Cannot compose {node_type} node: {reason}")]
    ComposeError { node_type: String, reason: String },

    // ─────────────────────────────────────────────────────────────
    // 计算准备错误
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid calculation input: {0}")]
    ValidationError(String),

    #[error("No POTCAR available for kind '{kind}'")]
    MissingPotential { kind: String },

    // ─────────────────────────────────────────────────────────────
    // 外部命令错误
    // ─────────────────────────────────────────────────────────────
    #[error("External command '{command}' not found in PATH")]
    CommandNotFound { command: String },

    #[error("External command failed: {command}\n{stderr}")]
    CommandFailed { command: String, stderr: String },

    // ─────────────────────────────────────────────────────────────
    // 参数与配置错误
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid settings file {path}: {reason}")]
    ConfigError { path: String, reason: String },

    // ─────────────────────────────────────────────────────────────
    // 序列化错误
    // ─────────────────────────────────────────────────────────────
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // 其他
    // ─────────────────────────────────────────────────────────────
    #[error("No matching files found with pattern: {pattern}")]
    NoFilesFound { pattern: String },

    #[error("{0}")]
    Other(String),
}

impl VaspflowError {
    /// 构造文件读取错误
    pub fn read(path: &std::path::Path, source: std::io::Error) -> Self {
        VaspflowError::FileReadError {
            path: path.display().to_string(),
            source,
        }
    }

    /// 构造文件写入错误
    pub fn write(path: &std::path::Path, source: std::io::Error) -> Self {
        VaspflowError::FileWriteError {
            path: path.display().to_string(),
            source,
        }
    }

    /// 构造解析错误
    pub fn parse(format: &str, path: impl Into<String>, reason: impl Into<String>) -> Self {
        VaspflowError::ParseError {
            format: format.to_string(),
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, VaspflowError>;
