//! # 作业目录收集器
//!
//! 在根目录下查找含有指定标记文件（默认 `calcinfo.json`）的作业目录。
//!
//! ## 功能
//! - 支持单个作业目录和根目录输入
//! - glob 模式匹配标记文件名
//! - 递归目录搜索
//!
//! ## 依赖关系
//! - 被 `commands/collect.rs` 调用
//! - 使用 `walkdir` 遍历目录, `glob` 匹配文件名

use crate::error::{Result, VaspflowError};
use glob::Pattern;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 作业目录收集器
pub struct FileCollector {
    /// 输入路径
    input: PathBuf,
    /// 标记文件模式列表
    patterns: Vec<Pattern>,
    /// 是否递归
    recursive: bool,
}

impl FileCollector {
    /// 创建新的收集器
    pub fn new(input: PathBuf) -> Self {
        Self {
            input,
            patterns: Vec::new(),
            recursive: false,
        }
    }

    /// 设置标记文件模式（逗号分隔的多模式）
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self> {
        self.patterns = pattern
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                Pattern::new(s)
                    .map_err(|e| VaspflowError::InvalidArgument(format!("bad pattern '{}': {}", s, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self)
    }

    /// 设置是否递归搜索
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// 收集所有包含标记文件的目录，按路径排序
    pub fn collect_dirs(&self) -> Vec<PathBuf> {
        if !self.input.is_dir() {
            return vec![];
        }
        if self.contains_marker(&self.input) {
            return vec![self.input.clone()];
        }

        let max_depth = if self.recursive { usize::MAX } else { 1 };

        let mut dirs: Vec<PathBuf> = WalkDir::new(&self.input)
            .min_depth(1)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .filter(|e| self.contains_marker(e.path()))
            .map(|e| e.path().to_path_buf())
            .collect();
        dirs.sort();
        dirs
    }

    /// 目录下是否有匹配任一模式的文件
    fn contains_marker(&self, dir: &Path) -> bool {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return false;
        };
        entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .any(|e| {
                let name = e.file_name();
                let name = name.to_string_lossy();
                self.patterns.iter().any(|p| p.matches(&name))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_collect_job_dirs() {
        let root = tempfile::tempdir().unwrap();
        for job in ["Si/relax", "Si/static", "GaAs"] {
            let dir = root.path().join(job);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("calcinfo.json"), "{}").unwrap();
        }
        fs::create_dir_all(root.path().join("notes")).unwrap();

        let flat = FileCollector::new(root.path().to_path_buf())
            .with_pattern("calcinfo.json")
            .unwrap()
            .collect_dirs();
        assert_eq!(flat, vec![root.path().join("GaAs")]);

        let all = FileCollector::new(root.path().to_path_buf())
            .with_pattern("calcinfo.json")
            .unwrap()
            .recursive(true)
            .collect_dirs();
        assert_eq!(all.len(), 3);
        assert_eq!(all[1], root.path().join("Si/relax"));
    }

    #[test]
    fn test_single_job_dir_and_glob_patterns() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("OUTCAR"), "").unwrap();

        let dirs = FileCollector::new(root.path().to_path_buf())
            .with_pattern("calcinfo.json, OUT*")
            .unwrap()
            .collect_dirs();
        assert_eq!(dirs, vec![root.path().to_path_buf()]);

        assert!(FileCollector::new(root.path().to_path_buf())
            .with_pattern("[")
            .is_err());
    }
}
