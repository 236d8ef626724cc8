//! # 批量执行器
//!
//! 并行解析多个作业目录。
//!
//! ## 功能
//! - 基于 rayon 的并行迭代
//! - 进度条显示
//! - 错误收集与汇总报告
//!
//! ## 依赖关系
//! - 被 `commands/collect.rs` 调用
//! - 使用 `utils/progress.rs` 创建进度条
//! - 使用 `rayon` 进行并行计算

use crate::error::{Result, VaspflowError};
use crate::utils::progress;

use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// 单个作业的处理结果
#[derive(Debug, Clone)]
pub enum ProcessResult<T> {
    /// 处理成功
    Success(T),
    /// 跳过（如目录中没有作业上下文）
    Skipped(String),
    /// 处理失败
    Failed(String, String), // (路径, 错误信息)
}

/// 批量处理结果统计
#[derive(Debug)]
pub struct BatchResult<T> {
    /// 成功的结果，保持输入顺序
    pub items: Vec<T>,
    /// 跳过数量
    pub skipped: usize,
    /// 失败详情
    pub failures: Vec<(String, String)>,
}

impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        BatchResult {
            items: Vec::new(),
            skipped: 0,
            failures: Vec::new(),
        }
    }
}

impl<T> BatchResult<T> {
    /// 合并处理结果
    pub fn merge(&mut self, result: ProcessResult<T>) {
        match result {
            ProcessResult::Success(item) => self.items.push(item),
            ProcessResult::Skipped(_) => self.skipped += 1,
            ProcessResult::Failed(path, err) => self.failures.push((path, err)),
        }
    }

    pub fn success(&self) -> usize {
        self.items.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// 总处理数量
    pub fn total(&self) -> usize {
        self.success() + self.skipped + self.failed()
    }
}

/// 批量执行器
pub struct BatchRunner {
    /// 并行作业数
    jobs: usize,
}

impl BatchRunner {
    /// 创建新的批量执行器，`jobs = 0` 时使用全部 CPU
    pub fn new(jobs: usize) -> Self {
        let jobs = if jobs == 0 { num_cpus::get() } else { jobs };
        Self { jobs }
    }

    /// 并行处理路径列表
    pub fn run<T, F>(&self, paths: Vec<PathBuf>, processor: F) -> Result<BatchResult<T>>
    where
        T: Send,
        F: Fn(&PathBuf) -> ProcessResult<T> + Sync + Send,
    {
        let total = paths.len();
        let pb = progress::create_progress_bar(total as u64, "Parsing");

        let failed_count = AtomicUsize::new(0);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .map_err(|e| VaspflowError::Other(format!("Failed to build thread pool: {}", e)))?;
        debug!("Processing {} paths on {} threads", total, self.jobs);

        let results: Vec<ProcessResult<T>> = pool.install(|| {
            paths
                .par_iter()
                .map(|path| {
                    let result = processor(path);
                    if let ProcessResult::Failed(_, _) = &result {
                        let n = failed_count.fetch_add(1, Ordering::Relaxed) + 1;
                        pb.set_message(format!("Parsing ({} failed)", n));
                    }
                    pb.inc(1);
                    result
                })
                .collect()
        });

        pb.finish_and_clear();

        let mut batch_result = BatchResult::default();
        for result in results {
            batch_result.merge(result);
        }

        Ok(batch_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_keep_input_order() {
        let paths: Vec<PathBuf> = (0..20).map(|i| PathBuf::from(format!("job_{:02}", i))).collect();
        let result = BatchRunner::new(4)
            .run(paths, |p| {
                let name = p.display().to_string();
                match name.as_str() {
                    "job_03" => ProcessResult::Skipped(name),
                    "job_07" => ProcessResult::Failed(name, "boom".into()),
                    _ => ProcessResult::Success(name),
                }
            })
            .unwrap();

        assert_eq!(result.total(), 20);
        assert_eq!(result.success(), 18);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.failures, vec![("job_07".to_string(), "boom".to_string())]);
        assert_eq!(result.items[0], "job_00");
        assert_eq!(result.items[3], "job_04");
    }
}
