//! # 日志初始化
//!
//! 基于 `tracing-subscriber`：stderr 输出紧凑格式，可选同时写入日志文件。
//! `-v` 次数决定级别，`-q` 关闭日志，设置了 `RUST_LOG` 时以其为准。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `tracing-subscriber` crate

use crate::error::{Result, VaspflowError};
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

/// 由命令行参数得到日志级别
pub fn level_for(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::OFF;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// 初始化全局日志
pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    // RUST_LOG 优先于 -v/-q
    let filter = EnvFilter::builder()
        .with_default_directive(level_for(verbosity, quiet).into())
        .from_env_lossy();

    let subscriber = tracing_subscriber::registry().with(filter).with(stderr_layer);

    if let Some(path) = log_file {
        let file = File::create(path).map_err(|e| VaspflowError::write(path, e))?;
        let file_layer = fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(true);
        subscriber.with(file_layer).init();
    } else {
        subscriber.init();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_level_for() {
        assert_eq!(level_for(0, false), LevelFilter::WARN);
        assert_eq!(level_for(2, false), LevelFilter::DEBUG);
        assert_eq!(level_for(7, false), LevelFilter::TRACE);
        assert_eq!(level_for(3, true), LevelFilter::OFF);
    }

    #[test]
    fn test_file_layer_writes_messages() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("vaspflow.log");

        let file = File::create(&log_path).unwrap();
        let subscriber = tracing_subscriber::registry()
            .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false));
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("quantity dos was skipped");
        });

        let content = std::fs::read_to_string(log_path).unwrap();
        assert!(content.contains("quantity dos was skipped"));
        assert!(content.contains("WARN"));
    }

    #[test]
    fn test_invalid_log_file_is_error() {
        let dir = PathBuf::from("/");
        if cfg!(unix) && dir.is_dir() {
            assert!(matches!(
                setup_logging(0, false, Some(&dir)),
                Err(VaspflowError::FileWriteError { .. })
            ));
        }
    }
}
