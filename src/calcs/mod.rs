//! # 计算模块
//!
//! 把计算输入写成 VASP 计算目录，并生成供解析使用的作业上下文。
//!
//! ## 依赖关系
//! - 被 `workchains/`, `commands/` 使用
//! - 子模块: vasp

pub mod vasp;

pub use vasp::{potentials_from_family, CalcInfo, VaspCalculation, VaspInputs, CALCINFO_FILE};
