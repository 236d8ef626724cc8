//! # 解析器模块
//!
//! VASP 输入/输出文件的读写，以及把输出文件解析为结构化输出节点的整套流程。
//!
//! ## 流程
//! ```text
//! settings ──> quantity (注册表) ──> manager (物理量选择)
//!                                        │
//!            file_parsers (按需解析) <────┘
//!                    │
//!              node_composer (组装节点) ──> vasp (退出码, results.json)
//! ```
//!
//! ## 依赖关系
//! - 被 `calcs/`, `workchains/`, `commands/` 使用
//! - 使用 `models/` 数据模型
//! - 子模块: poscar, kpoints, incar, file_parsers, quantity, manager,
//!   node_composer, settings, error_handling, vasp

pub mod error_handling;
pub mod file_parsers;
pub mod incar;
pub mod kpoints;
pub mod manager;
pub mod node_composer;
pub mod poscar;
pub mod quantity;
pub mod settings;
pub mod vasp;

pub use manager::{ParserManager, QuantityDiagnostic, RetrieveLists};
pub use node_composer::NodeComposer;
pub use quantity::{ParsableQuantities, ParsableQuantity};
pub use settings::ParserSettings;
pub use vasp::{ParseOutcome, ParserExitCode, VaspParser, RESULTS_FILE};
