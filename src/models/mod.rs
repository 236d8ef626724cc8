//! # 数据模型模块
//!
//! 定义结构、k 点、数组、INCAR 参数、解析值与输出节点的数据模型。
//!
//! ## 依赖关系
//! - 被 `parsers/`, `calcs/`, `workchains/`, `commands/` 使用
//! - 子模块: structure, kpoints, array, incar, value, node

pub mod array;
pub mod incar;
pub mod kpoints;
pub mod node;
pub mod structure;
pub mod value;

pub use array::{ArrayEntry, NdArray};
pub use incar::{Incar, IncarValue};
pub use kpoints::KpointsData;
pub use node::{ArrayData, BandsData, FileBlob, NodeType, OutputNode, TrajectoryData};
pub use structure::{Lattice, Site, StructureData};
pub use value::{
    ArrayMap, KpointsRecord, ParsedQuantities, ParsedValue, RawKpoint, SiteRecord, StructureRecord,
};
