//! # 解析值数据模型
//!
//! 文件解析器产出的原始物理量。节点组装器把它们映射为结构化输出节点。
//!
//! ## 依赖关系
//! - 被 `parsers/file_parsers/`, `parsers/node_composer.rs` 使用
//! - 使用 `models/array.rs`

use super::array::{ArrayEntry, NdArray};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// 原始位点记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRecord {
    /// 笛卡尔坐标 (Å)
    pub position: [f64; 3],
    pub symbol: String,
    pub kind_name: String,
}

/// 原始结构记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureRecord {
    pub unitcell: [[f64; 3]; 3],
    pub sites: Vec<SiteRecord>,
}

/// 单个显式 k 点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawKpoint {
    pub point: [f64; 3],
    pub weight: Option<f64>,
    /// true 表示倒格子分数坐标，false 表示笛卡尔坐标
    pub direct: bool,
}

/// 原始 k 点记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum KpointsRecord {
    Explicit { points: Vec<RawKpoint> },
    Automatic { divisions: [u32; 3], shifts: [f64; 3] },
}

/// 命名数组表（有序）
pub type ArrayMap = BTreeMap<String, ArrayEntry>;

/// 文件解析器产出的一个物理量
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParsedValue {
    Json(serde_json::Value),
    Structure(StructureRecord),
    Kpoints(KpointsRecord),
    Arrays(ArrayMap),
    Array(NdArray),
    /// 二进制大文件（CHGCAR, WAVECAR）只传递路径
    File(PathBuf),
}

impl ParsedValue {
    /// 转换为 JSON，用于 dict 节点
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ParsedValue::Json(value) => value.clone(),
            other => serde_json::to_value(other).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// 当前作业的解析结果表：物理量名 -> 值
pub type ParsedQuantities = BTreeMap<String, ParsedValue>;
