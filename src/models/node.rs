//! # 输出节点数据模型
//!
//! 节点类型标签与组装后的输出节点。节点被序列化写入 `results.json`，
//! 之后不再由本程序持有。
//!
//! ## 依赖关系
//! - 被 `parsers/node_composer.rs`, `parsers/vasp.rs`, `workchains/` 使用
//! - 使用 `models/structure.rs`, `models/kpoints.rs`, `models/array.rs`

use super::array::{ArrayEntry, NdArray};
use super::kpoints::KpointsData;
use super::structure::StructureData;
use crate::error::{Result, VaspflowError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

/// 节点类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    #[serde(rename = "dict")]
    Dict,
    #[serde(rename = "structure")]
    Structure,
    #[serde(rename = "array")]
    Array,
    #[serde(rename = "array.trajectory")]
    Trajectory,
    #[serde(rename = "array.kpoints")]
    Kpoints,
    #[serde(rename = "array.bands")]
    Bands,
    #[serde(rename = "vasp.chargedensity")]
    ChargeDensity,
    #[serde(rename = "vasp.wavefun")]
    Wavefunction,
}

impl NodeType {
    pub const ALL: [NodeType; 8] = [
        NodeType::Dict,
        NodeType::Structure,
        NodeType::Array,
        NodeType::Trajectory,
        NodeType::Kpoints,
        NodeType::Bands,
        NodeType::ChargeDensity,
        NodeType::Wavefunction,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            NodeType::Dict => "dict",
            NodeType::Structure => "structure",
            NodeType::Array => "array",
            NodeType::Trajectory => "array.trajectory",
            NodeType::Kpoints => "array.kpoints",
            NodeType::Bands => "array.bands",
            NodeType::ChargeDensity => "vasp.chargedensity",
            NodeType::Wavefunction => "vasp.wavefun",
        }
    }

    /// 组装该类型节点所需的物理量（固定顺序）
    pub fn required_quantities(&self) -> &'static [&'static str] {
        match self {
            NodeType::Dict => &[
                "total_energies",
                "maximum_force",
                "maximum_stress",
                "symmetries",
                "magnetization",
                "site_magnetization",
                "notifications",
            ],
            NodeType::Kpoints => &["kpoints"],
            NodeType::Structure => &["structure"],
            NodeType::Trajectory => &["trajectory"],
            NodeType::Bands => &["eigenvalues", "kpoints", "occupancies"],
            NodeType::ChargeDensity => &["chgcar"],
            NodeType::Wavefunction => &["wavecar"],
            NodeType::Array => &[],
        }
    }
}

impl FromStr for NodeType {
    type Err = VaspflowError;

    fn from_str(s: &str) -> Result<Self> {
        NodeType::ALL
            .iter()
            .copied()
            .find(|t| t.tag() == s)
            .ok_or_else(|| VaspflowError::UnknownNodeType(s.to_string()))
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// 通用数组节点
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayData {
    pub arrays: BTreeMap<String, ArrayEntry>,
}

impl ArrayData {
    pub fn set_array(&mut self, name: &str, value: ArrayEntry) {
        self.arrays.insert(name.to_string(), value);
    }

    /// 数组名列表
    pub fn names(&self) -> Vec<&str> {
        self.arrays.keys().map(String::as_str).collect()
    }
}

/// 轨迹节点：数值数组 + 元数据属性（如 symbols）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryData {
    pub arrays: BTreeMap<String, NdArray>,
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl TrajectoryData {
    pub fn set_array(&mut self, name: &str, value: NdArray) {
        self.arrays.insert(name.to_string(), value);
    }

    pub fn set_attribute(&mut self, name: &str, value: serde_json::Value) {
        self.attributes.insert(name.to_string(), value);
    }

    /// 轨迹步数（positions 第一维）
    pub fn num_steps(&self) -> Option<usize> {
        self.arrays.get("positions").and_then(|a| a.shape.first().copied())
    }
}

/// 能带节点：k 点 + 本征值 (+ 占据数)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandsData {
    pub kpoints: KpointsData,
    pub bands: NdArray,
    pub occupations: Option<NdArray>,
}

impl BandsData {
    /// 创建能带节点并检查本征值与 k 点、占据数的形状一致
    pub fn new(kpoints: KpointsData, bands: NdArray, occupations: Option<NdArray>) -> Result<Self> {
        let shape_error = |reason: String| VaspflowError::ComposeError {
            node_type: NodeType::Bands.tag().to_string(),
            reason,
        };

        if bands.shape.len() < 2 {
            return Err(shape_error(format!(
                "bands must have at least 2 dimensions, got shape {:?}",
                bands.shape
            )));
        }

        if let Some(nkpts) = kpoints.num_points() {
            let axis = bands.shape[bands.shape.len() - 2];
            if axis != nkpts {
                return Err(shape_error(format!(
                    "bands shape {:?} does not match {} kpoints",
                    bands.shape, nkpts
                )));
            }
        }

        if let Some(occ) = &occupations {
            if occ.shape != bands.shape {
                return Err(shape_error(format!(
                    "occupations shape {:?} differs from bands shape {:?}",
                    occ.shape, bands.shape
                )));
            }
        }

        Ok(BandsData {
            kpoints,
            bands,
            occupations,
        })
    }
}

/// 二进制文件节点（CHGCAR, WAVECAR）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileBlob {
    pub path: PathBuf,
}

/// 组装后的输出节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node_type", content = "content")]
pub enum OutputNode {
    #[serde(rename = "dict")]
    Dict(serde_json::Map<String, serde_json::Value>),
    #[serde(rename = "structure")]
    Structure(StructureData),
    #[serde(rename = "array")]
    Array(ArrayData),
    #[serde(rename = "array.trajectory")]
    Trajectory(TrajectoryData),
    #[serde(rename = "array.kpoints")]
    Kpoints(KpointsData),
    #[serde(rename = "array.bands")]
    Bands(BandsData),
    #[serde(rename = "vasp.chargedensity")]
    ChargeDensity(FileBlob),
    #[serde(rename = "vasp.wavefun")]
    Wavefunction(FileBlob),
}

impl OutputNode {
    pub fn node_type(&self) -> NodeType {
        match self {
            OutputNode::Dict(_) => NodeType::Dict,
            OutputNode::Structure(_) => NodeType::Structure,
            OutputNode::Array(_) => NodeType::Array,
            OutputNode::Trajectory(_) => NodeType::Trajectory,
            OutputNode::Kpoints(_) => NodeType::Kpoints,
            OutputNode::Bands(_) => NodeType::Bands,
            OutputNode::ChargeDensity(_) => NodeType::ChargeDensity,
            OutputNode::Wavefunction(_) => NodeType::Wavefunction,
        }
    }

    pub fn as_dict(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        match self {
            OutputNode::Dict(map) => Some(map),
            _ => None,
        }
    }

    /// 一行摘要（终端输出用）
    pub fn summary(&self) -> String {
        match self {
            OutputNode::Dict(map) => format!("{} keys", map.len()),
            OutputNode::Structure(s) => format!("{}, {} sites", s.formula(), s.sites.len()),
            OutputNode::Array(a) => a.names().join(", "),
            OutputNode::Trajectory(t) => match t.num_steps() {
                Some(n) => format!("{} steps", n),
                None => "empty".to_string(),
            },
            OutputNode::Kpoints(k) => match k {
                KpointsData::Mesh { mesh, .. } => {
                    format!("{}x{}x{} mesh", mesh[0], mesh[1], mesh[2])
                }
                KpointsData::List { .. } => {
                    format!("{} points", k.num_points().unwrap_or(0))
                }
            },
            OutputNode::Bands(b) => format!("bands {:?}", b.bands.shape),
            OutputNode::ChargeDensity(f) | OutputNode::Wavefunction(f) => {
                f.path.display().to_string()
            }
        }
    }
}
