//! # k 点数据模型
//!
//! k 点节点有两种表示：显式列表（可带权重、笛卡尔或分数坐标）与自动网格。
//!
//! ## 依赖关系
//! - 被 `parsers/kpoints.rs`, `parsers/node_composer.rs`, `calcs/` 使用

use serde::{Deserialize, Serialize};

/// k 点节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "representation", rename_all = "snake_case")]
pub enum KpointsData {
    /// 显式 k 点列表
    List {
        points: Vec<[f64; 3]>,
        weights: Option<Vec<f64>>,
        cartesian: bool,
    },
    /// Monkhorst-Pack / Gamma 网格
    Mesh { mesh: [u32; 3], offset: [f64; 3] },
}

impl Default for KpointsData {
    fn default() -> Self {
        KpointsData::List {
            points: Vec::new(),
            weights: None,
            cartesian: false,
        }
    }
}

impl KpointsData {
    pub fn set_kpoints(&mut self, points: Vec<[f64; 3]>, weights: Option<Vec<f64>>, cartesian: bool) {
        *self = KpointsData::List {
            points,
            weights,
            cartesian,
        };
    }

    pub fn set_kpoints_mesh(&mut self, mesh: [u32; 3], offset: [f64; 3]) {
        *self = KpointsData::Mesh { mesh, offset };
    }

    /// 显式列表中的 k 点数，网格返回 None
    pub fn num_points(&self) -> Option<usize> {
        match self {
            KpointsData::List { points, .. } => Some(points.len()),
            KpointsData::Mesh { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setters_switch_representation() {
        let mut kp = KpointsData::default();
        kp.set_kpoints_mesh([4, 4, 4], [0.5, 0.5, 0.5]);
        assert_eq!(kp.num_points(), None);

        kp.set_kpoints(vec![[0.0, 0.0, 0.0]], Some(vec![1.0]), false);
        assert_eq!(kp.num_points(), Some(1));
    }

    #[test]
    fn test_serializes_with_representation_tag() {
        let kp = KpointsData::Mesh {
            mesh: [2, 2, 2],
            offset: [0.0, 0.0, 0.0],
        };
        let json = serde_json::to_value(&kp).unwrap();
        assert_eq!(json["representation"], "mesh");
        assert_eq!(json["mesh"], serde_json::json!([2, 2, 2]));
    }
}
