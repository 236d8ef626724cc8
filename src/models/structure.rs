//! # 晶体结构数据模型
//!
//! 定义组装后的结构节点（晶胞 + 位点），坐标统一为笛卡尔坐标 (Å)。
//!
//! ## 依赖关系
//! - 被 `parsers/poscar.rs`, `parsers/node_composer.rs`, `calcs/` 使用
//! - 无外部模块依赖

use serde::{Deserialize, Serialize};

/// 晶格表示
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    /// 晶格向量矩阵 (3x3)，行向量表示 a, b, c
    /// [[a1, a2, a3], [b1, b2, b3], [c1, c2, c3]]
    pub matrix: [[f64; 3]; 3],
}

impl Lattice {
    /// 从晶格向量矩阵创建
    pub fn from_vectors(matrix: [[f64; 3]; 3]) -> Self {
        Lattice { matrix }
    }

    /// 获取晶格参数 (a, b, c, alpha, beta, gamma)
    pub fn parameters(&self) -> (f64, f64, f64, f64, f64, f64) {
        let [a_vec, b_vec, c_vec] = self.matrix;

        let a = norm(a_vec);
        let b = norm(b_vec);
        let c = norm(c_vec);

        let alpha = (dot(b_vec, c_vec) / (b * c)).acos().to_degrees();
        let beta = (dot(a_vec, c_vec) / (a * c)).acos().to_degrees();
        let gamma = (dot(a_vec, b_vec) / (a * b)).acos().to_degrees();

        (a, b, c, alpha, beta, gamma)
    }

    /// 计算晶格体积（带符号的行列式）
    pub fn volume(&self) -> f64 {
        let [a, b, c] = self.matrix;
        a[0] * (b[1] * c[2] - b[2] * c[1]) - a[1] * (b[0] * c[2] - b[2] * c[0])
            + a[2] * (b[0] * c[1] - b[1] * c[0])
    }

    /// 笛卡尔坐标转分数坐标，晶格奇异时原样返回
    pub fn to_fractional(&self, cart: [f64; 3]) -> [f64; 3] {
        let m = self.matrix;
        let det = self.volume();
        if det.abs() < 1e-10 {
            return cart;
        }

        let inv = [
            [
                (m[1][1] * m[2][2] - m[1][2] * m[2][1]) / det,
                (m[0][2] * m[2][1] - m[0][1] * m[2][2]) / det,
                (m[0][1] * m[1][2] - m[0][2] * m[1][1]) / det,
            ],
            [
                (m[1][2] * m[2][0] - m[1][0] * m[2][2]) / det,
                (m[0][0] * m[2][2] - m[0][2] * m[2][0]) / det,
                (m[0][2] * m[1][0] - m[0][0] * m[1][2]) / det,
            ],
            [
                (m[1][0] * m[2][1] - m[1][1] * m[2][0]) / det,
                (m[0][1] * m[2][0] - m[0][0] * m[2][1]) / det,
                (m[0][0] * m[1][1] - m[0][1] * m[1][0]) / det,
            ],
        ];

        // 行向量约定：cart = frac · M，因此 frac = cart · M⁻¹
        [
            cart[0] * inv[0][0] + cart[1] * inv[1][0] + cart[2] * inv[2][0],
            cart[0] * inv[0][1] + cart[1] * inv[1][1] + cart[2] * inv[2][1],
            cart[0] * inv[0][2] + cart[1] * inv[1][2] + cart[2] * inv[2][2],
        ]
    }

    /// 分数坐标转笛卡尔坐标
    pub fn to_cartesian(&self, frac: [f64; 3]) -> [f64; 3] {
        let m = self.matrix;
        [
            frac[0] * m[0][0] + frac[1] * m[1][0] + frac[2] * m[2][0],
            frac[0] * m[0][1] + frac[1] * m[1][1] + frac[2] * m[2][1],
            frac[0] * m[0][2] + frac[1] * m[1][2] + frac[2] * m[2][2],
        ]
    }
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn norm(v: [f64; 3]) -> f64 {
    dot(v, v).sqrt()
}

/// 结构中的一个位点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    /// 元素符号
    pub symbol: String,

    /// 种类名（同种元素的不同赝势/磁性设置可用不同种类名区分）
    pub kind_name: String,

    /// 笛卡尔坐标 [x, y, z] (Å)
    pub position: [f64; 3],
}

/// 结构节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureData {
    /// 晶胞
    pub cell: Lattice,

    /// 位点列表
    pub sites: Vec<Site>,
}

impl Default for StructureData {
    fn default() -> Self {
        StructureData {
            cell: Lattice::from_vectors([[0.0; 3]; 3]),
            sites: Vec::new(),
        }
    }
}

impl StructureData {
    pub fn new(cell: Lattice) -> Self {
        StructureData {
            cell,
            sites: Vec::new(),
        }
    }

    pub fn set_cell(&mut self, cell: [[f64; 3]; 3]) {
        self.cell = Lattice::from_vectors(cell);
    }

    /// 追加一个位点，`kind_name` 缺省时使用元素符号
    pub fn append_atom(&mut self, position: [f64; 3], symbol: &str, kind_name: Option<&str>) {
        self.sites.push(Site {
            symbol: symbol.to_string(),
            kind_name: kind_name.unwrap_or(symbol).to_string(),
            position,
        });
    }

    /// 按首次出现顺序列出种类名（POSCAR/POTCAR 的元素顺序）
    pub fn kind_names(&self) -> Vec<String> {
        let mut kinds: Vec<String> = Vec::new();
        for site in &self.sites {
            if !kinds.contains(&site.kind_name) {
                kinds.push(site.kind_name.clone());
            }
        }
        kinds
    }

    /// 某种类对应的元素符号
    pub fn symbol_of_kind(&self, kind_name: &str) -> Option<&str> {
        self.sites
            .iter()
            .find(|s| s.kind_name == kind_name)
            .map(|s| s.symbol.as_str())
    }

    /// 计算化学式
    pub fn formula(&self) -> String {
        use std::collections::BTreeMap;
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();

        for site in &self.sites {
            *counts.entry(site.symbol.as_str()).or_insert(0) += 1;
        }

        counts
            .into_iter()
            .map(|(el, count)| {
                if count == 1 {
                    el.to_string()
                } else {
                    format!("{}{}", el, count)
                }
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lattice_volume_cubic() {
        let lattice = Lattice::from_vectors([[5.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 5.0]]);
        assert!((lattice.volume() - 125.0).abs() < 1e-6);
    }

    #[test]
    fn test_lattice_hexagonal_parameters() {
        let s3 = 3.0_f64.sqrt();
        let lattice = Lattice::from_vectors([
            [3.0, 0.0, 0.0],
            [-1.5, 1.5 * s3, 0.0],
            [0.0, 0.0, 5.0],
        ]);
        let (a, b, c, alpha, _, gamma) = lattice.parameters();

        assert!((a - 3.0).abs() < 1e-6);
        assert!((b - 3.0).abs() < 1e-6);
        assert!((c - 5.0).abs() < 1e-6);
        assert!((alpha - 90.0).abs() < 1e-6);
        assert!((gamma - 120.0).abs() < 1e-6);
    }

    #[test]
    fn test_fractional_cartesian_inverse() {
        let lattice = Lattice::from_vectors([[4.0, 0.0, 0.0], [1.0, 3.0, 0.0], [0.5, 0.5, 6.0]]);
        let frac = [0.25, 0.5, 0.75];
        let back = lattice.to_fractional(lattice.to_cartesian(frac));
        for i in 0..3 {
            assert!((back[i] - frac[i]).abs() < 1e-10);
        }
    }

    #[test]
    fn test_kind_names_keep_first_occurrence_order() {
        let mut structure =
            StructureData::new(Lattice::from_vectors([[4.0, 0.0, 0.0], [0.0, 4.0, 0.0], [0.0, 0.0, 4.0]]));
        structure.append_atom([0.0, 0.0, 0.0], "Ti", None);
        structure.append_atom([2.0, 2.0, 0.0], "O", None);
        structure.append_atom([2.0, 0.0, 2.0], "O", None);
        structure.append_atom([0.0, 2.0, 2.0], "Fe", Some("Fe_up"));

        assert_eq!(structure.kind_names(), vec!["Ti", "O", "Fe_up"]);
        assert_eq!(structure.symbol_of_kind("Fe_up"), Some("Fe"));
        assert_eq!(structure.formula(), "FeO2Ti");
    }
}
