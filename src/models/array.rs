//! # 数组数据模型
//!
//! 轻量的 n 维浮点数组（行优先存储），用于力、应力、本征值、轨迹等。
//!
//! ## 依赖关系
//! - 被 `models/value.rs`, `models/node.rs`, `parsers/` 使用

use crate::error::{Result, VaspflowError};
use serde::{Deserialize, Serialize};

/// 行优先存储的 n 维数组
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NdArray {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl NdArray {
    /// 创建数组并检查形状与数据长度一致
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(VaspflowError::Other(format!(
                "Array shape {:?} requires {} values, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(NdArray { shape, data })
    }

    /// 一维数组
    pub fn from_vec(data: Vec<f64>) -> Self {
        NdArray {
            shape: vec![data.len()],
            data,
        }
    }

    /// N x 3 数组
    pub fn from_rows(rows: &[[f64; 3]]) -> Self {
        NdArray {
            shape: vec![rows.len(), 3],
            data: rows.iter().flat_map(|r| r.iter().copied()).collect(),
        }
    }

    /// 按多维下标取值
    pub fn get(&self, index: &[usize]) -> Option<f64> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut flat = 0;
        for (i, (&idx, &dim)) in index.iter().zip(self.shape.iter()).enumerate() {
            if idx >= dim {
                return None;
            }
            let stride: usize = self.shape[i + 1..].iter().product();
            flat += idx * stride;
        }
        self.data.get(flat).copied()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// 命名数组表中的一项：数值数组或字符串标签列表（如元素符号）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArrayEntry {
    Numeric(NdArray),
    Labels(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_mismatched_shape() {
        assert!(NdArray::new(vec![2, 3], vec![0.0; 5]).is_err());
        assert!(NdArray::new(vec![2, 3], vec![0.0; 6]).is_ok());
    }

    #[test]
    fn test_get_row_major() {
        let arr = NdArray::new(vec![2, 2, 2], (0..8).map(|v| v as f64).collect()).unwrap();
        assert_eq!(arr.get(&[0, 0, 1]), Some(1.0));
        assert_eq!(arr.get(&[1, 0, 0]), Some(4.0));
        assert_eq!(arr.get(&[1, 1, 1]), Some(7.0));
        assert_eq!(arr.get(&[2, 0, 0]), None);
        assert_eq!(arr.get(&[0, 0]), None);
    }

    #[test]
    fn test_from_rows() {
        let arr = NdArray::from_rows(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(arr.shape, vec![2, 3]);
        assert_eq!(arr.get(&[1, 2]), Some(6.0));
    }
}
