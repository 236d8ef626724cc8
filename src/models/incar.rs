//! # INCAR 参数数据模型
//!
//! INCAR 标签名统一存为大写；值区分布尔、整数、浮点与字符串。
//!
//! ## 依赖关系
//! - 被 `parsers/incar.rs`, `calcs/`, `workchains/` 使用

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// INCAR 标签值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IncarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl IncarValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            IncarValue::Int(v) => Some(*v),
            IncarValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    /// 按 INCAR 语法格式化
    pub fn to_incar_string(&self) -> String {
        match self {
            IncarValue::Bool(true) => ".TRUE.".to_string(),
            IncarValue::Bool(false) => ".FALSE.".to_string(),
            IncarValue::Int(v) => v.to_string(),
            IncarValue::Float(v) => format!("{}", v),
            IncarValue::Str(s) => s.clone(),
        }
    }
}

impl From<bool> for IncarValue {
    fn from(v: bool) -> Self {
        IncarValue::Bool(v)
    }
}

impl From<i64> for IncarValue {
    fn from(v: i64) -> Self {
        IncarValue::Int(v)
    }
}

impl From<f64> for IncarValue {
    fn from(v: f64) -> Self {
        IncarValue::Float(v)
    }
}

impl From<&str> for IncarValue {
    fn from(v: &str) -> Self {
        IncarValue::Str(v.to_string())
    }
}

/// INCAR 参数集合
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Incar {
    tags: BTreeMap<String, IncarValue>,
}

impl Incar {
    pub fn new() -> Self {
        Incar::default()
    }

    pub fn get(&self, tag: &str) -> Option<&IncarValue> {
        self.tags.get(&tag.to_uppercase())
    }

    pub fn set(&mut self, tag: &str, value: impl Into<IncarValue>) {
        self.tags.insert(tag.to_uppercase(), value.into());
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains_key(&tag.to_uppercase())
    }

    pub fn remove(&mut self, tag: &str) -> Option<IncarValue> {
        self.tags.remove(&tag.to_uppercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &IncarValue)> {
        self.tags.iter()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// 以 `defaults` 为底层，当前参数优先
    pub fn with_defaults(&self, defaults: &Incar) -> Incar {
        let mut merged = defaults.clone();
        for (tag, value) in &self.tags {
            merged.tags.insert(tag.clone(), value.clone());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_case_insensitive() {
        let mut incar = Incar::new();
        incar.set("encut", 520_i64);
        assert_eq!(incar.get("ENCUT"), Some(&IncarValue::Int(520)));
        assert!(incar.contains("Encut"));
    }

    #[test]
    fn test_user_values_override_defaults() {
        let mut defaults = Incar::new();
        defaults.set("PREC", "Normal");
        defaults.set("NELM", 60_i64);

        let mut user = Incar::new();
        user.set("prec", "Accurate");

        let merged = user.with_defaults(&defaults);
        assert_eq!(merged.get("PREC"), Some(&IncarValue::Str("Accurate".into())));
        assert_eq!(merged.get("NELM").and_then(|v| v.as_int()), Some(60));
    }
}
