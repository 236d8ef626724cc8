//! # 物理量注册表
//!
//! 收集所有文件解析器公布的物理量，记录每个物理量来自哪个文件、
//! 文件是否已取回、是否可解析，以及等价物理量（alternatives）。
//!
//! ## 规则
//! - 同一物理量键被两个解析器定义时报错
//! - 规范名与键不同的物理量登记为规范名的 alternative；规范名不存在时
//!   创建占位物理量（无文件，不可解析）
//! - 可解析 = 有文件、文件已取回、所有前置物理量已知且文件齐全
//!
//! ## 依赖关系
//! - 被 `parsers/manager.rs`, `parsers/node_composer.rs`, `parsers/vasp.rs` 使用
//! - 使用 `parsers/file_parsers/mod.rs`

use super::file_parsers::{ParsableItem, ParsableItems, ParserDefinition};
use crate::error::{Result, VaspflowError};
use std::collections::BTreeMap;

/// 注册表中的一个物理量
#[derive(Debug, Clone, PartialEq)]
pub struct ParsableQuantity {
    /// 解析器中的键
    pub original_name: String,
    /// 规范输出名
    pub name: String,
    /// 来源文件；占位物理量为 None
    pub file_name: Option<String>,
    pub alternatives: Vec<String>,
    pub prerequisites: Vec<String>,
    pub missing_files: Vec<String>,
    pub is_parsable: bool,
}

impl ParsableQuantity {
    fn from_item(key: &str, item: &ParsableItem, file_name: Option<&str>, retrieved: bool) -> Self {
        let missing_files = match (file_name, retrieved) {
            (Some(f), false) => vec![f.to_string()],
            _ => Vec::new(),
        };
        ParsableQuantity {
            original_name: key.to_string(),
            name: item.name.clone().unwrap_or_else(|| key.to_string()),
            file_name: file_name.map(str::to_string),
            alternatives: item.alternatives.clone(),
            prerequisites: item.prerequisites.clone(),
            missing_files,
            is_parsable: false,
        }
    }

    fn placeholder(name: &str) -> Self {
        ParsableQuantity {
            original_name: name.to_string(),
            name: name.to_string(),
            file_name: None,
            alternatives: Vec::new(),
            prerequisites: Vec::new(),
            missing_files: Vec::new(),
            is_parsable: false,
        }
    }
}

/// 物理量注册表，保持登记顺序
#[derive(Debug, Clone, Default)]
pub struct ParsableQuantities {
    quantities: BTreeMap<String, ParsableQuantity>,
    order: Vec<String>,
}

impl ParsableQuantities {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按解析器定义建立注册表
    ///
    /// `retrieved_files` 为作业目录中实际存在的文件名。
    pub fn setup(retrieved_files: &[String], definitions: &[ParserDefinition]) -> Result<Self> {
        let mut registry = ParsableQuantities::new();
        for def in definitions {
            let retrieved = retrieved_files.iter().any(|f| f == &def.file_name);
            for (key, item) in def.kind.parsable_items() {
                registry.add(&key, &item, Some(&def.file_name), retrieved)?;
            }
        }
        registry.collect_alternatives();
        registry.update_parsable();
        Ok(registry)
    }

    /// 由单个解析器的物理量表建立注册表，文件视为已取回
    pub fn from_items(items: &ParsableItems, file_name: Option<&str>) -> Result<Self> {
        let mut registry = ParsableQuantities::new();
        for (key, item) in items {
            registry.add(key, item, file_name, true)?;
        }
        registry.collect_alternatives();
        registry.update_parsable();
        Ok(registry)
    }

    /// 登记一个物理量
    pub fn add(
        &mut self,
        key: &str,
        item: &ParsableItem,
        file_name: Option<&str>,
        retrieved: bool,
    ) -> Result<()> {
        if self.quantities.contains_key(key) {
            return Err(VaspflowError::DuplicateQuantity {
                quantity: key.to_string(),
                file_name: file_name.unwrap_or("(none)").to_string(),
            });
        }
        self.quantities
            .insert(key.to_string(), ParsableQuantity::from_item(key, item, file_name, retrieved));
        self.order.push(key.to_string());
        Ok(())
    }

    /// 把规范名不同于键的物理量登记为规范名的 alternative
    pub fn collect_alternatives(&mut self) {
        let renamed: Vec<(String, String)> = self
            .order
            .iter()
            .filter_map(|key| {
                let q = &self.quantities[key];
                (q.name != q.original_name).then(|| (q.name.clone(), key.clone()))
            })
            .collect();

        for (name, key) in renamed {
            if !self.quantities.contains_key(&name) {
                self.quantities
                    .insert(name.clone(), ParsableQuantity::placeholder(&name));
                self.order.push(name.clone());
            }
            if let Some(primary) = self.quantities.get_mut(&name) {
                if !primary.alternatives.contains(&key) {
                    primary.alternatives.push(key);
                }
            }
        }
    }

    fn update_parsable(&mut self) {
        let flags: Vec<(String, bool)> = self
            .order
            .iter()
            .map(|key| {
                let q = &self.quantities[key];
                let prerequisites_ok = q.prerequisites.iter().all(|p| {
                    self.quantities
                        .get(p)
                        .map(|pq| pq.missing_files.is_empty())
                        .unwrap_or(false)
                });
                let parsable = q.file_name.is_some() && q.missing_files.is_empty() && prerequisites_ok;
                (key.clone(), parsable)
            })
            .collect();

        for (key, parsable) in flags {
            if let Some(q) = self.quantities.get_mut(&key) {
                q.is_parsable = parsable;
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParsableQuantity> {
        self.quantities.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.quantities.contains_key(name)
    }

    /// 物理量自身及其 alternatives（声明顺序）
    pub fn equivalents(&self, name: &str) -> Vec<&ParsableQuantity> {
        let Some(primary) = self.quantities.get(name) else {
            return Vec::new();
        };
        std::iter::once(primary)
            .chain(primary.alternatives.iter().filter_map(|a| self.quantities.get(a)))
            .collect()
    }

    /// 按登记顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = &ParsableQuantity> {
        self.order.iter().filter_map(|k| self.quantities.get(k))
    }

    pub fn len(&self) -> usize {
        self.quantities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quantities.is_empty()
    }
}
