//! # 文件解析器
//!
//! 每个 VASP 输出文件对应一种解析器。解析器公布它能产出的物理量
//! （`ParsableItem`），并按需解析、缓存结果。
//!
//! ## 依赖关系
//! - 被 `parsers/quantity.rs`, `parsers/node_composer.rs`, `parsers/vasp.rs` 使用
//! - 子模块: outcar, poscar, kpoints, eigenval, xdatcar, blob, stdout

pub mod blob;
pub mod eigenval;
pub mod kpoints;
pub mod outcar;
pub mod poscar;
pub mod stdout;
pub mod xdatcar;

use crate::error::Result;
use crate::models::{ParsedQuantities, ParsedValue};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 解析器公布的单个物理量定义
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsableItem {
    /// 规范输出名，None 时与键相同
    pub name: Option<String>,
    pub prerequisites: Vec<String>,
    pub alternatives: Vec<String>,
}

impl ParsableItem {
    /// 以不同的规范名发布
    pub fn named(name: &str) -> Self {
        ParsableItem {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn with_prerequisites(mut self, prerequisites: &[&str]) -> Self {
        self.prerequisites = prerequisites.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// 物理量键 -> 定义
pub type ParsableItems = BTreeMap<String, ParsableItem>;

/// 由 (键, 定义) 列表构建物理量表
pub(crate) fn items_from(entries: Vec<(&str, ParsableItem)>) -> ParsableItems {
    entries
        .into_iter()
        .map(|(key, item)| (key.to_string(), item))
        .collect()
}

/// 文件解析器接口
pub trait FileParser {
    /// 该解析器能产出的物理量
    fn parsable_items(&self) -> &ParsableItems;

    /// 取单个物理量；文件中不存在该物理量时返回 `Ok(None)`
    fn get_quantity(&mut self, key: &str) -> Result<Option<ParsedValue>>;
}

/// 解析器种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParserKind {
    Outcar,
    Poscar,
    Kpoints,
    Eigenval,
    Xdatcar,
    Chgcar,
    Wavecar,
    Stdout,
}

impl ParserKind {
    pub fn name(&self) -> &'static str {
        match self {
            ParserKind::Outcar => "outcar",
            ParserKind::Poscar => "poscar",
            ParserKind::Kpoints => "kpoints",
            ParserKind::Eigenval => "eigenval",
            ParserKind::Xdatcar => "xdatcar",
            ParserKind::Chgcar => "chgcar",
            ParserKind::Wavecar => "wavecar",
            ParserKind::Stdout => "stdout",
        }
    }

    /// 按名称查找解析器（CLI 使用）
    pub fn from_name(name: &str) -> Option<Self> {
        [
            ParserKind::Outcar,
            ParserKind::Poscar,
            ParserKind::Kpoints,
            ParserKind::Eigenval,
            ParserKind::Xdatcar,
            ParserKind::Chgcar,
            ParserKind::Wavecar,
            ParserKind::Stdout,
        ]
        .into_iter()
        .find(|k| k.name() == name.to_lowercase())
    }

    pub fn parsable_items(&self) -> ParsableItems {
        match self {
            ParserKind::Outcar => outcar::parsable_items(),
            ParserKind::Poscar => poscar::parsable_items(),
            ParserKind::Kpoints => kpoints::parsable_items(),
            ParserKind::Eigenval => eigenval::parsable_items(),
            ParserKind::Xdatcar => xdatcar::parsable_items(),
            ParserKind::Chgcar => blob::parsable_items("chgcar"),
            ParserKind::Wavecar => blob::parsable_items("wavecar"),
            ParserKind::Stdout => stdout::parsable_items(),
        }
    }

    fn parse(&self, path: &Path, options: &ParserOptions) -> Result<ParsedQuantities> {
        match self {
            ParserKind::Outcar => outcar::parse(path),
            ParserKind::Poscar => poscar::parse(path),
            ParserKind::Kpoints => kpoints::parse(path),
            ParserKind::Eigenval => eigenval::parse(path),
            ParserKind::Xdatcar => xdatcar::parse(path),
            ParserKind::Chgcar => blob::parse(path, "chgcar"),
            ParserKind::Wavecar => blob::parse(path, "wavecar"),
            ParserKind::Stdout => stdout::parse(path, options.error_definitions.as_deref()),
        }
    }
}

/// 解析器的额外选项
#[derive(Debug, Clone, Default)]
pub struct ParserOptions {
    /// 额外的错误定义 (YAML)
    pub error_definitions: Option<PathBuf>,
}

/// 文件解析器定义：文件名、解析器种类、是否关键
#[derive(Debug, Clone, PartialEq)]
pub struct ParserDefinition {
    pub file_name: String,
    pub kind: ParserKind,
    /// 关键文件缺失时解析直接失败
    pub is_critical: bool,
}

impl ParserDefinition {
    pub fn new(file_name: &str, kind: ParserKind, is_critical: bool) -> Self {
        ParserDefinition {
            file_name: file_name.to_string(),
            kind,
            is_critical,
        }
    }
}

/// 首次取值时解析整个文件，之后复用缓存
#[derive(Debug)]
pub struct LazyFileParser {
    kind: ParserKind,
    path: PathBuf,
    items: ParsableItems,
    options: ParserOptions,
    parsed: Option<ParsedQuantities>,
}

impl LazyFileParser {
    pub fn open(kind: ParserKind, path: &Path, options: ParserOptions) -> Self {
        LazyFileParser {
            kind,
            path: path.to_path_buf(),
            items: kind.parsable_items(),
            options,
            parsed: None,
        }
    }

    pub fn kind(&self) -> ParserKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileParser for LazyFileParser {
    fn parsable_items(&self) -> &ParsableItems {
        &self.items
    }

    fn get_quantity(&mut self, key: &str) -> Result<Option<ParsedValue>> {
        if !self.items.contains_key(key) {
            return Ok(None);
        }
        if self.parsed.is_none() {
            debug!("Parsing {} with the {} parser", self.path.display(), self.kind.name());
            self.parsed = Some(self.kind.parse(&self.path, &self.options)?);
        }
        Ok(self.parsed.as_ref().and_then(|p| p.get(key).cloned()))
    }
}
