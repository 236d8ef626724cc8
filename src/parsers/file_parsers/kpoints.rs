//! # KPOINTS/IBZKPT 文件解析器
//!
//! 发布 `kpoints-kpoints`，规范名为 `kpoints`。
//!
//! ## 依赖关系
//! - 使用 `parsers/kpoints.rs`

use super::{items_from, ParsableItem, ParsableItems};
use crate::error::Result;
use crate::models::{ParsedQuantities, ParsedValue};
use crate::parsers::kpoints::parse_kpoints_file;
use std::path::Path;

pub fn parsable_items() -> ParsableItems {
    items_from(vec![("kpoints-kpoints", ParsableItem::named("kpoints"))])
}

pub fn parse(path: &Path) -> Result<ParsedQuantities> {
    let record = parse_kpoints_file(path)?;
    let mut parsed = ParsedQuantities::new();
    parsed.insert("kpoints-kpoints".to_string(), ParsedValue::Kpoints(record));
    Ok(parsed)
}
