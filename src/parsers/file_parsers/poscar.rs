//! # POSCAR/CONTCAR 文件解析器
//!
//! 发布 `poscar-structure`，规范名为 `structure`。
//!
//! ## 依赖关系
//! - 使用 `parsers/poscar.rs`

use super::{items_from, ParsableItem, ParsableItems};
use crate::error::Result;
use crate::models::{ParsedQuantities, ParsedValue};
use crate::parsers::poscar::parse_poscar_file;
use std::path::Path;

pub fn parsable_items() -> ParsableItems {
    items_from(vec![("poscar-structure", ParsableItem::named("structure"))])
}

pub fn parse(path: &Path) -> Result<ParsedQuantities> {
    let record = parse_poscar_file(path)?;
    let mut parsed = ParsedQuantities::new();
    parsed.insert("poscar-structure".to_string(), ParsedValue::Structure(record));
    Ok(parsed)
}
