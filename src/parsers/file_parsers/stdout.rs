//! # 调度器标准输出解析器
//!
//! 用 `ErrorScanner` 扫描 VASP 标准输出，发布 `notifications`：
//! 命中的错误记录列表。
//!
//! ## 依赖关系
//! - 使用 `parsers/error_handling.rs`

use super::{items_from, ParsableItem, ParsableItems};
use crate::error::Result;
use crate::models::{ParsedQuantities, ParsedValue};
use crate::parsers::error_handling::{load_error_definitions, ErrorScanner};
use std::path::Path;

pub fn parsable_items() -> ParsableItems {
    items_from(vec![("notifications", ParsableItem::default())])
}

pub fn parse(path: &Path, error_definitions: Option<&Path>) -> Result<ParsedQuantities> {
    let mut scanner = ErrorScanner::for_stdout();
    if let Some(defs) = error_definitions {
        scanner.add_errors(load_error_definitions(defs)?);
    }
    scanner.scan_file(path)?;

    let mut parsed = ParsedQuantities::new();
    parsed.insert(
        "notifications".to_string(),
        ParsedValue::Json(serde_json::to_value(scanner.errors())?),
    );
    Ok(parsed)
}
