//! # 二进制大文件解析器 (CHGCAR, WAVECAR)
//!
//! 不读取内容，只把文件路径作为物理量传递；空文件视为不存在。

use super::{items_from, ParsableItem, ParsableItems};
use crate::error::{Result, VaspflowError};
use crate::models::{ParsedQuantities, ParsedValue};
use std::fs;
use std::path::Path;

pub fn parsable_items(key: &str) -> ParsableItems {
    items_from(vec![(key, ParsableItem::default())])
}

pub fn parse(path: &Path, key: &str) -> Result<ParsedQuantities> {
    let meta = fs::metadata(path).map_err(|e| VaspflowError::read(path, e))?;
    let mut parsed = ParsedQuantities::new();
    if meta.len() > 0 {
        parsed.insert(key.to_string(), ParsedValue::File(path.to_path_buf()));
    }
    Ok(parsed)
}
