//! # VASP INCAR 格式读写
//!
//! `TAG = value` 形式，`!` 或 `#` 后为注释，`;` 可分隔同一行的多个赋值。
//! 单个词的值依次尝试布尔、整数、浮点，失败则保留为字符串；多个词的值
//! （如 `MAGMOM = 2*1.0 3*0.0`）整体保留为字符串。
//!
//! ## 依赖关系
//! - 被 `calcs/`, `commands/prepare.rs` 使用
//! - 使用 `models/incar.rs`

use crate::error::{Result, VaspflowError};
use crate::models::{Incar, IncarValue};
use std::fs;
use std::path::Path;

/// 读取 INCAR 文件
pub fn parse_incar_file(path: &Path) -> Result<Incar> {
    let content = fs::read_to_string(path).map_err(|e| VaspflowError::read(path, e))?;
    parse_incar_content(&content, &path.display().to_string())
}

/// 从字符串内容解析 INCAR
pub fn parse_incar_content(content: &str, source: &str) -> Result<Incar> {
    let mut incar = Incar::new();

    for (lineno, raw) in content.lines().enumerate() {
        let line = strip_comment(raw);
        for assignment in line.split(';') {
            let assignment = assignment.trim();
            if assignment.is_empty() {
                continue;
            }
            let (tag, value) = assignment.split_once('=').ok_or_else(|| {
                VaspflowError::parse(
                    "incar",
                    source,
                    format!("Expected 'TAG = value' at line {}", lineno + 1),
                )
            })?;
            let tag = tag.trim();
            if tag.is_empty() || tag.contains(char::is_whitespace) {
                return Err(VaspflowError::parse(
                    "incar",
                    source,
                    format!("Invalid tag '{}' at line {}", tag, lineno + 1),
                ));
            }
            incar.set(tag, parse_value(value.trim()));
        }
    }

    Ok(incar)
}

fn strip_comment(line: &str) -> &str {
    match line.find(|c| c == '!' || c == '#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// 解析单个 INCAR 值
pub fn parse_value(value: &str) -> IncarValue {
    if value.split_whitespace().count() != 1 {
        return IncarValue::Str(value.to_string());
    }

    let upper = value.to_uppercase();
    match upper.as_str() {
        ".TRUE." | "TRUE" | "T" | ".T." => return IncarValue::Bool(true),
        ".FALSE." | "FALSE" | "F" | ".F." => return IncarValue::Bool(false),
        _ => {}
    }

    if let Ok(v) = value.parse::<i64>() {
        return IncarValue::Int(v);
    }

    // Fortran 风格指数 1.0d-5
    if let Ok(v) = upper.replace('D', "E").parse::<f64>() {
        return IncarValue::Float(v);
    }

    IncarValue::Str(value.to_string())
}

/// 将 INCAR 参数转换为文件内容
pub fn to_incar_string(incar: &Incar) -> String {
    incar
        .iter()
        .map(|(tag, value)| format!("{} = {}\n", tag, value.to_incar_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_typed_values() {
        let content = r#"# relaxation
PREC = Accurate
ENCUT = 520 ! cutoff
EDIFF = 1d-6
LREAL = .FALSE.
ISMEAR = 0; SIGMA = 0.05
MAGMOM = 2*1.0 3*0.0
"#;
        let incar = parse_incar_content(content, "INCAR").unwrap();
        assert_eq!(incar.get("prec"), Some(&IncarValue::Str("Accurate".into())));
        assert_eq!(incar.get("encut"), Some(&IncarValue::Int(520)));
        assert_eq!(incar.get("ediff"), Some(&IncarValue::Float(1e-6)));
        assert_eq!(incar.get("lreal"), Some(&IncarValue::Bool(false)));
        assert_eq!(incar.get("ismear"), Some(&IncarValue::Int(0)));
        assert_eq!(incar.get("sigma"), Some(&IncarValue::Float(0.05)));
        assert_eq!(incar.get("magmom"), Some(&IncarValue::Str("2*1.0 3*0.0".into())));
    }

    #[test]
    fn test_missing_equals_is_error() {
        assert!(parse_incar_content("ENCUT 520\n", "INCAR").is_err());
    }

    #[test]
    fn test_write_then_read() {
        let mut incar = Incar::new();
        incar.set("ISTART", 1_i64);
        incar.set("LWAVE", true);
        incar.set("ALGO", "Normal");

        let text = to_incar_string(&incar);
        let reread = parse_incar_content(&text, "INCAR").unwrap();
        assert_eq!(reread, incar);
    }
}
