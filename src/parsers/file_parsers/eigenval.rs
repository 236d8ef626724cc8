//! # VASP EIGENVAL 解析器
//!
//! 读取每个 k 点的本征值和占据数。
//!
//! 发布的物理量：
//! - `eigenval-eigenvalues` → `eigenvalues`，形状 `[自旋, k 点, 能带]`
//! - `eigenval-occupancies` → `occupancies`，形状同上（老版本 VASP 不输出）
//! - `eigenval-kpoints` → `kpoints`，倒格子坐标与权重
//!
//! ## 依赖关系
//! - 使用 `models/array.rs`, `models/value.rs`

use super::{items_from, ParsableItem, ParsableItems};
use crate::error::{Result, VaspflowError};
use crate::models::{KpointsRecord, NdArray, ParsedQuantities, ParsedValue, RawKpoint};
use std::fs;
use std::path::Path;

pub fn parsable_items() -> ParsableItems {
    items_from(vec![
        ("eigenval-eigenvalues", ParsableItem::named("eigenvalues")),
        ("eigenval-occupancies", ParsableItem::named("occupancies")),
        ("eigenval-kpoints", ParsableItem::named("kpoints")),
    ])
}

pub fn parse(path: &Path) -> Result<ParsedQuantities> {
    let content = fs::read_to_string(path).map_err(|e| VaspflowError::read(path, e))?;
    parse_content(&content, &path.display().to_string())
}

fn numbers(line: &str) -> Vec<f64> {
    line.split_whitespace().filter_map(|w| w.parse().ok()).collect()
}

fn parse_content(content: &str, source: &str) -> Result<ParsedQuantities> {
    let lines: Vec<&str> = content.lines().collect();
    let fail = |reason: String| VaspflowError::parse("eigenval", source, reason);

    if lines.len() < 6 {
        return Err(fail("File too short".to_string()));
    }

    let ispin = lines[0]
        .split_whitespace()
        .nth(3)
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&s| s == 1 || s == 2)
        .ok_or_else(|| fail("Invalid ISPIN in header".to_string()))?;

    let sizes: Vec<usize> = lines[5]
        .split_whitespace()
        .filter_map(|s| s.parse().ok())
        .collect();
    if sizes.len() < 3 {
        return Err(fail("Invalid size line (nelect, nkpts, nbands)".to_string()));
    }
    let (nkpts, nbands) = (sizes[1], sizes[2]);

    // 每个 k 点至少占 1 + nbands 行，分配前先与剩余行数比较
    let body = lines.len() - 6;
    let fits = nbands
        .checked_add(1)
        .and_then(|n| n.checked_mul(nkpts))
        .map_or(false, |n| n <= body);
    if !fits {
        return Err(fail(format!(
            "Header declares {} kpoints x {} bands but only {} lines follow",
            nkpts, nbands, body
        )));
    }

    let mut eigenvalues = vec![0.0; ispin * nkpts * nbands];
    let mut occupancies = vec![0.0; ispin * nkpts * nbands];
    let mut has_occupancies = true;
    let mut points = Vec::with_capacity(nkpts);

    let mut idx = 6;
    for k in 0..nkpts {
        while idx < lines.len() && lines[idx].trim().is_empty() {
            idx += 1;
        }
        let kline = numbers(lines.get(idx).ok_or_else(|| fail(format!("Missing kpoint {}", k + 1)))?);
        if kline.len() < 3 {
            return Err(fail(format!("Invalid kpoint line {}", idx + 1)));
        }
        points.push(RawKpoint {
            point: [kline[0], kline[1], kline[2]],
            weight: kline.get(3).copied(),
            direct: true,
        });
        idx += 1;

        for b in 0..nbands {
            let row = lines
                .get(idx)
                .map(|l| numbers(l))
                .ok_or_else(|| fail(format!("Missing band {} at kpoint {}", b + 1, k + 1)))?;
            // 第一列为能带序号
            let values = &row[1.min(row.len())..];
            if values.len() < ispin {
                return Err(fail(format!("Invalid band line {}", idx + 1)));
            }
            if values.len() < 2 * ispin {
                has_occupancies = false;
            }
            for s in 0..ispin {
                let flat = s * nkpts * nbands + k * nbands + b;
                eigenvalues[flat] = values[s];
                if has_occupancies {
                    occupancies[flat] = values[ispin + s];
                }
            }
            idx += 1;
        }
    }

    let shape = vec![ispin, nkpts, nbands];
    let mut parsed = ParsedQuantities::new();
    parsed.insert(
        "eigenval-eigenvalues".to_string(),
        ParsedValue::Array(NdArray::new(shape.clone(), eigenvalues)?),
    );
    if has_occupancies {
        parsed.insert(
            "eigenval-occupancies".to_string(),
            ParsedValue::Array(NdArray::new(shape, occupancies)?),
        );
    }
    parsed.insert(
        "eigenval-kpoints".to_string(),
        ParsedValue::Kpoints(KpointsRecord::Explicit { points }),
    );
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIN_POLARIZED: &str = r#"    2    2    1    2
  0.1610000E+02  0.3840000E-09  0.3840000E-09  0.3840000E-09  0.5000000E-15
  1.0000000000000000E-004
  CAR
 unknown system
      8      2      3

  0.0000000E+00  0.0000000E+00  0.0000000E+00  0.2500000E+00
    1       -5.0000   -4.9000   1.000000   1.000000
    2        1.0000    1.1000   1.000000   0.500000
    3        6.0000    6.1000   0.000000   0.000000

  0.5000000E+00  0.0000000E+00  0.0000000E+00  0.7500000E+00
    1       -3.0000   -2.9000   1.000000   1.000000
    2        2.0000    2.1000   0.500000   0.000000
    3        7.0000    7.1000   0.000000   0.000000
"#;

    #[test]
    fn test_spin_polarized_eigenvalues() {
        let parsed = parse_content(SPIN_POLARIZED, "EIGENVAL").unwrap();
        match &parsed["eigenval-eigenvalues"] {
            ParsedValue::Array(arr) => {
                assert_eq!(arr.shape, vec![2, 2, 3]);
                assert_eq!(arr.get(&[0, 1, 0]), Some(-3.0));
                assert_eq!(arr.get(&[1, 0, 2]), Some(6.1));
            }
            other => panic!("unexpected value {:?}", other),
        }
        match &parsed["eigenval-occupancies"] {
            ParsedValue::Array(arr) => {
                assert_eq!(arr.get(&[1, 0, 1]), Some(0.5));
                assert_eq!(arr.get(&[0, 1, 1]), Some(0.5));
            }
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_kpoints_with_weights() {
        let parsed = parse_content(SPIN_POLARIZED, "EIGENVAL").unwrap();
        match &parsed["eigenval-kpoints"] {
            ParsedValue::Kpoints(KpointsRecord::Explicit { points }) => {
                assert_eq!(points.len(), 2);
                assert_eq!(points[1].point, [0.5, 0.0, 0.0]);
                assert_eq!(points[1].weight, Some(0.75));
            }
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_old_format_without_occupancies() {
        let content = "    1    1    1    1\n a\n b\n c\n d\n      2      1      2\n\n 0 0 0 1.0\n 1 -1.0\n 2 1.0\n";
        let parsed = parse_content(content, "EIGENVAL").unwrap();
        assert!(parsed.contains_key("eigenval-eigenvalues"));
        assert!(!parsed.contains_key("eigenval-occupancies"));
    }

    #[test]
    fn test_truncated_file_is_error() {
        let truncated: String = SPIN_POLARIZED.lines().take(10).collect::<Vec<_>>().join("\n");
        assert!(parse_content(&truncated, "EIGENVAL").is_err());
    }

    #[test]
    fn test_oversized_header_is_error() {
        let content = " 1 1 1 1\nx\nx\nCAR\nsys\n 8 4294967296 4294967297\n";
        assert!(matches!(
            parse_content(content, "EIGENVAL"),
            Err(VaspflowError::ParseError { .. })
        ));
    }
}
