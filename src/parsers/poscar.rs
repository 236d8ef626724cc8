//! # VASP POSCAR 格式读写
//!
//! 读取 POSCAR/CONTCAR 为原始结构记录，并把结构节点写回 POSCAR。
//!
//! ## POSCAR 格式说明
//! ```text
//! Comment line (structure name)
//! 1.0                    # scaling factor (negative: target volume)
//! a1 a2 a3               # lattice vector a
//! b1 b2 b3               # lattice vector b
//! c1 c2 c3               # lattice vector c
//! Element1 Element2 ...  # element symbols (VASP 5+)
//! n1 n2 ...              # number of atoms per element
//! Selective dynamics     # optional
//! Direct/Cartesian       # coordinate type
//! x1 y1 z1               # atom positions
//! ...
//! ```
//!
//! ## 依赖关系
//! - 被 `parsers/file_parsers/poscar.rs`, `parsers/file_parsers/xdatcar.rs`, `calcs/` 使用
//! - 使用 `models/structure.rs`, `models/value.rs`

use crate::error::{Result, VaspflowError};
use crate::models::{Lattice, SiteRecord, StructureData, StructureRecord};
use std::fs;
use std::path::Path;

/// 读取 POSCAR/CONTCAR 文件
pub fn parse_poscar_file(path: &Path) -> Result<StructureRecord> {
    let content = fs::read_to_string(path).map_err(|e| VaspflowError::read(path, e))?;
    parse_poscar_content(&content, &path.display().to_string())
}

/// 从字符串内容解析 POSCAR 格式
pub fn parse_poscar_content(content: &str, source: &str) -> Result<StructureRecord> {
    let lines: Vec<&str> = content.lines().collect();
    let fail = |reason: String| VaspflowError::parse("poscar", source, reason);

    if lines.len() < 8 {
        return Err(fail("File too short".to_string()));
    }

    // Line 1: Scaling factor
    let scale: f64 = lines[1]
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| fail("Invalid scaling factor at line 2".to_string()))?;

    // Lines 2-4: Lattice vectors
    let mut matrix = [[0.0; 3]; 3];
    for (i, row) in matrix.iter_mut().enumerate() {
        *row = parse_vector(lines[2 + i])
            .ok_or_else(|| fail(format!("Invalid lattice vector at line {}", 3 + i)))?;
    }

    // 负的缩放因子表示目标体积
    let factor = if scale < 0.0 {
        let raw_volume = Lattice::from_vectors(matrix).volume().abs();
        if raw_volume < 1e-10 {
            return Err(fail("Degenerate lattice".to_string()));
        }
        (scale.abs() / raw_volume).cbrt()
    } else {
        scale
    };
    for row in matrix.iter_mut() {
        for v in row.iter_mut() {
            *v *= factor;
        }
    }
    let lattice = Lattice::from_vectors(matrix);

    let (symbols, counts, mut line_idx) = parse_species(&lines, 5)
        .ok_or_else(|| fail("Invalid species/count lines".to_string()))?;

    // Check for "Selective dynamics" line
    if lines.len() > line_idx && lines[line_idx].trim().to_lowercase().starts_with('s') {
        line_idx += 1;
    }

    if lines.len() <= line_idx {
        return Err(fail("Missing coordinate type line".to_string()));
    }
    let coord_type = lines[line_idx].trim().to_lowercase();
    let is_cartesian = coord_type.starts_with('c') || coord_type.starts_with('k');
    line_idx += 1;

    let total: usize = counts.iter().sum();
    if lines.len().saturating_sub(line_idx) < total {
        return Err(fail(format!(
            "Expected {} positions, file ends early",
            total
        )));
    }

    let mut sites = Vec::with_capacity(total);
    for (symbol, &count) in symbols.iter().zip(counts.iter()) {
        for _ in 0..count {
            let raw = parse_vector(lines[line_idx])
                .ok_or_else(|| fail(format!("Invalid position at line {}", line_idx + 1)))?;
            let position = if is_cartesian {
                [raw[0] * factor, raw[1] * factor, raw[2] * factor]
            } else {
                lattice.to_cartesian(raw)
            };
            sites.push(SiteRecord {
                position,
                symbol: symbol.clone(),
                kind_name: symbol.clone(),
            });
            line_idx += 1;
        }
    }

    Ok(StructureRecord {
        unitcell: lattice.matrix,
        sites,
    })
}

/// 解析元素行与计数行，返回 (元素, 计数, 下一行下标)
///
/// VASP 4 格式没有元素行，此时使用占位符 X1, X2, ...
/// 原子总数溢出或超过剩余行数时返回 None。
pub(crate) fn parse_species(lines: &[&str], start: usize) -> Option<(Vec<String>, Vec<usize>, usize)> {
    let (symbols, counts, next) = read_species(lines, start)?;
    let total = counts.iter().try_fold(0usize, |acc, &n| acc.checked_add(n))?;
    if total > lines.len().saturating_sub(next) {
        return None;
    }
    Some((symbols, counts, next))
}

fn read_species(lines: &[&str], start: usize) -> Option<(Vec<String>, Vec<usize>, usize)> {
    let first: Vec<&str> = lines.get(start)?.split_whitespace().collect();
    if first.is_empty() {
        return None;
    }

    if first[0].parse::<usize>().is_ok() {
        let counts: Vec<usize> = first.iter().filter_map(|s| s.parse().ok()).collect();
        let symbols = (0..counts.len()).map(|i| format!("X{}", i + 1)).collect();
        Some((symbols, counts, start + 1))
    } else {
        // VASP 5+ 的元素名可能带有 POTCAR 后缀，如 "Fe_pv" 或 "Fe/abc123"
        let symbols: Vec<String> = first
            .iter()
            .map(|s| {
                s.split(|c| c == '_' || c == '/')
                    .next()
                    .unwrap_or(s)
                    .to_string()
            })
            .collect();
        let counts: Vec<usize> = lines
            .get(start + 1)?
            .split_whitespace()
            .filter_map(|s| s.parse().ok())
            .collect();
        if counts.len() != symbols.len() {
            return None;
        }
        Some((symbols, counts, start + 2))
    }
}

pub(crate) fn parse_vector(line: &str) -> Option<[f64; 3]> {
    let parts: Vec<f64> = line
        .split_whitespace()
        .take(3)
        .filter_map(|s| s.parse().ok())
        .collect();
    if parts.len() < 3 {
        return None;
    }
    Some([parts[0], parts[1], parts[2]])
}

/// 将结构节点转换为 POSCAR 格式字符串，按种类分组，分数坐标
pub fn to_poscar_string(structure: &StructureData, comment: &str, precision: usize) -> String {
    let kinds = structure.kind_names();
    let width = precision + 6;

    let mut result = String::new();
    result.push_str(&format!("{}\n", comment));
    result.push_str("1.0\n");

    for row in &structure.cell.matrix {
        result.push_str(&format!(
            "  {:>w$.p$}  {:>w$.p$}  {:>w$.p$}\n",
            row[0],
            row[1],
            row[2],
            w = width,
            p = precision
        ));
    }

    let symbols: Vec<&str> = kinds
        .iter()
        .map(|k| structure.symbol_of_kind(k).unwrap_or(k.as_str()))
        .collect();
    result.push_str(&format!("   {}\n", symbols.join("   ")));

    let counts: Vec<String> = kinds
        .iter()
        .map(|k| {
            structure
                .sites
                .iter()
                .filter(|s| &s.kind_name == k)
                .count()
                .to_string()
        })
        .collect();
    result.push_str(&format!("   {}\n", counts.join("   ")));

    result.push_str("Direct\n");

    for kind in &kinds {
        for site in structure.sites.iter().filter(|s| &s.kind_name == kind) {
            let frac = structure.cell.to_fractional(site.position);
            result.push_str(&format!(
                "  {:>w$.p$}  {:>w$.p$}  {:>w$.p$}\n",
                frac[0],
                frac[1],
                frac[2],
                w = width,
                p = precision
            ));
        }
    }

    result
}

/// 由原始结构记录构建结构节点
pub fn structure_from_record(record: &StructureRecord) -> StructureData {
    let mut structure = StructureData::default();
    structure.set_cell(record.unitcell);
    for site in &record.sites {
        structure.append_atom(site.position, &site.symbol, Some(&site.kind_name));
    }
    structure
}
