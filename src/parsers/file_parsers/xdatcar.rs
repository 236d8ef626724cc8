//! # VASP XDATCAR 解析器
//!
//! 读取分子动力学/弛豫轨迹。变胞计算中每一步前都会重复文件头，
//! 此时逐步更新晶格。
//!
//! 发布 `trajectory`：命名数组表
//! - `cells`      `[步数, 3, 3]`
//! - `positions`  `[步数, 原子数, 3]`（笛卡尔坐标）
//! - `steps`      `[步数]`（configuration 编号）
//! - `symbols`    元素符号列表
//!
//! ## 依赖关系
//! - 使用 `parsers/poscar.rs` 的元素行解析

use super::{items_from, ParsableItem, ParsableItems};
use crate::error::{Result, VaspflowError};
use crate::models::{ArrayEntry, ArrayMap, Lattice, NdArray, ParsedQuantities, ParsedValue};
use crate::parsers::poscar::{parse_species, parse_vector};
use std::fs;
use std::path::Path;

pub fn parsable_items() -> ParsableItems {
    items_from(vec![("trajectory", ParsableItem::default())])
}

pub fn parse(path: &Path) -> Result<ParsedQuantities> {
    let content = fs::read_to_string(path).map_err(|e| VaspflowError::read(path, e))?;
    parse_content(&content, &path.display().to_string())
}

fn is_configuration_line(line: &str) -> bool {
    line.to_lowercase().contains("configuration")
}

fn parse_content(content: &str, source: &str) -> Result<ParsedQuantities> {
    let lines: Vec<&str> = content.lines().collect();
    let fail = |reason: String| VaspflowError::parse("xdatcar", source, reason);

    let mut cells: Vec<f64> = Vec::new();
    let mut positions: Vec<f64> = Vec::new();
    let mut steps: Vec<f64> = Vec::new();
    let mut symbols: Vec<String> = Vec::new();
    let mut natoms = 0;
    let mut lattice: Option<Lattice> = None;

    let mut idx = 0;
    while idx < lines.len() {
        if lines[idx].trim().is_empty() {
            idx += 1;
            continue;
        }

        if !is_configuration_line(lines[idx]) {
            // 文件头：注释、缩放、晶格、元素、计数
            if idx + 6 >= lines.len() {
                return Err(fail(format!("Truncated header at line {}", idx + 1)));
            }
            let scale: f64 = lines[idx + 1]
                .split_whitespace()
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| fail(format!("Invalid scaling factor at line {}", idx + 2)))?;
            let mut matrix = [[0.0; 3]; 3];
            for (i, row) in matrix.iter_mut().enumerate() {
                let v = parse_vector(lines[idx + 2 + i])
                    .ok_or_else(|| fail(format!("Invalid lattice vector at line {}", idx + 3 + i)))?;
                *row = [v[0] * scale, v[1] * scale, v[2] * scale];
            }
            lattice = Some(Lattice::from_vectors(matrix));

            let (species, counts, next) = parse_species(&lines, idx + 5)
                .ok_or_else(|| fail(format!("Invalid species/count lines at line {}", idx + 6)))?;
            symbols = species
                .iter()
                .zip(counts.iter())
                .flat_map(|(s, &n)| std::iter::repeat(s.clone()).take(n))
                .collect();
            natoms = symbols.len();
            idx = next;
            continue;
        }

        let cell = lattice
            .as_ref()
            .ok_or_else(|| fail("Configuration before header".to_string()))?;
        let header = lines[idx];
        let cartesian = header.trim_start().to_lowercase().starts_with('c');
        let step = header
            .split(|c: char| c == '=' || c.is_whitespace())
            .filter_map(|w| w.parse::<f64>().ok())
            .last()
            .unwrap_or((steps.len() + 1) as f64);
        idx += 1;

        if idx + natoms > lines.len() {
            return Err(fail(format!("Configuration {} ends early", step)));
        }
        for line in &lines[idx..idx + natoms] {
            let raw = parse_vector(line).ok_or_else(|| fail(format!("Invalid position in configuration {}", step)))?;
            let cart = if cartesian { raw } else { cell.to_cartesian(raw) };
            positions.extend_from_slice(&cart);
        }
        idx += natoms;

        cells.extend(cell.matrix.iter().flat_map(|r| r.iter().copied()));
        steps.push(step);
    }

    if steps.is_empty() {
        return Err(fail("No configurations found".to_string()));
    }

    let nsteps = steps.len();
    let mut arrays = ArrayMap::new();
    arrays.insert("cells".into(), ArrayEntry::Numeric(NdArray::new(vec![nsteps, 3, 3], cells)?));
    arrays.insert(
        "positions".into(),
        ArrayEntry::Numeric(NdArray::new(vec![nsteps, natoms, 3], positions)?),
    );
    arrays.insert("steps".into(), ArrayEntry::Numeric(NdArray::from_vec(steps)));
    arrays.insert("symbols".into(), ArrayEntry::Labels(symbols));

    let mut parsed = ParsedQuantities::new();
    parsed.insert("trajectory".into(), ParsedValue::Arrays(arrays));
    Ok(parsed)
}
