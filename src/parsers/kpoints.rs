//! # VASP KPOINTS 格式读写
//!
//! 支持三种 KPOINTS 写法：
//! - 自动网格 (`Gamma` / `Monkhorst-Pack`)，统一换算为以 Γ 为中心的偏移
//! - 显式列表（`Reciprocal` / `Cartesian`，可带权重），IBZKPT 也是这种格式
//! - 线模式 (`Line-mode`)，展开为显式列表
//!
//! ## 依赖关系
//! - 被 `parsers/file_parsers/kpoints.rs`, `calcs/` 使用
//! - 使用 `models/value.rs`, `models/kpoints.rs`

use super::poscar::parse_vector;
use crate::error::{Result, VaspflowError};
use crate::models::{KpointsData, KpointsRecord, RawKpoint};
use std::fs;
use std::path::Path;

/// 读取 KPOINTS/IBZKPT 文件
pub fn parse_kpoints_file(path: &Path) -> Result<KpointsRecord> {
    let content = fs::read_to_string(path).map_err(|e| VaspflowError::read(path, e))?;
    parse_kpoints_content(&content, &path.display().to_string())
}

/// 从字符串内容解析 KPOINTS
pub fn parse_kpoints_content(content: &str, source: &str) -> Result<KpointsRecord> {
    let lines: Vec<&str> = content.lines().collect();
    let fail = |reason: String| VaspflowError::parse("kpoints", source, reason);

    if lines.len() < 3 {
        return Err(fail("File too short".to_string()));
    }

    let num: usize = lines[1]
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| fail("Invalid number of kpoints at line 2".to_string()))?;
    let style = lines[2].trim().to_lowercase();

    if style.starts_with('l') {
        return parse_line_mode(&lines, num).ok_or_else(|| fail("Invalid line-mode block".to_string()));
    }

    if num == 0 {
        return parse_automatic(&lines, &style).map_err(fail);
    }

    // 显式列表
    let direct = !(style.starts_with('c') || style.starts_with('k'));
    if lines.len() - 3 < num {
        return Err(fail(format!("Expected {} kpoints, file ends early", num)));
    }

    let mut points = Vec::with_capacity(num);
    for (i, line) in lines[3..3 + num].iter().enumerate() {
        let point = parse_vector(line).ok_or_else(|| fail(format!("Invalid kpoint at line {}", i + 4)))?;
        let weight = line.split_whitespace().nth(3).and_then(|w| w.parse::<f64>().ok());
        points.push(RawKpoint {
            point,
            weight,
            direct,
        });
    }

    Ok(KpointsRecord::Explicit { points })
}

fn parse_automatic(lines: &[&str], style: &str) -> std::result::Result<KpointsRecord, String> {
    let gamma = style.starts_with('g');
    let monkhorst = style.starts_with('m');
    if !gamma && !monkhorst {
        return Err(format!("Unsupported automatic kpoints style '{}'", style));
    }

    let divisions: Vec<u32> = lines
        .get(3)
        .ok_or("Missing mesh divisions")?
        .split_whitespace()
        .take(3)
        .filter_map(|s| s.parse().ok())
        .collect();
    if divisions.len() != 3 {
        return Err("Invalid mesh divisions".to_string());
    }
    let divisions = [divisions[0], divisions[1], divisions[2]];

    let mut shifts = lines.get(4).and_then(|l| parse_vector(l)).unwrap_or([0.0; 3]);

    // Monkhorst-Pack 网格在偶数划分方向上相对 Γ 网格偏移半格
    if monkhorst {
        for (shift, &div) in shifts.iter_mut().zip(divisions.iter()) {
            if div % 2 == 0 {
                *shift += 0.5;
            }
        }
    }

    Ok(KpointsRecord::Automatic { divisions, shifts })
}

/// 线模式展开后的 k 点数上限
const MAX_LINE_MODE_POINTS: usize = 1_000_000;

fn parse_line_mode(lines: &[&str], per_segment: usize) -> Option<KpointsRecord> {
    let coord = lines.get(3)?.trim().to_lowercase();
    let direct = !(coord.starts_with('c') || coord.starts_with('k'));

    let ends: Vec<[f64; 3]> = lines[4..]
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| parse_vector(l))
        .collect::<Option<Vec<_>>>()?;

    if ends.len() < 2 || ends.len() % 2 != 0 || per_segment < 2 {
        return None;
    }
    let total = per_segment.checked_mul(ends.len() / 2)?;
    if total > MAX_LINE_MODE_POINTS {
        return None;
    }

    let mut points = Vec::with_capacity(total);
    for pair in ends.chunks(2) {
        let (start, end) = (pair[0], pair[1]);
        for step in 0..per_segment {
            let t = step as f64 / (per_segment - 1) as f64;
            points.push(RawKpoint {
                point: [
                    start[0] + t * (end[0] - start[0]),
                    start[1] + t * (end[1] - start[1]),
                    start[2] + t * (end[2] - start[2]),
                ],
                weight: None,
                direct,
            });
        }
    }

    Some(KpointsRecord::Explicit { points })
}

/// 由原始 k 点记录构建 k 点节点；显式列表的坐标系和是否带权重取自第一个点
pub fn kpoints_from_record(record: &KpointsRecord) -> KpointsData {
    let mut kpoints = KpointsData::default();
    match record {
        KpointsRecord::Explicit { points } => {
            let cartesian = points.first().map(|p| !p.direct).unwrap_or(false);
            let weights = match points.first() {
                Some(first) if first.weight.is_some() => {
                    Some(points.iter().map(|p| p.weight.unwrap_or(1.0)).collect())
                }
                _ => None,
            };
            kpoints.set_kpoints(points.iter().map(|p| p.point).collect(), weights, cartesian);
        }
        KpointsRecord::Automatic { divisions, shifts } => {
            kpoints.set_kpoints_mesh(*divisions, *shifts);
        }
    }
    kpoints
}

/// 将 k 点节点转换为 KPOINTS 格式字符串
pub fn to_kpoints_string(kpoints: &KpointsData, comment: &str) -> String {
    let mut result = format!("{}\n", comment);

    match kpoints {
        KpointsData::Mesh { mesh, offset } => {
            result.push_str("0\nGamma\n");
            result.push_str(&format!("  {}  {}  {}\n", mesh[0], mesh[1], mesh[2]));
            result.push_str(&format!(
                "  {:.6}  {:.6}  {:.6}\n",
                offset[0], offset[1], offset[2]
            ));
        }
        KpointsData::List {
            points,
            weights,
            cartesian,
        } => {
            result.push_str(&format!("{}\n", points.len()));
            result.push_str(if *cartesian { "Cartesian\n" } else { "Reciprocal\n" });
            for (i, p) in points.iter().enumerate() {
                let w = weights.as_ref().and_then(|w| w.get(i)).copied().unwrap_or(1.0);
                result.push_str(&format!(
                    "  {:.10}  {:.10}  {:.10}  {:.10}\n",
                    p[0], p[1], p[2], w
                ));
            }
        }
    }

    result
}
