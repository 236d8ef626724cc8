//! # VASP OUTCAR 解析器
//!
//! 逐行扫描 OUTCAR，提取最后一个离子步的能量、力、应力、磁矩、
//! 对称性信息以及运行状态。
//!
//! ## 依赖关系
//! - 被 `parsers/file_parsers/mod.rs` 使用
//! - 使用 `models/array.rs`, `models/value.rs`

use super::{items_from, ParsableItem, ParsableItems};
use crate::error::{Result, VaspflowError};
use crate::models::{ArrayEntry, ArrayMap, NdArray, ParsedQuantities, ParsedValue};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

static NELM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"NELM\s*=\s*(\d+)").expect("valid regex"));
static NSW_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"NSW\s*=\s*(\d+)").expect("valid regex"));
static SPACE_GROUP_OPS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Found\s+(\d+)\s+space group operations").expect("valid regex"));
static SITE_MAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*magnetization \(([xyz])\)\s*$").expect("valid regex"));

pub fn parsable_items() -> ParsableItems {
    items_from(vec![
        ("total_energies", ParsableItem::default()),
        ("maximum_force", ParsableItem::default()),
        ("maximum_stress", ParsableItem::default()),
        ("symmetries", ParsableItem::default()),
        ("magnetization", ParsableItem::default()),
        ("site_magnetization", ParsableItem::default()),
        ("forces", ParsableItem::default()),
        ("stress", ParsableItem::default()),
        ("run_status", ParsableItem::default()),
    ])
}

/// 单个方向的位点磁矩块
#[derive(Debug, Default)]
struct SiteMagnetization {
    columns: Vec<String>,
    sites: Vec<Vec<f64>>,
    total: Vec<f64>,
}

/// 扫描状态
enum Block {
    None,
    /// 力块，dashes 为已经过的分隔线数
    Forces { dashes: usize, rows: Vec<[f64; 3]> },
    SiteMag { direction: char, dashes: usize, current: SiteMagnetization },
}

#[derive(Debug, Default)]
struct OutcarScan {
    energy_free: Option<f64>,
    energy_no_entropy: Option<f64>,
    energy_extrapolated: Option<f64>,
    forces: Option<Vec<[f64; 3]>>,
    stress: Option<[f64; 6]>,
    magnetization: Option<f64>,
    site_magnetization: Vec<(char, SiteMagnetization)>,
    static_point_group: Option<String>,
    full_point_group: Option<String>,
    space_group_operations: Option<u64>,
    nelm: Option<u64>,
    nsw: Option<u64>,
    finished: bool,
    ionic_converged: bool,
    electronic_converged: Option<bool>,
}

/// 解析 OUTCAR 文件
pub fn parse(path: &Path) -> Result<ParsedQuantities> {
    let file = File::open(path).map_err(|e| VaspflowError::read(path, e))?;
    let reader = BufReader::new(file);
    let lines = reader.lines().map_while(|l| l.ok());
    Ok(scan_lines(lines).into_quantities())
}

fn scan_lines<I: Iterator<Item = String>>(lines: I) -> OutcarScan {
    let mut scan = OutcarScan::default();
    let mut block = Block::None;

    for line in lines {
        block = match block {
            Block::Forces { dashes, mut rows } => {
                if line.trim_start().starts_with("---") {
                    if dashes == 0 {
                        Block::Forces { dashes: 1, rows }
                    } else {
                        scan.forces = Some(rows);
                        Block::None
                    }
                } else {
                    let values: Vec<f64> = line
                        .split_whitespace()
                        .filter_map(|w| w.parse().ok())
                        .collect();
                    if values.len() >= 6 {
                        rows.push([values[3], values[4], values[5]]);
                    }
                    Block::Forces { dashes, rows }
                }
            }
            Block::SiteMag {
                direction,
                dashes,
                mut current,
            } => {
                let trimmed = line.trim();
                if trimmed.starts_with("# of ion") {
                    current.columns = trimmed
                        .trim_start_matches("# of ion")
                        .split_whitespace()
                        .map(str::to_string)
                        .collect();
                    Block::SiteMag { direction, dashes, current }
                } else if trimmed.starts_with("---") {
                    Block::SiteMag {
                        direction,
                        dashes: dashes + 1,
                        current,
                    }
                } else if trimmed.starts_with("tot") {
                    current.total = trimmed
                        .split_whitespace()
                        .skip(1)
                        .filter_map(|w| w.parse().ok())
                        .collect();
                    scan.site_magnetization.retain(|(d, _)| *d != direction);
                    scan.site_magnetization.push((direction, current));
                    Block::None
                } else if dashes == 1 && !trimmed.is_empty() {
                    let values: Vec<f64> = trimmed
                        .split_whitespace()
                        .skip(1)
                        .filter_map(|w| w.parse().ok())
                        .collect();
                    current.sites.push(values);
                    Block::SiteMag { direction, dashes, current }
                } else {
                    Block::SiteMag { direction, dashes, current }
                }
            }
            Block::None => scan_line(&mut scan, &line),
        };
    }

    scan
}

fn scan_line(scan: &mut OutcarScan, line: &str) -> Block {
    if line.contains("POSITION") && line.contains("TOTAL-FORCE") {
        return Block::Forces {
            dashes: 0,
            rows: Vec::new(),
        };
    }

    if let Some(caps) = SITE_MAG_RE.captures(line) {
        let direction = caps[1].chars().next().unwrap_or('x');
        return Block::SiteMag {
            direction,
            dashes: 0,
            current: SiteMagnetization::default(),
        };
    }

    // "  free  energy   TOTEN  =       -10.84173965 eV"
    if line.contains("free") && line.contains("TOTEN") {
        if let Some(val) = extract_number_before(line, "eV") {
            scan.energy_free = Some(val);
        }
    }

    // "  energy  without entropy=      -10.84205245  energy(sigma->0) =      -10.84189605"
    if line.contains("energy  without entropy") || line.contains("energy without entropy") {
        if let Some(pos) = line.find("energy(sigma->0)") {
            scan.energy_no_entropy = extract_number_after(&line[..pos], "=");
            scan.energy_extrapolated = extract_number_after(&line[pos..], "=");
        }
    }

    // "  in kB      -5.12345    -5.12345    -5.12345     0.00000     0.00000     0.00000"
    if line.trim_start().starts_with("in kB") {
        let values: Vec<f64> = line
            .split_whitespace()
            .skip(2)
            .filter_map(|w| w.parse().ok())
            .collect();
        if values.len() == 6 {
            scan.stress = Some([values[0], values[1], values[2], values[3], values[4], values[5]]);
        }
    }

    // " number of electron       8.0000000 magnetization       2.0000000"
    if line.contains("number of electron") && line.contains("magnetization") {
        if let Some(val) = extract_number_after(line, "magnetization") {
            scan.magnetization = Some(val);
        }
    }

    if line.contains("The static configuration has the point symmetry") {
        scan.static_point_group = extract_symmetry_label(line, "point symmetry");
    }
    if line.contains("The point group associated with its full space group is") {
        scan.full_point_group = extract_symmetry_label(line, "space group is");
    }
    if let Some(caps) = SPACE_GROUP_OPS_RE.captures(line) {
        scan.space_group_operations = caps[1].parse().ok();
    }

    if scan.nelm.is_none() {
        if let Some(caps) = NELM_RE.captures(line) {
            scan.nelm = caps[1].parse().ok();
        }
    }
    if scan.nsw.is_none() {
        if let Some(caps) = NSW_RE.captures(line) {
            scan.nsw = caps[1].parse().ok();
        }
    }

    if line.contains("aborting loop because EDIFF is reached") {
        scan.electronic_converged = Some(true);
    }
    if line.contains("EDIFF was not reached") {
        scan.electronic_converged = Some(false);
    }
    if line.contains("reached required accuracy") {
        scan.ionic_converged = true;
    }

    // 检查是否完成
    if line.contains("General timing and accounting informations for this job") {
        scan.finished = true;
    }

    Block::None
}

impl OutcarScan {
    fn into_quantities(self) -> ParsedQuantities {
        let mut parsed = ParsedQuantities::new();

        let mut energies = Map::new();
        if let Some(v) = self.energy_extrapolated {
            energies.insert("energy_extrapolated".into(), json!(v));
        }
        if let Some(v) = self.energy_free {
            energies.insert("energy_free".into(), json!(v));
        }
        if let Some(v) = self.energy_no_entropy {
            energies.insert("energy_no_entropy".into(), json!(v));
        }
        if !energies.is_empty() {
            parsed.insert("total_energies".into(), ParsedValue::Json(Value::Object(energies)));
        }

        if let Some(forces) = &self.forces {
            if let Some(max) = max_row_norm(forces) {
                parsed.insert("maximum_force".into(), ParsedValue::Json(json!(max)));
            }
            let mut arrays = ArrayMap::new();
            arrays.insert("forces".into(), ArrayEntry::Numeric(NdArray::from_rows(forces)));
            parsed.insert("forces".into(), ParsedValue::Arrays(arrays));
        }

        if let Some(s) = self.stress {
            // VASP 顺序: XX YY ZZ XY YZ ZX
            let matrix = [[s[0], s[3], s[5]], [s[3], s[1], s[4]], [s[5], s[4], s[2]]];
            if let Some(max) = max_row_norm(&matrix) {
                parsed.insert("maximum_stress".into(), ParsedValue::Json(json!(max)));
            }
            let mut arrays = ArrayMap::new();
            arrays.insert("stress".into(), ArrayEntry::Numeric(NdArray::from_rows(&matrix)));
            parsed.insert("stress".into(), ParsedValue::Arrays(arrays));
        }

        if self.static_point_group.is_some()
            || self.full_point_group.is_some()
            || self.space_group_operations.is_some()
        {
            parsed.insert(
                "symmetries".into(),
                ParsedValue::Json(json!({
                    "point_group": self.static_point_group,
                    "full_space_group_point_group": self.full_point_group,
                    "num_space_group_operations": self.space_group_operations,
                })),
            );
        }

        if let Some(mag) = self.magnetization {
            parsed.insert("magnetization".into(), ParsedValue::Json(json!(mag)));
        }

        if !self.site_magnetization.is_empty() {
            let mut sphere = Map::new();
            for (direction, block) in &self.site_magnetization {
                sphere.insert(direction.to_string(), site_magnetization_json(block));
            }
            parsed.insert(
                "site_magnetization".into(),
                ParsedValue::Json(json!({
                    "sphere": sphere,
                    "full_cell": self.magnetization.map(|m| vec![m]).unwrap_or_default(),
                })),
            );
        }

        parsed.insert(
            "run_status".into(),
            ParsedValue::Json(json!({
                "finished": self.finished,
                "electronic_converged": self.electronic_converged,
                "ionic_converged": self.ionic_converged,
                "nelm": self.nelm,
                "nsw": self.nsw,
            })),
        );

        parsed
    }
}

fn site_magnetization_json(block: &SiteMagnetization) -> Value {
    let row = |values: &[f64]| -> Value {
        let map: Map<String, Value> = block
            .columns
            .iter()
            .zip(values.iter())
            .map(|(c, v)| (c.clone(), json!(v)))
            .collect();
        Value::Object(map)
    };
    let site_moment: Map<String, Value> = block
        .sites
        .iter()
        .enumerate()
        .map(|(i, values)| ((i + 1).to_string(), row(values)))
        .collect();
    json!({
        "site_moment": site_moment,
        "total_magnetization": row(&block.total),
    })
}

fn max_row_norm(rows: &[[f64; 3]]) -> Option<f64> {
    rows.iter()
        .map(|r| (r[0] * r[0] + r[1] * r[1] + r[2] * r[2]).sqrt())
        .fold(None, |acc: Option<f64>, n| Some(acc.map_or(n, |a| a.max(n))))
}

fn extract_symmetry_label(line: &str, marker: &str) -> Option<String> {
    let pos = line.find(marker)?;
    let label = line[pos + marker.len()..].trim().trim_end_matches('.').trim();
    if label.is_empty() {
        None
    } else {
        Some(label.to_string())
    }
}

/// 从字符串中提取指定标记之前的数字
fn extract_number_before(s: &str, marker: &str) -> Option<f64> {
    if let Some(pos) = s.find(marker) {
        let before = &s[..pos];
        before.split_whitespace().last()?.parse().ok()
    } else {
        None
    }
}

/// 从字符串中提取指定标记之后的数字
fn extract_number_after(s: &str, marker: &str) -> Option<f64> {
    if let Some(pos) = s.find(marker) {
        let after = &s[pos + marker.len()..];
        after.trim_start_matches(|c: char| c == '=' || c.is_whitespace())
            .split_whitespace()
            .next()?
            .parse()
            .ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTCAR: &str = r#" vasp.6.3.0 18Jan22 (build Feb 02 2022) complex
   NIONS =       2
   NELM   =     60;   NELMIN=  2; NELMDL= -5     electronic SCF-steps
   NSW    =      1    number of steps for IOM
 The static configuration has the point symmetry O_h .
 The point group associated with its full space group is O_h .
 Found     48 space group operations
 number of electron       8.0000000 magnetization       2.1000000
 ------------------------ aborting loop because EDIFF is reached ----------------------------------------
  in kB      -5.00000    -5.00000    -5.00000     0.00000     0.00000     0.00000
 POSITION                                       TOTAL-FORCE (eV/Angst)
 -----------------------------------------------------------------------------------
      0.00000      0.00000      0.00000         0.300000      0.000000      0.400000
      1.35750      1.35750      1.35750        -0.300000      0.000000     -0.400000
 -----------------------------------------------------------------------------------
  FREE ENERGIE OF THE ION-ELECTRON SYSTEM (eV)
  ---------------------------------------------------
  free  energy   TOTEN  =       -10.84173965 eV

  energy  without entropy=      -10.84205245  energy(sigma->0) =      -10.84189605

 magnetization (x)

# of ion       s       p       d       tot
------------------------------------------
    1        0.010   0.020   1.000   1.030
    2        0.010   0.020   1.000   1.030
--------------------------------------------------
tot          0.020   0.040   2.000   2.060

 reached required accuracy - stopping structural energy minimisation
 General timing and accounting informations for this job:
"#;

    fn scan_fixture() -> ParsedQuantities {
        scan_lines(OUTCAR.lines().map(str::to_string)).into_quantities()
    }

    #[test]
    fn test_energies() {
        let parsed = scan_fixture();
        let energies = parsed["total_energies"].to_json();
        assert_eq!(energies["energy_free"], json!(-10.84173965));
        assert_eq!(energies["energy_no_entropy"], json!(-10.84205245));
        assert_eq!(energies["energy_extrapolated"], json!(-10.84189605));
    }

    #[test]
    fn test_forces_and_maximum_force() {
        let parsed = scan_fixture();
        match &parsed["forces"] {
            ParsedValue::Arrays(arrays) => match &arrays["forces"] {
                ArrayEntry::Numeric(arr) => {
                    assert_eq!(arr.shape, vec![2, 3]);
                    assert_eq!(arr.get(&[1, 2]), Some(-0.4));
                }
                other => panic!("unexpected entry {:?}", other),
            },
            other => panic!("unexpected value {:?}", other),
        }
        let max = parsed["maximum_force"].to_json().as_f64().unwrap();
        assert!((max - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_stress_matrix() {
        let parsed = scan_fixture();
        let max = parsed["maximum_stress"].to_json().as_f64().unwrap();
        assert!((max - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_symmetries_and_status() {
        let parsed = scan_fixture();
        let sym = parsed["symmetries"].to_json();
        assert_eq!(sym["point_group"], "O_h");
        assert_eq!(sym["num_space_group_operations"], 48);

        let status = parsed["run_status"].to_json();
        assert_eq!(status["finished"], true);
        assert_eq!(status["electronic_converged"], true);
        assert_eq!(status["ionic_converged"], true);
        assert_eq!(status["nelm"], 60);
        assert_eq!(status["nsw"], 1);
    }

    #[test]
    fn test_magnetization() {
        let parsed = scan_fixture();
        assert_eq!(parsed["magnetization"].to_json(), json!(2.1));

        let site = parsed["site_magnetization"].to_json();
        assert_eq!(site["sphere"]["x"]["site_moment"]["2"]["d"], json!(1.0));
        assert_eq!(site["sphere"]["x"]["total_magnetization"]["tot"], json!(2.06));
        assert_eq!(site["full_cell"], json!([2.1]));
    }

    #[test]
    fn test_unfinished_run_has_only_status() {
        let parsed = scan_lines(["   NELM   =     60;".to_string()].into_iter()).into_quantities();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["run_status"].to_json()["finished"], false);
    }
}
