//! # VASP 计算准备
//!
//! 把一组输入（INCAR 参数、结构、k 点、赝势、可选的电荷密度/波函数、
//! 续算目录、作业设置）写成可直接运行 VASP 的计算目录，并生成
//! `calcinfo.json` 作为后续解析的作业上下文。
//!
//! ## 写出的文件
//! - `INCAR`: 用户参数优先，`incar_defaults` 垫底
//! - `POSCAR`: 分数坐标，精度取自设置（默认 10 位）
//! - `POTCAR`: 按结构中种类的出现顺序拼接
//! - `KPOINTS`: 同时设置 `KSPACING` 与 `KGAMMA` 时省略
//! - `CHGCAR`: `ICHARG` ∈ {1, 11} 时复制
//! - `WAVECAR`: `ISTART` ∈ {1, 2, 3} 时复制
//!
//! ## 依赖关系
//! - 被 `workchains/vasp.rs`, `commands/prepare.rs` 使用
//! - 使用 `parsers/{incar,poscar,kpoints}.rs` 写文件
//! - 使用 `config.rs` 作业设置

use crate::config::JobSettings;
use crate::error::{Result, VaspflowError};
use crate::models::{Incar, KpointsData, StructureData};
use crate::parsers::incar::to_incar_string;
use crate::parsers::kpoints::to_kpoints_string;
use crate::parsers::poscar::to_poscar_string;
use crate::parsers::{ParserSettings, RetrieveLists, RESULTS_FILE};
use crate::utils::slurm::SUBMIT_SCRIPT;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 作业上下文文件名
pub const CALCINFO_FILE: &str = "calcinfo.json";

/// 每次计算都取回的文件
pub const ALWAYS_RETRIEVE_LIST: &[&str] = &[
    "CONTCAR",
    "OUTCAR",
    "vasprun.xml",
    "EIGENVAL",
    "DOSCAR",
    "wannier90*",
];

/// 续算时不从上一次计算目录复制的文件
const RESTART_EXCLUDED: &[&str] = &["INCAR", SUBMIT_SCRIPT, CALCINFO_FILE, RESULTS_FILE];

// ─────────────────────────────────────────────────────────────
// 作业上下文
// ─────────────────────────────────────────────────────────────

/// 一次复制：源文件 -> 计算目录中的文件名
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyEntry {
    pub source: PathBuf,
    pub target: String,
}

/// 计算准备的产物，持久化为 `calcinfo.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalcInfo {
    pub retrieve_list: Vec<String>,
    pub retrieve_temporary_list: Vec<String>,
    /// 电荷密度、波函数等输入文件
    pub local_copy_list: Vec<CopyEntry>,
    /// 续算目录中的文件
    pub remote_copy_list: Vec<CopyEntry>,
    /// 按出现顺序去重的元素
    pub elements: Vec<String>,
    pub stdout_name: String,
    pub parser_settings: ParserSettings,
}

impl CalcInfo {
    /// 仅由设置构造（没有 `calcinfo.json` 的目录）
    pub fn from_settings(settings: &JobSettings) -> Self {
        CalcInfo {
            retrieve_list: retrieve_list(settings),
            stdout_name: settings.parser_settings.stdout_name().to_string(),
            parser_settings: settings.parser_settings.clone(),
            ..Default::default()
        }
    }

    /// 读取目录中的 `calcinfo.json`
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CALCINFO_FILE);
        if !path.exists() {
            return Err(VaspflowError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let content = fs::read_to_string(&path).map_err(|e| VaspflowError::read(&path, e))?;
        let calcinfo: CalcInfo = serde_json::from_str(&content)?;
        calcinfo
            .parser_settings
            .validate()
            .map_err(|reason| VaspflowError::ConfigError {
                path: path.display().to_string(),
                reason,
            })?;
        Ok(calcinfo)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = dir.join(CALCINFO_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).map_err(|e| VaspflowError::write(&path, e))
    }
}

impl RetrieveLists for CalcInfo {
    fn retrieve_list(&self) -> Vec<String> {
        self.retrieve_list.clone()
    }

    fn retrieve_temporary_list(&self) -> Vec<String> {
        self.retrieve_temporary_list.clone()
    }
}

/// 固定取回列表 + 额外取回列表 + 调度器 stdout，去重并保持顺序
pub fn retrieve_list(settings: &JobSettings) -> Vec<String> {
    let mut list: Vec<String> = Vec::new();
    let candidates = ALWAYS_RETRIEVE_LIST
        .iter()
        .map(|s| s.to_string())
        .chain(settings.additional_retrieve_list.iter().cloned())
        .chain(std::iter::once(
            settings.parser_settings.stdout_name().to_string(),
        ));
    for name in candidates {
        if !list.contains(&name) {
            list.push(name);
        }
    }
    list
}

// ─────────────────────────────────────────────────────────────
// 输入
// ─────────────────────────────────────────────────────────────

/// 一次 VASP 计算的全部输入
#[derive(Debug, Clone, Default)]
pub struct VaspInputs {
    pub parameters: Incar,
    pub structure: StructureData,
    pub kpoints: Option<KpointsData>,
    /// 种类名 -> POTCAR 文件
    pub potentials: BTreeMap<String, PathBuf>,
    pub charge_density: Option<PathBuf>,
    pub wavefunctions: Option<PathBuf>,
    pub restart_folder: Option<PathBuf>,
    pub settings: JobSettings,
}

/// 从赝势库中为每个种类选取 POTCAR
///
/// 查找 `<family>/<name>/POTCAR`，`name` 依次取映射表中种类名、元素符号的条目，
/// 缺省为元素符号本身。
pub fn potentials_from_family(
    family: &Path,
    structure: &StructureData,
    mapping: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, PathBuf>> {
    let mut potentials = BTreeMap::new();
    for kind in structure.kind_names() {
        let symbol = structure.symbol_of_kind(&kind).unwrap_or(kind.as_str());
        let name = mapping
            .get(&kind)
            .or_else(|| mapping.get(symbol))
            .map(String::as_str)
            .unwrap_or(symbol);
        let path = family.join(name).join("POTCAR");
        if !path.is_file() {
            return Err(VaspflowError::MissingPotential { kind });
        }
        potentials.insert(kind, path);
    }
    Ok(potentials)
}

// ─────────────────────────────────────────────────────────────
// 计算
// ─────────────────────────────────────────────────────────────

/// VASP 计算
pub struct VaspCalculation {
    inputs: VaspInputs,
}

impl VaspCalculation {
    pub fn new(inputs: VaspInputs) -> Self {
        VaspCalculation { inputs }
    }

    pub fn inputs(&self) -> &VaspInputs {
        &self.inputs
    }

    /// 实际写入 INCAR 的参数
    pub fn parameters(&self) -> Incar {
        self.inputs
            .parameters
            .with_defaults(&self.inputs.settings.incar_defaults())
    }

    fn int_parameter(&self, tag: &str) -> Option<i64> {
        self.parameters().get(tag).and_then(|v| v.as_int())
    }

    /// 是否需要 KPOINTS
    pub fn need_kpoints(&self) -> bool {
        let params = self.parameters();
        !(params.contains("KSPACING") && params.contains("KGAMMA"))
    }

    /// 是否需要 WAVECAR
    pub fn need_wavefunctions(&self) -> bool {
        let default = if self.inputs.wavefunctions.is_some() { 1 } else { 0 };
        let istart = self.int_parameter("ISTART").unwrap_or(default);
        matches!(istart, 1 | 2 | 3)
    }

    /// 是否需要 CHGCAR
    pub fn need_charge_density(&self) -> bool {
        let default = if self.need_wavefunctions() { 0 } else { 2 };
        let icharg = self.int_parameter("ICHARG").unwrap_or(default);
        matches!(icharg, 1 | 11)
    }

    /// 检查输入是否齐全
    pub fn verify_inputs(&self) -> Result<()> {
        if self.inputs.structure.sites.is_empty() {
            return Err(VaspflowError::ValidationError(
                "the input structure has no sites".to_string(),
            ));
        }
        for kind in self.inputs.structure.kind_names() {
            if !self.inputs.potentials.contains_key(&kind) {
                return Err(VaspflowError::MissingPotential { kind });
            }
        }
        if self.need_kpoints() && self.inputs.kpoints.is_none() {
            return Err(VaspflowError::ValidationError(
                "KPOINTS are required unless both KSPACING and KGAMMA are set".to_string(),
            ));
        }
        if self.need_charge_density()
            && self.inputs.charge_density.is_none()
            && self.inputs.restart_folder.is_none()
        {
            return Err(VaspflowError::ValidationError(
                "ICHARG requests a charge density but no CHGCAR was given".to_string(),
            ));
        }
        if self.need_wavefunctions()
            && self.inputs.wavefunctions.is_none()
            && self.inputs.restart_folder.is_none()
        {
            return Err(VaspflowError::ValidationError(
                "ISTART requests wave functions but no WAVECAR was given".to_string(),
            ));
        }
        if let Some(restart) = &self.inputs.restart_folder {
            if !restart.is_dir() {
                return Err(VaspflowError::DirectoryNotFound {
                    path: restart.display().to_string(),
                });
            }
        }
        Ok(())
    }

    /// 在 `folder` 中写出全部输入文件并返回作业上下文
    pub fn prepare_for_submission(&self, folder: &Path) -> Result<CalcInfo> {
        self.verify_inputs()?;
        fs::create_dir_all(folder).map_err(|e| VaspflowError::write(folder, e))?;

        let mut calcinfo = CalcInfo::from_settings(&self.inputs.settings);
        calcinfo.elements = self.elements();

        if let Some(restart) = &self.inputs.restart_folder {
            calcinfo.remote_copy_list = restart_copy_list(restart)?;
            // 续算目录中的文件先落地，后面写出的输入文件覆盖它们
            stage_copies(&calcinfo.remote_copy_list, folder)?;
        }

        self.write_incar(&folder.join("INCAR"))?;
        self.write_poscar(&folder.join("POSCAR"))?;
        self.write_potcar(&folder.join("POTCAR"))?;
        if self.need_kpoints() {
            self.write_kpoints(&folder.join("KPOINTS"))?;
        }

        if self.need_charge_density() {
            if let Some(chgcar) = &self.inputs.charge_density {
                calcinfo.local_copy_list.push(CopyEntry {
                    source: chgcar.clone(),
                    target: "CHGCAR".to_string(),
                });
            }
        }
        if self.need_wavefunctions() {
            if let Some(wavecar) = &self.inputs.wavefunctions {
                calcinfo.local_copy_list.push(CopyEntry {
                    source: wavecar.clone(),
                    target: "WAVECAR".to_string(),
                });
            }
        }
        stage_copies(&calcinfo.local_copy_list, folder)?;

        calcinfo.save(folder)?;
        info!(
            "Prepared VASP calculation for {} in {}",
            self.inputs.structure.formula(),
            folder.display()
        );
        Ok(calcinfo)
    }

    fn elements(&self) -> Vec<String> {
        let mut elements: Vec<String> = Vec::new();
        for site in &self.inputs.structure.sites {
            if !elements.contains(&site.symbol) {
                elements.push(site.symbol.clone());
            }
        }
        elements
    }

    pub fn write_incar(&self, dst: &Path) -> Result<()> {
        fs::write(dst, to_incar_string(&self.parameters())).map_err(|e| VaspflowError::write(dst, e))
    }

    pub fn write_poscar(&self, dst: &Path) -> Result<()> {
        let content = to_poscar_string(
            &self.inputs.structure,
            &self.inputs.structure.formula(),
            self.inputs.settings.poscar_precision(),
        );
        fs::write(dst, content).map_err(|e| VaspflowError::write(dst, e))
    }

    /// 按种类顺序拼接 POTCAR
    pub fn write_potcar(&self, dst: &Path) -> Result<()> {
        let mut content = String::new();
        for kind in self.inputs.structure.kind_names() {
            let path = self
                .inputs
                .potentials
                .get(&kind)
                .ok_or_else(|| VaspflowError::MissingPotential { kind: kind.clone() })?;
            let potcar = fs::read_to_string(path).map_err(|e| VaspflowError::read(path, e))?;
            content.push_str(&potcar);
            if !potcar.ends_with('\n') {
                content.push('\n');
            }
        }
        fs::write(dst, content).map_err(|e| VaspflowError::write(dst, e))
    }

    pub fn write_kpoints(&self, dst: &Path) -> Result<()> {
        let kpoints = self.inputs.kpoints.as_ref().ok_or_else(|| {
            VaspflowError::ValidationError("no k-points were given".to_string())
        })?;
        fs::write(dst, to_kpoints_string(kpoints, "Generated by vaspflow"))
            .map_err(|e| VaspflowError::write(dst, e))
    }
}

/// 续算目录中除排除项外的所有文件
fn restart_copy_list(restart: &Path) -> Result<Vec<CopyEntry>> {
    let entries = fs::read_dir(restart).map_err(|e| VaspflowError::read(restart, e))?;
    let mut list: Vec<CopyEntry> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|name| !RESTART_EXCLUDED.contains(&name.as_str()))
        .map(|name| CopyEntry {
            source: restart.join(&name),
            target: name,
        })
        .collect();
    list.sort_by(|a, b| a.target.cmp(&b.target));
    Ok(list)
}

fn stage_copies(list: &[CopyEntry], folder: &Path) -> Result<()> {
    for entry in list {
        let dst = folder.join(&entry.target);
        if entry.source == dst {
            continue;
        }
        debug!("Copying {} -> {}", entry.source.display(), dst.display());
        fs::copy(&entry.source, &dst).map_err(|e| VaspflowError::read(&entry.source, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IncarValue, Lattice};

    fn silicon() -> StructureData {
        let mut s = StructureData::new(Lattice::from_vectors([
            [5.43, 0.0, 0.0],
            [0.0, 5.43, 0.0],
            [0.0, 0.0, 5.43],
        ]));
        s.append_atom([0.0, 0.0, 0.0], "Si", None);
        s.append_atom([1.3575, 1.3575, 1.3575], "Si", None);
        s
    }

    fn inputs(dir: &Path) -> VaspInputs {
        let potcar = dir.join("POTCAR.Si");
        fs::write(&potcar, "PAW_PBE Si 05Jan2001\nEnd of Dataset\n").unwrap();
        let mut parameters = Incar::new();
        parameters.set("ENCUT", 400i64);
        let mut kpoints = KpointsData::default();
        kpoints.set_kpoints_mesh([4, 4, 4], [0.0; 3]);
        VaspInputs {
            parameters,
            structure: silicon(),
            kpoints: Some(kpoints),
            potentials: BTreeMap::from([("Si".to_string(), potcar)]),
            ..Default::default()
        }
    }

    #[test]
    fn test_prepare_writes_inputs_and_calcinfo() {
        let dir = tempfile::tempdir().unwrap();
        let mut inputs = inputs(dir.path());
        inputs.settings.incar_defaults.insert("ENCUT".into(), IncarValue::Int(520));
        inputs.settings.incar_defaults.insert("PREC".into(), IncarValue::Str("Accurate".into()));
        inputs.settings.additional_retrieve_list = vec!["OUTCAR".into(), "PROCAR".into()];

        let folder = dir.path().join("calc");
        let calcinfo = VaspCalculation::new(inputs).prepare_for_submission(&folder).unwrap();

        let incar = fs::read_to_string(folder.join("INCAR")).unwrap();
        assert!(incar.contains("ENCUT = 400"));
        assert!(incar.contains("PREC = Accurate"));
        assert!(folder.join("POSCAR").exists());
        assert!(folder.join("KPOINTS").exists());
        assert!(!folder.join("CHGCAR").exists());

        assert_eq!(calcinfo.elements, vec!["Si"]);
        assert_eq!(
            calcinfo.retrieve_list.iter().filter(|f| *f == "OUTCAR").count(),
            1
        );
        assert!(calcinfo.retrieve_list.contains(&"PROCAR".to_string()));
        assert!(calcinfo.retrieve_list.contains(&"_scheduler-stdout.txt".to_string()));

        let reloaded = CalcInfo::load(&folder).unwrap();
        assert_eq!(reloaded, calcinfo);
    }

    #[test]
    fn test_potcar_concatenated_in_kind_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut inputs = inputs(dir.path());
        inputs.structure.append_atom([0.5, 0.5, 0.5], "O", None);
        let o = dir.path().join("POTCAR.O");
        fs::write(&o, "PAW_PBE O 08Apr2002").unwrap();
        inputs.potentials.insert("O".into(), o);

        let folder = dir.path().join("calc");
        VaspCalculation::new(inputs).prepare_for_submission(&folder).unwrap();
        let potcar = fs::read_to_string(folder.join("POTCAR")).unwrap();
        let si = potcar.find("PAW_PBE Si").unwrap();
        let o = potcar.find("PAW_PBE O").unwrap();
        assert!(si < o);
    }

    #[test]
    fn test_missing_potential() {
        let dir = tempfile::tempdir().unwrap();
        let mut inputs = inputs(dir.path());
        inputs.potentials.clear();
        let err = VaspCalculation::new(inputs).verify_inputs().unwrap_err();
        assert!(matches!(err, VaspflowError::MissingPotential { kind } if kind == "Si"));
    }

    #[test]
    fn test_kpoints_skipped_with_kspacing_and_kgamma() {
        let dir = tempfile::tempdir().unwrap();
        let mut inputs = inputs(dir.path());
        inputs.kpoints = None;
        inputs.parameters.set("KSPACING", 0.25);
        inputs.parameters.set("KGAMMA", true);

        let folder = dir.path().join("calc");
        VaspCalculation::new(inputs).prepare_for_submission(&folder).unwrap();
        assert!(!folder.join("KPOINTS").exists());
    }

    #[test]
    fn test_wavefunction_and_charge_density_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let wavecar = dir.path().join("WAVECAR.in");
        fs::write(&wavecar, "wave").unwrap();

        let mut inputs = inputs(dir.path());
        inputs.wavefunctions = Some(wavecar);
        let calc = VaspCalculation::new(inputs.clone());
        assert!(calc.need_wavefunctions());
        // ICHARG 默认为 0
        assert!(!calc.need_charge_density());

        inputs.parameters.set("ICHARG", 11i64);
        let chgcar = dir.path().join("CHGCAR.in");
        fs::write(&chgcar, "charge").unwrap();
        inputs.charge_density = Some(chgcar);
        let folder = dir.path().join("calc");
        let calcinfo = VaspCalculation::new(inputs).prepare_for_submission(&folder).unwrap();
        assert_eq!(fs::read_to_string(folder.join("WAVECAR")).unwrap(), "wave");
        assert_eq!(fs::read_to_string(folder.join("CHGCAR")).unwrap(), "charge");
        assert_eq!(calcinfo.local_copy_list.len(), 2);
    }

    #[test]
    fn test_charge_density_required_by_icharg() {
        let dir = tempfile::tempdir().unwrap();
        let mut inputs = inputs(dir.path());
        inputs.parameters.set("ICHARG", 1i64);
        assert!(matches!(
            VaspCalculation::new(inputs).verify_inputs(),
            Err(VaspflowError::ValidationError(_))
        ));
    }

    #[test]
    fn test_restart_copies_all_but_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let previous = dir.path().join("previous");
        fs::create_dir_all(&previous).unwrap();
        for name in ["INCAR", "WAVECAR", "CONTCAR", CALCINFO_FILE, SUBMIT_SCRIPT] {
            fs::write(previous.join(name), name).unwrap();
        }

        let mut inputs = inputs(dir.path());
        inputs.restart_folder = Some(previous);
        let folder = dir.path().join("calc");
        let calcinfo = VaspCalculation::new(inputs).prepare_for_submission(&folder).unwrap();

        let copied: Vec<&str> = calcinfo
            .remote_copy_list
            .iter()
            .map(|c| c.target.as_str())
            .collect();
        assert_eq!(copied, vec!["CONTCAR", "WAVECAR"]);
        assert!(fs::read_to_string(folder.join("INCAR")).unwrap().contains("ENCUT"));
        assert!(!folder.join(SUBMIT_SCRIPT).exists());
    }

    #[test]
    fn test_potentials_from_family_with_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let family = dir.path().join("PBE");
        fs::create_dir_all(family.join("Si_GW")).unwrap();
        fs::write(family.join("Si_GW").join("POTCAR"), "Si_GW").unwrap();

        let mapping = BTreeMap::from([("Si".to_string(), "Si_GW".to_string())]);
        let potentials = potentials_from_family(&family, &silicon(), &mapping).unwrap();
        assert_eq!(potentials["Si"], family.join("Si_GW").join("POTCAR"));

        assert!(matches!(
            potentials_from_family(&family, &silicon(), &BTreeMap::new()),
            Err(VaspflowError::MissingPotential { .. })
        ));
    }

    #[test]
    fn test_calcinfo_with_misspelled_switch_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CALCINFO_FILE),
            r#"{"parser_settings": {"add_strucutre": true}}"#,
        )
        .unwrap();
        assert!(matches!(
            CalcInfo::load(dir.path()),
            Err(VaspflowError::ConfigError { .. })
        ));
    }
}
