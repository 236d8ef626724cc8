//! # VASP 解析驱动
//!
//! 解析一个作业目录：检查关键文件、建立物理量注册表、选择物理量、
//! 每个文件只打开一次、组装所有启用的输出节点。
//!
//! ## 退出码
//! - 0   NO_ERROR
//! - 100 ERROR_NO_RETRIEVED_FOLDER
//! - 200 ERROR_CRITICAL_MISSING_FILE
//! - 300 ERROR_PARSING_FILE_FAILED
//!
//! ## 依赖关系
//! - 被 `commands/{parse,compose,collect}.rs`, `workchains/vasp.rs` 使用
//! - 使用 `parsers/quantity.rs`, `parsers/manager.rs`, `parsers/node_composer.rs`,
//!   `parsers/settings.rs`, `parsers/file_parsers/`

use super::file_parsers::{FileParser, LazyFileParser, ParserDefinition};
use super::manager::{ParserManager, QuantityDiagnostic, RetrieveLists};
use super::node_composer::NodeComposer;
use super::quantity::ParsableQuantities;
use super::settings::ParserSettings;
use crate::error::{Result, VaspflowError};
use crate::models::{NodeType, OutputNode, ParsedQuantities};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// 结果文件名
pub const RESULTS_FILE: &str = "results.json";

/// 解析退出码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParserExitCode {
    NoError,
    NoRetrievedFolder,
    CriticalMissingFile,
    ParsingFileFailed,
}

impl ParserExitCode {
    pub fn status(&self) -> u32 {
        match self {
            ParserExitCode::NoError => 0,
            ParserExitCode::NoRetrievedFolder => 100,
            ParserExitCode::CriticalMissingFile => 200,
            ParserExitCode::ParsingFileFailed => 300,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ParserExitCode::NoError => "NO_ERROR",
            ParserExitCode::NoRetrievedFolder => "ERROR_NO_RETRIEVED_FOLDER",
            ParserExitCode::CriticalMissingFile => "ERROR_CRITICAL_MISSING_FILE",
            ParserExitCode::ParsingFileFailed => "ERROR_PARSING_FILE_FAILED",
        }
    }
}

/// 一次解析的结果
#[derive(Debug, Clone, Serialize)]
pub struct ParseOutcome {
    pub exit_status: u32,
    pub exit_message: String,
    /// 链接名 -> 输出节点
    pub outputs: BTreeMap<String, OutputNode>,
    #[serde(skip)]
    pub exit_code: ParserExitCode,
    #[serde(skip)]
    pub diagnostics: Vec<QuantityDiagnostic>,
}

impl ParseOutcome {
    pub fn new(exit_code: ParserExitCode, message: impl Into<String>) -> Self {
        ParseOutcome {
            exit_status: exit_code.status(),
            exit_message: message.into(),
            outputs: BTreeMap::new(),
            exit_code,
            diagnostics: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.exit_code == ParserExitCode::NoError
    }

    /// misc 节点中 `run_status.finished`
    pub fn run_finished(&self) -> Option<bool> {
        self.outputs
            .get("misc")?
            .as_dict()?
            .get("run_status")?
            .get("finished")?
            .as_bool()
    }

    /// misc 节点中错误的简称
    pub fn notifications(&self) -> Vec<String> {
        self.notification_entries()
            .iter()
            .filter_map(|e| e.get("shortname").and_then(|s| s.as_str()))
            .map(str::to_string)
            .collect()
    }

    /// 是否存在致命错误
    pub fn has_critical_notifications(&self) -> bool {
        self.notification_entries()
            .iter()
            .any(|e| e.get("critical").and_then(|c| c.as_bool()).unwrap_or(false))
    }

    fn notification_entries(&self) -> Vec<serde_json::Value> {
        self.outputs
            .get("misc")
            .and_then(|n| n.as_dict())
            .and_then(|d| d.get("notifications"))
            .and_then(|n| n.as_array())
            .cloned()
            .unwrap_or_default()
    }

    /// 写入 `results.json`
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| VaspflowError::write(path, e))
    }
}

/// VASP 解析器
pub struct VaspParser<'a> {
    settings: &'a ParserSettings,
    job: &'a dyn RetrieveLists,
}

impl<'a> VaspParser<'a> {
    pub fn new(settings: &'a ParserSettings, job: &'a dyn RetrieveLists) -> Self {
        VaspParser { settings, job }
    }

    /// 解析取回目录
    ///
    /// 未知节点类型和重复的物理量定义直接返回错误；其他失败以退出码表示。
    pub fn parse(&self, retrieved: &Path) -> Result<ParseOutcome> {
        if !retrieved.is_dir() {
            error!("Retrieved folder {} does not exist", retrieved.display());
            return Ok(ParseOutcome::new(
                ParserExitCode::NoRetrievedFolder,
                "the retrieved folder data node could not be accessed",
            ));
        }

        let retrieved_files = list_files(retrieved)?;
        let definitions = self.settings.parser_definitions()?;

        for def in definitions.iter().filter(|d| d.is_critical) {
            if !retrieved_files.contains(&def.file_name) {
                error!("Critical file {} is missing", def.file_name);
                return Ok(ParseOutcome::new(
                    ParserExitCode::CriticalMissingFile,
                    format!("a critical file {} was not retrieved", def.file_name),
                ));
            }
        }

        let collected = self.parse_quantities(
            retrieved,
            &retrieved_files,
            &definitions,
            &self.settings.quantities_to_parse(),
        )?;
        let composer = &collected.composer;
        let failed_files = collected.failed_files;
        let mut outcome = ParseOutcome::new(ParserExitCode::NoError, "");
        let mut failed_nodes: Vec<String> = Vec::new();

        for node in self.settings.output_nodes() {
            match composer.compose(&node.node_type, Some(&node.quantities)) {
                Ok(output) => {
                    info!("Composed {} node '{}'", node.node_type, node.link_name);
                    outcome.outputs.insert(node.link_name, output);
                }
                Err(e @ VaspflowError::UnknownNodeType(_)) => return Err(e),
                Err(e) => {
                    warn!("Node '{}' could not be composed: {}", node.link_name, e);
                    failed_nodes.push(node.link_name);
                }
            }
        }

        outcome.diagnostics = collected.diagnostics;
        if !failed_files.is_empty() || !failed_nodes.is_empty() {
            outcome.exit_code = ParserExitCode::ParsingFileFailed;
            outcome.exit_status = outcome.exit_code.status();
            let mut parts = Vec::new();
            if !failed_files.is_empty() {
                parts.push(format!("failed to parse {}", failed_files.join(", ")));
            }
            if !failed_nodes.is_empty() {
                parts.push(format!("failed to compose {}", failed_nodes.join(", ")));
            }
            outcome.exit_message = parts.join("; ");
        }

        Ok(outcome)
    }

    /// 只解析所需物理量并组装一个节点；`quantities` 为空时使用该节点类型的默认物理量
    pub fn compose_node(
        &self,
        retrieved: &Path,
        node_type: &str,
        quantities: &[String],
    ) -> Result<OutputNode> {
        if !retrieved.is_dir() {
            return Err(VaspflowError::DirectoryNotFound {
                path: retrieved.display().to_string(),
            });
        }
        let requested: Vec<String> = if quantities.is_empty() {
            let node_type: NodeType = node_type.parse()?;
            node_type
                .required_quantities()
                .iter()
                .map(|q| q.to_string())
                .collect()
        } else {
            quantities.to_vec()
        };

        let retrieved_files = list_files(retrieved)?;
        let definitions = self.settings.parser_definitions()?;
        let collected = self.parse_quantities(retrieved, &retrieved_files, &definitions, &requested)?;
        if let Some(file) = collected.failed_files.first() {
            return Err(VaspflowError::parse(
                "VASP output",
                retrieved.join(file).display().to_string(),
                "the file parser failed",
            ));
        }
        collected.composer.compose(node_type, Some(&requested))
    }

    /// 建立注册表、选择物理量，每个文件只打开一次
    fn parse_quantities(
        &self,
        retrieved: &Path,
        retrieved_files: &[String],
        definitions: &[ParserDefinition],
        requested: &[String],
    ) -> Result<CollectedQuantities> {
        let registry = ParsableQuantities::setup(retrieved_files, definitions)?;
        let manager = ParserManager::setup(requested, &registry, self.job);

        let mut parsed = ParsedQuantities::new();
        let mut failed_files: Vec<String> = Vec::new();

        for def in definitions {
            let keys: Vec<&String> = manager
                .quantities_to_parse()
                .iter()
                .filter(|q| {
                    registry
                        .get(q)
                        .and_then(|pq| pq.file_name.as_deref())
                        .map(|f| f == def.file_name)
                        .unwrap_or(false)
                })
                .collect();
            if keys.is_empty() {
                continue;
            }

            debug!("Opening {} for {} quantities", def.file_name, keys.len());
            let mut parser = LazyFileParser::open(
                def.kind,
                &retrieved.join(&def.file_name),
                self.settings.parser_options(),
            );
            for key in keys {
                match parser.get_quantity(key) {
                    Ok(Some(value)) => {
                        parsed.insert(key.clone(), value);
                    }
                    Ok(None) => debug!("{} not found in {}", key, def.file_name),
                    Err(e) => {
                        error!("Failed to parse {}: {}", def.file_name, e);
                        failed_files.push(def.file_name.clone());
                        break;
                    }
                }
            }
        }

        Ok(CollectedQuantities {
            composer: NodeComposer::new(registry, parsed),
            diagnostics: manager.diagnostics().to_vec(),
            failed_files,
        })
    }
}

/// 解析阶段的产物
struct CollectedQuantities {
    composer: NodeComposer,
    diagnostics: Vec<QuantityDiagnostic>,
    failed_files: Vec<String>,
}

/// 目录中的文件名（不递归）
fn list_files(dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(|e| VaspflowError::read(dir, e))?;
    let mut files: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::settings::NodeDefinition;

    struct Job;

    impl RetrieveLists for Job {
        fn retrieve_list(&self) -> Vec<String> {
            vec!["OUTCAR".into(), "CONTCAR".into()]
        }
    }

    const OUTCAR: &str = "   NELM   =     60;\n  free  energy   TOTEN  =       -3.50000000 eV\n  energy  without entropy=      -3.40000000  energy(sigma->0) =      -3.45000000\n General timing and accounting informations for this job:\n";
    const CONTCAR: &str = "H\n1.0\n3 0 0\n0 3 0\n0 0 3\nH\n1\nDirect\n0 0 0\n";

    fn job_dir(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    #[test]
    fn test_missing_folder() {
        let settings = ParserSettings::default();
        let outcome = VaspParser::new(&settings, &Job)
            .parse(Path::new("/nonexistent/vaspflow/job"))
            .unwrap();
        assert_eq!(outcome.exit_status, 100);
    }

    #[test]
    fn test_missing_critical_file() {
        let dir = job_dir(&[("CONTCAR", CONTCAR)]);
        let settings = ParserSettings::default();
        let outcome = VaspParser::new(&settings, &Job).parse(dir.path()).unwrap();
        assert_eq!(outcome.exit_code, ParserExitCode::CriticalMissingFile);
    }

    #[test]
    fn test_parse_misc_and_structure() {
        let dir = job_dir(&[("OUTCAR", OUTCAR), ("CONTCAR", CONTCAR)]);
        let mut settings = ParserSettings::default();
        settings.enable("structure");

        let outcome = VaspParser::new(&settings, &Job).parse(dir.path()).unwrap();
        assert!(outcome.is_ok(), "{}", outcome.exit_message);
        assert_eq!(outcome.run_finished(), Some(true));
        assert!(outcome.notifications().is_empty());

        let misc = outcome.outputs["misc"].as_dict().unwrap();
        assert_eq!(misc["total_energies"]["energy_extrapolated"], -3.45);
        assert!(!misc.contains_key("maximum_force"));
        assert!(matches!(outcome.outputs["structure"], OutputNode::Structure(_)));

        // 未取回的 EIGENVAL 等只产生诊断，不影响退出码
        let path = dir.path().join(RESULTS_FILE);
        outcome.write(&path).unwrap();
        let written: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written["exit_status"], 0);
        assert_eq!(written["outputs"]["structure"]["node_type"], "structure");
    }

    #[test]
    fn test_node_that_cannot_compose_fails_parse() {
        let dir = job_dir(&[("OUTCAR", OUTCAR)]);
        let mut settings = ParserSettings::default();
        settings.enable("bands");

        let outcome = VaspParser::new(&settings, &Job).parse(dir.path()).unwrap();
        assert_eq!(outcome.exit_status, 300);
        assert!(outcome.outputs.contains_key("misc"));
        assert!(outcome
            .diagnostics
            .iter()
            .any(|d| matches!(d, QuantityDiagnostic::MissingFiles { quantity, .. } if quantity == "eigenvalues")));
    }

    #[test]
    fn test_unknown_node_type_is_fatal() {
        let dir = job_dir(&[("OUTCAR", OUTCAR)]);
        let mut settings = ParserSettings::default();
        settings.nodes.insert(
            "dos".into(),
            NodeDefinition {
                node_type: "array.dos".into(),
                quantities: vec!["dos".into()],
                link_name: None,
            },
        );
        let err = VaspParser::new(&settings, &Job).parse(dir.path()).unwrap_err();
        assert!(matches!(err, VaspflowError::UnknownNodeType(_)));
    }
}
