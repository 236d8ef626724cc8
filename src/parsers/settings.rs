//! # 解析设置
//!
//! 决定启用哪些输出节点、每个节点需要哪些物理量，以及使用哪组文件解析器。
//!
//! ## 设置项（`settings.toml` 的 `[parser_settings]` 表）
//! - `add_<node>`: 启用/禁用内置节点，默认只启用 `misc`
//! - `output_params`: 追加到 `misc` 的物理量
//! - `file_parser_set`: 文件解析器组，目前只有 `default`
//! - `scheduler_stdout`: 调度器标准输出文件名
//! - `error_definitions`: 额外错误定义 (YAML)
//! - `[parser_settings.nodes.<name>]`: 自定义节点 (`type`, `quantities`, `link_name`)
//!
//! ## 依赖关系
//! - 被 `parsers/vasp.rs`, `config.rs` 使用
//! - 使用 `parsers/file_parsers/mod.rs`

use super::file_parsers::{ParserDefinition, ParserKind, ParserOptions};
use crate::error::{Result, VaspflowError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// 默认的调度器标准输出文件名
pub const DEFAULT_SCHEDULER_STDOUT: &str = "_scheduler-stdout.txt";

/// 内置输出节点：名称、节点类型、物理量
const BUILTIN_NODES: &[(&str, &str, &[&str])] = &[
    (
        "misc",
        "dict",
        &[
            "total_energies",
            "maximum_force",
            "maximum_stress",
            "symmetries",
            "magnetization",
            "notifications",
            "run_status",
        ],
    ),
    ("structure", "structure", &["structure"]),
    ("kpoints", "array.kpoints", &["kpoints"]),
    ("trajectory", "array.trajectory", &["trajectory"]),
    ("bands", "array.bands", &["eigenvalues", "kpoints", "occupancies"]),
    ("forces", "array", &["forces"]),
    ("stress", "array", &["stress"]),
    ("site_magnetization", "dict", &["site_magnetization"]),
    ("chgcar", "vasp.chargedensity", &["chgcar"]),
    ("wavecar", "vasp.wavefun", &["wavecar"]),
];

/// 内置节点名称（`add_<name>` 的可选值）
fn builtin_node_names() -> Vec<&'static str> {
    BUILTIN_NODES.iter().map(|(name, _, _)| *name).collect()
}

/// 自定义节点定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    #[serde(rename = "type")]
    pub node_type: String,
    pub quantities: Vec<String>,
    #[serde(default)]
    pub link_name: Option<String>,
}

/// 一个待组装的输出节点
#[derive(Debug, Clone, PartialEq)]
pub struct OutputNodeSpec {
    pub name: String,
    pub link_name: String,
    /// 节点类型标签，组装时才检查是否合法
    pub node_type: String,
    pub quantities: Vec<String>,
}

/// 解析设置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserSettings {
    pub output_params: Vec<String>,
    pub file_parser_set: Option<String>,
    pub scheduler_stdout: Option<String>,
    pub error_definitions: Option<PathBuf>,
    pub nodes: BTreeMap<String, NodeDefinition>,
    /// `add_<node>` 开关
    #[serde(flatten)]
    pub flags: BTreeMap<String, bool>,
}

impl ParserSettings {
    /// 启用内置节点，如 `enable("structure")` 等价于 `add_structure = true`
    pub fn enable(&mut self, node: &str) {
        self.flags.insert(format!("add_{}", node), true);
    }

    /// 检查 `add_<node>` 开关只指向内置节点，返回第一个未知开关的说明
    pub fn validate(&self) -> std::result::Result<(), String> {
        for key in self.flags.keys() {
            let known = key
                .strip_prefix("add_")
                .map_or(false, |node| BUILTIN_NODES.iter().any(|(name, _, _)| *name == node));
            if !known {
                return Err(format!(
                    "unknown parser setting '{}' (node switches: {})",
                    key,
                    builtin_node_names().join(", ")
                ));
            }
        }
        Ok(())
    }

    pub fn is_enabled(&self, node: &str) -> bool {
        self.flags
            .get(&format!("add_{}", node))
            .copied()
            .unwrap_or(node == "misc")
    }

    pub fn stdout_name(&self) -> &str {
        self.scheduler_stdout
            .as_deref()
            .unwrap_or(DEFAULT_SCHEDULER_STDOUT)
    }

    pub fn parser_options(&self) -> ParserOptions {
        ParserOptions {
            error_definitions: self.error_definitions.clone(),
        }
    }

    /// 所有启用的输出节点：先内置节点，再自定义节点
    pub fn output_nodes(&self) -> Vec<OutputNodeSpec> {
        let mut nodes: Vec<OutputNodeSpec> = BUILTIN_NODES
            .iter()
            .filter(|(name, _, _)| self.is_enabled(name) && !self.nodes.contains_key(*name))
            .map(|(name, node_type, quantities)| {
                let mut quantities: Vec<String> = quantities.iter().map(|q| q.to_string()).collect();
                if *name == "misc" {
                    for extra in &self.output_params {
                        if !quantities.contains(extra) {
                            quantities.push(extra.clone());
                        }
                    }
                }
                OutputNodeSpec {
                    name: name.to_string(),
                    link_name: name.to_string(),
                    node_type: node_type.to_string(),
                    quantities,
                }
            })
            .collect();

        for (name, def) in &self.nodes {
            nodes.push(OutputNodeSpec {
                name: name.clone(),
                link_name: def.link_name.clone().unwrap_or_else(|| name.clone()),
                node_type: def.node_type.clone(),
                quantities: def.quantities.clone(),
            });
        }

        nodes
    }

    /// 所有启用节点所需物理量的有序并集
    pub fn quantities_to_parse(&self) -> Vec<String> {
        let mut quantities: Vec<String> = Vec::new();
        for node in self.output_nodes() {
            for q in node.quantities {
                if !quantities.contains(&q) {
                    quantities.push(q);
                }
            }
        }
        quantities
    }

    /// 当前文件解析器组的定义
    pub fn parser_definitions(&self) -> Result<Vec<ParserDefinition>> {
        let set = self.file_parser_set.as_deref().unwrap_or("default");
        match set {
            "default" => Ok(vec![
                ParserDefinition::new("OUTCAR", ParserKind::Outcar, true),
                ParserDefinition::new("CONTCAR", ParserKind::Poscar, false),
                ParserDefinition::new("IBZKPT", ParserKind::Kpoints, false),
                ParserDefinition::new("EIGENVAL", ParserKind::Eigenval, false),
                ParserDefinition::new("XDATCAR", ParserKind::Xdatcar, false),
                ParserDefinition::new("CHGCAR", ParserKind::Chgcar, false),
                ParserDefinition::new("WAVECAR", ParserKind::Wavecar, false),
                ParserDefinition::new(self.stdout_name(), ParserKind::Stdout, false),
            ]),
            other => Err(VaspflowError::InvalidArgument(format!(
                "Unknown file parser set '{}' (available: default)",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_misc_enabled_by_default() {
        let settings = ParserSettings::default();
        let nodes = settings.output_nodes();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].link_name, "misc");
        assert_eq!(nodes[0].node_type, "dict");
    }

    #[test]
    fn test_quantities_union_is_ordered_and_unique() {
        let mut settings = ParserSettings::default();
        settings.enable("kpoints");
        settings.enable("bands");
        settings.output_params = vec!["site_magnetization".into(), "total_energies".into()];

        let quantities = settings.quantities_to_parse();
        assert_eq!(quantities.iter().filter(|q| *q == "kpoints").count(), 1);
        assert_eq!(quantities[7], "site_magnetization");
        assert_eq!(&quantities[8..], &["kpoints", "eigenvalues", "occupancies"]);
    }

    #[test]
    fn test_custom_nodes_from_toml() {
        let text = r#"
add_misc = false
add_structure = true
output_params = ["site_magnetization"]

[nodes.final_forces]
type = "array"
quantities = ["forces"]
link_name = "forces_last"
"#;
        let settings: ParserSettings = toml::from_str(text).unwrap();
        let nodes = settings.output_nodes();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].name, "structure");
        assert_eq!(nodes[1].link_name, "forces_last");
        assert_eq!(settings.quantities_to_parse(), vec!["structure", "forces"]);
    }

    #[test]
    fn test_parser_definitions() {
        let mut settings = ParserSettings::default();
        let defs = settings.parser_definitions().unwrap();
        assert!(defs.iter().any(|d| d.file_name == "OUTCAR" && d.is_critical));
        assert_eq!(defs.last().unwrap().file_name, DEFAULT_SCHEDULER_STDOUT);

        settings.file_parser_set = Some("vasprun".into());
        assert!(settings.parser_definitions().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_switch() {
        let mut settings = ParserSettings::default();
        settings.enable("structure");
        assert!(settings.validate().is_ok());

        settings.flags.insert("add_strucutre".into(), true);
        let err = settings.validate().unwrap_err();
        assert!(err.contains("add_strucutre"));
    }
}
