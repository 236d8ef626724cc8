//! # 作业设置
//!
//! 读取 `settings.toml`：额外取回文件、POSCAR 精度、INCAR 默认值和解析设置。
//!
//! ```toml
//! additional_retrieve_list = ["PROCAR", "wannier90*"]
//! poscar_precision = 12
//!
//! [incar_defaults]
//! PREC = "Accurate"
//! NELM = 120
//!
//! [parser_settings]
//! add_structure = true
//! output_params = ["site_magnetization"]
//! ```
//!
//! ## 依赖关系
//! - 被 `calcs/`, `commands/` 使用
//! - 使用 `parsers/settings.rs`, `models/incar.rs`

use crate::error::{Result, VaspflowError};
use crate::models::{Incar, IncarValue};
use crate::parsers::ParserSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// 默认 POSCAR 坐标精度
pub const DEFAULT_POSCAR_PRECISION: usize = 10;

/// 作业设置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobSettings {
    /// 追加到固定取回列表的文件（可为通配符）
    pub additional_retrieve_list: Vec<String>,
    pub poscar_precision: Option<usize>,
    /// 写 INCAR 时置于用户参数之下的默认值
    pub incar_defaults: BTreeMap<String, IncarValue>,
    pub parser_settings: ParserSettings,
}

impl JobSettings {
    /// 从 TOML 文件读取
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| VaspflowError::read(path, e))?;
        let config_error = |reason: String| VaspflowError::ConfigError {
            path: path.display().to_string(),
            reason,
        };
        let settings: JobSettings = toml::from_str(&content).map_err(|e| config_error(e.to_string()))?;
        settings.parser_settings.validate().map_err(config_error)?;
        debug!("Loaded job settings from {}", path.display());
        Ok(settings)
    }

    /// 给定路径时读取，否则使用默认设置
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn poscar_precision(&self) -> usize {
        self.poscar_precision.unwrap_or(DEFAULT_POSCAR_PRECISION)
    }

    pub fn incar_defaults(&self) -> Incar {
        let mut incar = Incar::new();
        for (tag, value) in &self.incar_defaults {
            incar.set(tag, value.clone());
        }
        incar
    }

    /// 合并命令行上启用的节点（`--add structure,bands`）
    pub fn enable_nodes(&mut self, nodes: &[String]) -> Result<()> {
        enable_nodes(&mut self.parser_settings, nodes)
    }
}

/// 在解析设置上启用节点，未知节点名报错
pub fn enable_nodes(parser_settings: &mut ParserSettings, nodes: &[String]) -> Result<()> {
    for node in nodes {
        parser_settings.enable(node);
    }
    parser_settings
        .validate()
        .map_err(|reason| VaspflowError::InvalidArgument(format!("--add: {}", reason)))
}
